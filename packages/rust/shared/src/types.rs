//! Core domain types: users, posts, display options, contributor assignments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ContributorsError;

/// The canonical content type that carries contributor boxes.
pub const POST_TYPE_POST: &str = "post";

/// Status of content visible on the public site.
pub const STATUS_PUBLISH: &str = "publish";

/// Box title used when an assignment has none.
pub const DEFAULT_BOX_TITLE: &str = "Contributors";

/// Global option key holding the [`DisplayOptions`] record.
pub const DISPLAY_OPTIONS_KEY: &str = "contributors_display_options";

/// Per-post metadata key holding the [`ContributorAssignment`] record.
pub const ASSIGNMENT_META_KEY: &str = "contributors";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of a user in the platform's user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// Coerce untrusted form input to an id.
    ///
    /// Leading whitespace, an optional sign, then as many digits as present.
    /// Input with no leading digits becomes `0`, which never resolves.
    pub fn coerce(raw: &str) -> Self {
        Self(coerce_int(raw))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Identifier of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PostId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

fn coerce_int(raw: &str) -> i64 {
    let s = raw.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative { -value } else { value }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Platform role of a user. Drives the edit-permission check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Administrator,
    Editor,
    #[default]
    Author,
    Contributor,
    Subscriber,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::Editor => "editor",
            Self::Author => "author",
            Self::Contributor => "contributor",
            Self::Subscriber => "subscriber",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ContributorsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "administrator" | "admin" => Ok(Self::Administrator),
            "editor" => Ok(Self::Editor),
            "author" => Ok(Self::Author),
            "contributor" => Ok(Self::Contributor),
            "subscriber" => Ok(Self::Subscriber),
            other => Err(ContributorsError::validation(format!("unknown role '{other}'"))),
        }
    }
}

/// A resolved user record from the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Unique login name.
    pub login: String,
    /// URL-safe slug used in author archive links.
    pub nicename: String,
    pub display_name: String,
    pub email: String,
    /// Profile description; may contain a limited HTML subset.
    pub bio: String,
    /// Personal website; empty when unset.
    pub website_url: String,
    /// Explicit avatar image; falls back to Gravatar when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub role: Role,
}

/// Input for creating a user.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub login: String,
    /// Defaults to the login when `None` or blank.
    pub display_name: Option<String>,
    pub email: String,
    pub bio: String,
    pub website_url: String,
    pub avatar_url: Option<String>,
    pub role: Role,
}

impl NewUser {
    /// The display name to persist.
    pub fn resolved_display_name(&self) -> &str {
        match self.display_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => self.login.trim(),
        }
    }

    /// Slug derived from the login: lowercase ASCII alphanumerics joined by `-`.
    pub fn nicename(&self) -> String {
        let mut slug = String::with_capacity(self.login.len());
        let mut pending_dash = false;
        for c in self.login.trim().chars() {
            if c.is_ascii_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c.to_ascii_lowercase());
            } else {
                pending_dash = true;
            }
        }
        slug
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// A content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Primary author.
    pub author_id: UserId,
    pub post_type: String,
    pub status: String,
    pub title: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
}

impl Post {
    /// Whether this item is of the canonical `post` type.
    pub fn is_post_type(&self) -> bool {
        self.post_type == POST_TYPE_POST
    }
}

/// Input for creating a content item.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: UserId,
    pub post_type: String,
    pub status: String,
    pub title: String,
    pub content: String,
}

impl NewPost {
    /// A published item of the canonical `post` type.
    pub fn published(author_id: UserId, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author_id,
            post_type: POST_TYPE_POST.into(),
            status: STATUS_PUBLISH.into(),
            title: title.into(),
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Display options
// ---------------------------------------------------------------------------

/// One of the orderable profile fields on a contributor card.
///
/// The avatar is not a `FieldKey`: it is never ordered and always comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKey {
    Name,
    Bio,
    Website,
}

impl FieldKey {
    /// Order used when none (or nothing usable) is configured.
    pub const DEFAULT_ORDER: [FieldKey; 3] = [FieldKey::Name, FieldKey::Bio, FieldKey::Website];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Bio => "bio",
            Self::Website => "website",
        }
    }

    /// Human-readable label for settings screens.
    pub fn label(self) -> &'static str {
        match self {
            Self::Name => "Display Name",
            Self::Bio => "Bio",
            Self::Website => "Website Link",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKey {
    type Err = ContributorsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "bio" => Ok(Self::Bio),
            "website" => Ok(Self::Website),
            other => Err(ContributorsError::validation(format!("unknown field '{other}'"))),
        }
    }
}

/// Normalize a sequence of raw order entries.
///
/// Unknown and blank entries are dropped, repeats keep their first position,
/// and an empty result becomes [`FieldKey::DEFAULT_ORDER`].
pub fn normalize_order<I, S>(entries: I) -> Vec<FieldKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut order = Vec::with_capacity(FieldKey::DEFAULT_ORDER.len());
    for entry in entries {
        if let Ok(key) = entry.as_ref().parse::<FieldKey>() {
            if !order.contains(&key) {
                order.push(key);
            }
        }
    }
    if order.is_empty() {
        order.extend(FieldKey::DEFAULT_ORDER);
    }
    order
}

/// An element order as submitted: a list, or a comma-joined string written
/// by the reorderable settings list.
///
/// Reading never fails. Non-string list entries are dropped, and any other
/// shape (number, bool, null, object) reads as an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RawOrder {
    List(Vec<String>),
    Joined(String),
}

impl<'de> Deserialize<'de> for RawOrder {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(RawOrderVisitor)
    }
}

struct RawOrderVisitor;

impl<'de> Visitor<'de> for RawOrderVisitor {
    type Value = RawOrder;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of field keys or a comma-joined string")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<RawOrder, E> {
        Ok(RawOrder::Joined(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<RawOrder, E> {
        Ok(RawOrder::Joined(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<RawOrder, A::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Entry {
            Text(String),
            Other(IgnoredAny),
        }

        let mut entries = Vec::new();
        while let Some(entry) = seq.next_element::<Entry>()? {
            if let Entry::Text(text) = entry {
                entries.push(text);
            }
        }
        Ok(RawOrder::List(entries))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<RawOrder, A::Error> {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(RawOrder::List(Vec::new()))
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<RawOrder, E> {
        Ok(RawOrder::List(Vec::new()))
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<RawOrder, E> {
        Ok(RawOrder::List(Vec::new()))
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<RawOrder, E> {
        Ok(RawOrder::List(Vec::new()))
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<RawOrder, E> {
        Ok(RawOrder::List(Vec::new()))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<RawOrder, E> {
        Ok(RawOrder::List(Vec::new()))
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<RawOrder, E> {
        Ok(RawOrder::List(Vec::new()))
    }
}

impl RawOrder {
    pub fn normalize(&self) -> Vec<FieldKey> {
        match self {
            Self::List(entries) => normalize_order(entries),
            Self::Joined(joined) => normalize_order(joined.split(',')),
        }
    }
}

/// Global contributor-card display settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    #[serde(default, with = "flag")]
    pub show_avatar: bool,
    #[serde(default, with = "flag")]
    pub show_name: bool,
    #[serde(default, with = "flag")]
    pub show_bio: bool,
    #[serde(default, with = "flag")]
    pub show_website: bool,
    /// Always non-empty and free of repeats.
    #[serde(default = "default_order", deserialize_with = "deserialize_order")]
    pub element_order: Vec<FieldKey>,
}

impl DisplayOptions {
    /// Whether the given field is switched on.
    pub fn shows(&self, key: FieldKey) -> bool {
        match key {
            FieldKey::Name => self.show_name,
            FieldKey::Bio => self.show_bio,
            FieldKey::Website => self.show_website,
        }
    }
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_avatar: true,
            show_name: true,
            show_bio: true,
            show_website: true,
            element_order: default_order(),
        }
    }
}

fn default_order() -> Vec<FieldKey> {
    FieldKey::DEFAULT_ORDER.to_vec()
}

fn deserialize_order<'de, D>(deserializer: D) -> std::result::Result<Vec<FieldKey>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(RawOrder::deserialize(deserializer)?.normalize())
}

/// Flags persist as `0`/`1`; booleans and numeric strings are accepted on read.
/// Anything else reads as off.
mod flag {
    use serde::de::IgnoredAny;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Bool(bool),
            Int(i64),
            Float(f64),
            Text(String),
            Other(IgnoredAny),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Bool(b) => b,
            Repr::Int(n) => n != 0,
            Repr::Float(n) => n != 0.0,
            Repr::Text(s) => !s.is_empty() && s != "0",
            Repr::Other(_) => false,
        })
    }
}

// ---------------------------------------------------------------------------
// Contributor assignment
// ---------------------------------------------------------------------------

/// The curated contributor list attached to one content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorAssignment {
    /// Selection order at save time. Serialized first.
    #[serde(default)]
    pub contributor_ids: Vec<UserId>,
    #[serde(default = "default_box_title")]
    pub box_title: String,
}

impl ContributorAssignment {
    pub fn is_empty(&self) -> bool {
        self.contributor_ids.is_empty()
    }
}

impl Default for ContributorAssignment {
    fn default() -> Self {
        Self {
            contributor_ids: Vec::new(),
            box_title: default_box_title(),
        }
    }
}

fn default_box_title() -> String {
    DEFAULT_BOX_TITLE.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_coercion_follows_integer_prefix() {
        assert_eq!(UserId::coerce("12"), UserId(12));
        assert_eq!(UserId::coerce("  7abc"), UserId(7));
        assert_eq!(UserId::coerce("-3"), UserId(-3));
        assert_eq!(UserId::coerce("abc"), UserId(0));
        assert_eq!(UserId::coerce(""), UserId(0));
        assert_eq!(UserId::coerce("99999999999999999999999"), UserId(i64::MAX));
    }

    #[test]
    fn nicename_is_a_slug() {
        let user = NewUser {
            login: "Jane Doe_2".into(),
            ..NewUser::default()
        };
        assert_eq!(user.nicename(), "jane-doe-2");
        assert_eq!(user.resolved_display_name(), "Jane Doe_2");
    }

    #[test]
    fn order_normalization_drops_blanks_unknowns_and_repeats() {
        let order = normalize_order(["website", "", "avatar", "Name", "website", " bio "]);
        assert_eq!(order, vec![FieldKey::Website, FieldKey::Name, FieldKey::Bio]);

        let order = normalize_order(["", " ", "image"]);
        assert_eq!(order, FieldKey::DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn display_options_persist_flags_as_integers() {
        let options = DisplayOptions {
            show_bio: false,
            ..DisplayOptions::default()
        };
        let json = serde_json::to_value(&options).expect("serialize");
        assert_eq!(json["show_avatar"], 1);
        assert_eq!(json["show_bio"], 0);
        assert_eq!(json["element_order"], serde_json::json!(["name", "bio", "website"]));
    }

    #[test]
    fn display_options_accept_legacy_shapes() {
        let json = r#"{"show_avatar":true,"show_name":"1","show_bio":0,"element_order":"website,,name"}"#;
        let options: DisplayOptions = serde_json::from_str(json).expect("deserialize");
        assert!(options.show_avatar);
        assert!(options.show_name);
        assert!(!options.show_bio);
        assert!(!options.show_website);
        assert_eq!(options.element_order, vec![FieldKey::Website, FieldKey::Name]);
    }

    #[test]
    fn malformed_order_entries_are_dropped_not_rejected() {
        let order: RawOrder = serde_json::from_str(r#"["name",3,null,"bio",{"x":1}]"#).unwrap();
        assert_eq!(order, RawOrder::List(vec!["name".into(), "bio".into()]));

        for raw in ["5", "true", "null", r#"{"a":"name"}"#] {
            let order: RawOrder = serde_json::from_str(raw).unwrap();
            assert_eq!(order.normalize(), FieldKey::DEFAULT_ORDER.to_vec(), "input {raw}");
        }
    }

    #[test]
    fn stored_record_with_bad_order_keeps_its_flags() {
        let json = r#"{"show_avatar":0,"show_name":1,"show_bio":null,"show_website":[1],"element_order":["website",null]}"#;
        let options: DisplayOptions = serde_json::from_str(json).expect("deserialize");
        assert!(!options.show_avatar);
        assert!(options.show_name);
        assert!(!options.show_bio);
        assert!(!options.show_website);
        assert_eq!(options.element_order, vec![FieldKey::Website]);
    }

    #[test]
    fn assignment_serializes_ids_before_title() {
        let assignment = ContributorAssignment {
            contributor_ids: vec![UserId(5), UserId(9)],
            box_title: "Authors".into(),
        };
        let json = serde_json::to_string(&assignment).expect("serialize");
        assert_eq!(json, r#"{"contributor_ids":[5,9],"box_title":"Authors"}"#);

        let parsed: ContributorAssignment = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(parsed, ContributorAssignment::default());
        assert_eq!(parsed.box_title, DEFAULT_BOX_TITLE);
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Editor".parse::<Role>().unwrap(), Role::Editor);
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Administrator);
        assert!("overlord".parse::<Role>().is_err());
    }
}
