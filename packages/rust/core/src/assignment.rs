//! Per-post contributor assignments: loading, edit permission, and the
//! guarded save path behind the authoring form.

use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, instrument, warn};

use contributors_markup::sanitize_text;
use contributors_shared::{
    ASSIGNMENT_META_KEY, ContributorAssignment, ContributorsError, DEFAULT_BOX_TITLE, Post,
    PostId, Result, Role, User, UserId,
};
use contributors_storage::Storage;

use crate::nonce::{ASSIGNMENT_ACTION, NonceIssuer};

/// Fields submitted by the authoring form.
///
/// Reads the input names [`crate::admin::render_assignment_form`] emits.
/// The short field names are accepted too.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentForm {
    #[serde(default, rename = "contributors_box_title", alias = "title")]
    pub title: Option<String>,
    /// A single ticked box arrives as one value rather than a list.
    #[serde(
        default,
        rename = "contributors_list",
        alias = "selected_user_ids",
        deserialize_with = "submitted_ids"
    )]
    pub selected_user_ids: Vec<String>,
    /// Anti-forgery token echoed back from the rendered form.
    #[serde(default, rename = "contributors_nonce", alias = "nonce")]
    pub nonce: Option<String>,
}

fn submitted_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Text(String),
        Int(i64),
        Other(IgnoredAny),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ids {
        Many(Vec<Entry>),
        One(Entry),
    }

    let entries = match Ids::deserialize(deserializer)? {
        Ids::Many(entries) => entries,
        Ids::One(entry) => vec![entry],
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            Entry::Text(s) => Some(s),
            Entry::Int(n) => Some(n.to_string()),
            Entry::Other(_) => None,
        })
        .collect())
}

/// Request facts the save path checks before writing anything.
#[derive(Debug, Clone, Copy)]
pub struct SaveContext {
    /// User submitting the form; the token is bound to them.
    pub editor: UserId,
    /// Result of the edit-permission check for this post.
    pub caller_authorized: bool,
    /// Background autosave cycle rather than an explicit save.
    pub is_autosave: bool,
}

/// Why a save request wrote nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingToken,
    InvalidToken,
    Autosave,
    Unauthorized,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingToken => "missing token",
            Self::InvalidToken => "invalid token",
            Self::Autosave => "autosave",
            Self::Unauthorized => "not authorized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(ContributorAssignment),
    Skipped(SkipReason),
}

/// Whether `user` may edit `post`.
///
/// Administrators and editors may edit anything; authors and contributors
/// only what they authored.
pub fn can_edit_post(user: &User, post: &Post) -> bool {
    match user.role {
        Role::Administrator | Role::Editor => true,
        Role::Author | Role::Contributor => post.author_id == user.id,
        Role::Subscriber => false,
    }
}

/// Load a post's assignment, or the empty default.
///
/// An unreadable stored record is treated as absent.
pub async fn get_assignment(storage: &Storage, post_id: PostId) -> Result<ContributorAssignment> {
    let Some(raw) = storage.get_post_meta(post_id, ASSIGNMENT_META_KEY).await? else {
        return Ok(ContributorAssignment::default());
    };

    match serde_json::from_str(&raw) {
        Ok(assignment) => Ok(assignment),
        Err(e) => {
            warn!(%post_id, error = %e, "stored assignment unreadable, treating as empty");
            Ok(ContributorAssignment::default())
        }
    }
}

/// Coerce form input into an assignment record.
///
/// Ids keep their submitted order and are not de-duplicated.
pub fn sanitize_assignment(form: &AssignmentForm) -> ContributorAssignment {
    let contributor_ids = form
        .selected_user_ids
        .iter()
        .map(|raw| UserId::coerce(raw))
        .collect();

    let title = form.title.as_deref().map(sanitize_text).unwrap_or_default();
    let box_title = if title.is_empty() {
        DEFAULT_BOX_TITLE.to_string()
    } else {
        title
    };

    ContributorAssignment {
        contributor_ids,
        box_title,
    }
}

/// Persist an assignment submitted through the authoring form.
///
/// Writes nothing unless the token verifies, the request is not an
/// autosave, and the caller may edit the post. The record and its index
/// rows are written together.
#[instrument(skip_all, fields(post_id = %post_id, editor = %ctx.editor))]
pub async fn save_assignment(
    storage: &Storage,
    nonces: &NonceIssuer,
    post_id: PostId,
    form: &AssignmentForm,
    ctx: SaveContext,
) -> Result<SaveOutcome> {
    if let Some(reason) = check_save(nonces, form, ctx) {
        debug!(reason = reason.as_str(), "assignment save skipped");
        return Ok(SaveOutcome::Skipped(reason));
    }

    let assignment = sanitize_assignment(form);
    let record = serde_json::to_string(&assignment)
        .map_err(|e| ContributorsError::Storage(e.to_string()))?;
    storage
        .write_assignment(post_id, &record, &assignment.contributor_ids)
        .await?;

    info!(
        contributors = assignment.contributor_ids.len(),
        title = %assignment.box_title,
        "saved contributor assignment"
    );
    Ok(SaveOutcome::Saved(assignment))
}

fn check_save(nonces: &NonceIssuer, form: &AssignmentForm, ctx: SaveContext) -> Option<SkipReason> {
    let Some(token) = form.nonce.as_deref().filter(|t| !t.trim().is_empty()) else {
        return Some(SkipReason::MissingToken);
    };
    if !nonces.verify(token, ASSIGNMENT_ACTION, ctx.editor).is_valid() {
        return Some(SkipReason::InvalidToken);
    }
    if ctx.is_autosave {
        return Some(SkipReason::Autosave);
    }
    if !ctx.caller_authorized {
        return Some(SkipReason::Unauthorized);
    }
    None
}
