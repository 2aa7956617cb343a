//! Contributor box rendering.
//!
//! [`render_contributors`] appends the box for a post to its content.
//! Field markup comes from [`render_field`], a pure function of the field
//! key and the resolved user, dispatched over [`FieldKey`].

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};
use url::Url;

use contributors_markup::{escape_html, filter_html, sanitize_url};
use contributors_shared::{
    AppConfig, ContributorAssignment, DisplayOptions, FieldKey, PostId, Result, User,
};
use contributors_storage::Storage;

use crate::assignment::get_assignment;
use crate::settings::get_display_options;

/// Inline icon for the website link.
const LINK_ICON: &str = r#"<svg class="contributors-card__icon" xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24" width="18" height="18" aria-hidden="true" focusable="false"><path fill="currentColor" d="M3.9 12a3.1 3.1 0 0 1 3.1-3.1h4V7H7a5 5 0 0 0 0 10h4v-1.9H7A3.1 3.1 0 0 1 3.9 12zM8 13h8v-2H8v2zm9-6h-4v1.9h4a3.1 3.1 0 0 1 0 6.2h-4V17h4a5 5 0 0 0 0-10z"/></svg>"#;

/// Site-level inputs to rendering.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// Base for author profile links; ends with `/`.
    pub site_url: Url,
    pub avatar_size: u32,
}

impl RenderSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            site_url: config.site.base_url()?,
            avatar_size: config.render.avatar_size,
        })
    }

    /// Profile link for a user's author archive.
    pub fn author_url(&self, user: &User) -> String {
        self.site_url
            .join(&format!("author/{}/", user.nicename))
            .map(String::from)
            .unwrap_or_else(|_| self.site_url.to_string())
    }
}

/// Append the contributor box for `post_id` to `content`.
///
/// Returns `content` unchanged outside single-post views, for other post
/// types, and for posts without contributors. Ids that no longer resolve
/// to a user are skipped.
#[instrument(skip_all, fields(post_id = %post_id, single = is_single_view))]
pub async fn render_contributors(
    storage: &Storage,
    settings: &RenderSettings,
    post_id: PostId,
    content: &str,
    is_single_view: bool,
) -> Result<String> {
    if !is_single_view {
        return Ok(content.to_string());
    }
    match storage.get_post(post_id).await? {
        Some(post) if post.is_post_type() => {}
        _ => return Ok(content.to_string()),
    }

    let assignment = get_assignment(storage, post_id).await?;
    if assignment.is_empty() {
        return Ok(content.to_string());
    }
    let options = get_display_options(storage).await?;

    let mut users = Vec::with_capacity(assignment.contributor_ids.len());
    for id in &assignment.contributor_ids {
        if let Some(user) = storage.get_user(*id).await? {
            users.push(user);
        }
    }

    debug!(
        assigned = assignment.contributor_ids.len(),
        resolved = users.len(),
        "rendering contributor box"
    );

    let mut out = String::with_capacity(content.len() + 512 * users.len());
    out.push_str(content);
    out.push_str(&render_box(&assignment, &users, &options, settings));
    Ok(out)
}

/// The box container with one card per resolved user, in the given order.
pub fn render_box(
    assignment: &ContributorAssignment,
    users: &[User],
    options: &DisplayOptions,
    settings: &RenderSettings,
) -> String {
    let mut html = String::from(r#"<div class="contributors-box">"#);
    html.push_str(&format!(
        r#"<h3 class="contributors-box__title">{}</h3>"#,
        escape_html(&assignment.box_title)
    ));
    html.push_str(r#"<div class="contributors-box__list">"#);
    for user in users {
        html.push_str(&render_card(user, options, settings));
    }
    html.push_str("</div></div>");
    html
}

/// One contributor card: avatar first, then the enabled fields in order.
pub fn render_card(user: &User, options: &DisplayOptions, settings: &RenderSettings) -> String {
    let mut html = format!(
        r#"<div class="contributors-card" tabindex="0" aria-label="{}">"#,
        escape_html(&user.display_name)
    );

    if options.show_avatar {
        html.push_str(&render_avatar(user, settings.avatar_size));
    }

    html.push_str(r#"<div class="contributors-card__info">"#);
    for key in &options.element_order {
        if !options.shows(*key) {
            continue;
        }
        if let Some(fragment) = render_field(*key, user, settings) {
            html.push_str(&fragment);
        }
    }
    html.push_str("</div></div>");
    html
}

/// Markup for one field of one user, or `None` when the user has nothing
/// to show for it.
pub fn render_field(key: FieldKey, user: &User, settings: &RenderSettings) -> Option<String> {
    match key {
        FieldKey::Name => Some(format!(
            r#"<h2 class="contributors-card__name"><a href="{}">{}</a></h2>"#,
            escape_html(&settings.author_url(user)),
            escape_html(&user.display_name)
        )),
        FieldKey::Bio => {
            let bio = filter_html(&user.bio);
            if bio.trim().is_empty() {
                return None;
            }
            Some(format!(r#"<div class="contributors-card__bio">{}</div>"#, bio.trim()))
        }
        FieldKey::Website => {
            let url = sanitize_url(&user.website_url)?;
            Some(format!(
                r#"<a class="contributors-card__website" href="{}" target="_blank" rel="noopener noreferrer" aria-label="{}">{LINK_ICON}</a>"#,
                escape_html(&url),
                escape_html(&format!("Website of {}", user.display_name))
            ))
        }
    }
}

pub fn render_avatar(user: &User, size: u32) -> String {
    format!(
        r#"<div class="contributors-card__avatar"><img src="{}" alt="{}" width="{size}" height="{size}" loading="lazy"></div>"#,
        escape_html(&avatar_url(user, size)),
        escape_html(&user.display_name)
    )
}

/// The user's own avatar image, or their Gravatar.
pub fn avatar_url(user: &User, size: u32) -> String {
    if let Some(url) = user.avatar_url.as_deref().and_then(sanitize_url) {
        return url;
    }

    let mut hasher = Sha256::new();
    hasher.update(user.email.trim().to_lowercase().as_bytes());
    format!(
        "https://www.gravatar.com/avatar/{:x}?s={size}&d=mp",
        hasher.finalize()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{AssignmentForm, SaveContext, save_assignment};
    use crate::nonce::ASSIGNMENT_ACTION;
    use crate::settings::{RawDisplayOptions, save_display_options};
    use crate::test_support::{add_post, add_user, test_nonces, test_settings, test_storage};
    use contributors_shared::{NewPost, RawOrder, Role, UserId};
    use scraper::{Html, Selector};

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    fn user(bio: &str, website: &str) -> User {
        User {
            id: UserId(5),
            login: "ada".into(),
            nicename: "ada".into(),
            display_name: "Ada <Lovelace>".into(),
            email: " Ada@Example.com ".into(),
            bio: bio.into(),
            website_url: website.into(),
            avatar_url: None,
            role: Role::Author,
        }
    }

    async fn assign(storage: &Storage, post_id: PostId, editor: UserId, ids: &[UserId], title: &str) {
        let nonces = test_nonces();
        save_assignment(
            storage,
            &nonces,
            post_id,
            &AssignmentForm {
                title: Some(title.into()),
                selected_user_ids: ids.iter().map(|id| id.to_string()).collect(),
                nonce: Some(nonces.create(ASSIGNMENT_ACTION, editor)),
            },
            SaveContext {
                editor,
                caller_authorized: true,
                is_autosave: false,
            },
        )
        .await
        .unwrap();
    }

    #[test]
    fn name_links_to_author_archive_and_escapes() {
        let html = render_field(FieldKey::Name, &user("", ""), &test_settings()).unwrap();
        assert_eq!(
            html,
            r#"<h2 class="contributors-card__name"><a href="https://blog.example/author/ada/">Ada &lt;Lovelace&gt;</a></h2>"#
        );
    }

    #[test]
    fn empty_bio_and_website_render_nothing() {
        let settings = test_settings();
        let bare = user("  ", "");
        assert!(render_field(FieldKey::Bio, &bare, &settings).is_none());
        assert!(render_field(FieldKey::Website, &bare, &settings).is_none());
        assert!(render_field(FieldKey::Website, &user("", "javascript:alert(1)"), &settings).is_none());
    }

    #[test]
    fn bio_keeps_allowed_markup_only() {
        let html = render_field(
            FieldKey::Bio,
            &user("<p>Hi <strong>there</strong><script>x()</script></p>", ""),
            &test_settings(),
        )
        .unwrap();
        assert!(html.contains("<strong>there</strong>"));
        assert!(!html.contains("script"));
    }

    #[test]
    fn website_opens_in_new_tab() {
        let html = render_field(FieldKey::Website, &user("", "ada.dev"), &test_settings()).unwrap();
        let doc = Html::parse_fragment(&html);
        let link = doc.select(&sel("a.contributors-card__website")).next().unwrap();
        assert_eq!(link.value().attr("href"), Some("http://ada.dev/"));
        assert_eq!(link.value().attr("target"), Some("_blank"));
        assert_eq!(link.value().attr("rel"), Some("noopener noreferrer"));
        assert!(html.contains("<svg"));
    }

    #[test]
    fn gravatar_fallback_hashes_normalized_email() {
        let url = avatar_url(&user("", ""), 96);
        let mut hasher = Sha256::new();
        hasher.update(b"ada@example.com");
        assert_eq!(
            url,
            format!("https://www.gravatar.com/avatar/{:x}?s=96&d=mp", hasher.finalize())
        );

        let mut custom = user("", "");
        custom.avatar_url = Some("https://cdn.example/a.png".into());
        assert_eq!(avatar_url(&custom, 96), "https://cdn.example/a.png");
    }

    #[test]
    fn card_follows_element_order() {
        let options = DisplayOptions {
            show_avatar: false,
            element_order: vec![FieldKey::Website, FieldKey::Name],
            ..DisplayOptions::default()
        };
        let html = render_card(&user("bio text", "https://ada.dev"), &options, &test_settings());
        let website = html.find("contributors-card__website").unwrap();
        let name = html.find("contributors-card__name").unwrap();
        assert!(website < name);
        assert!(!html.contains("contributors-card__bio"));
        assert!(!html.contains("contributors-card__avatar"));
    }

    #[test]
    fn disabled_bio_is_never_rendered() {
        let options = DisplayOptions {
            show_bio: false,
            ..DisplayOptions::default()
        };
        let html = render_card(&user("A long and storied bio", ""), &options, &test_settings());
        assert!(!html.contains("contributors-card__bio"));
        assert!(!html.contains("storied"));
    }

    #[tokio::test]
    async fn content_unchanged_without_contributors_or_outside_single_view() {
        let storage = test_storage().await;
        let settings = test_settings();
        let author = add_user(&storage, "author", |_| {}).await;
        let post = add_post(&storage, author.id).await;

        let out = render_contributors(&storage, &settings, post.id, "<p>Body</p>", true)
            .await
            .unwrap();
        assert_eq!(out, "<p>Body</p>");

        assign(&storage, post.id, author.id, &[author.id], "").await;
        let out = render_contributors(&storage, &settings, post.id, "<p>Body</p>", false)
            .await
            .unwrap();
        assert_eq!(out, "<p>Body</p>");

        let page = storage
            .insert_post(&NewPost {
                post_type: "page".into(),
                ..NewPost::published(author.id, "About", "")
            })
            .await
            .unwrap();
        assign(&storage, page.id, author.id, &[author.id], "").await;
        let out = render_contributors(&storage, &settings, page.id, "x", true).await.unwrap();
        assert_eq!(out, "x");
    }

    #[tokio::test]
    async fn unresolvable_ids_still_emit_container() {
        let storage = test_storage().await;
        let author = add_user(&storage, "author", |_| {}).await;
        let post = add_post(&storage, author.id).await;
        assign(&storage, post.id, author.id, &[UserId(404)], "Team").await;

        let out = render_contributors(&storage, &test_settings(), post.id, "", true)
            .await
            .unwrap();
        let doc = Html::parse_fragment(&out);
        assert_eq!(doc.select(&sel(".contributors-box__title")).count(), 1);
        assert_eq!(doc.select(&sel(".contributors-card")).count(), 0);
    }

    #[tokio::test]
    async fn end_to_end_two_cards_in_assignment_order() {
        let storage = test_storage().await;
        let author = add_user(&storage, "author", |_| {}).await;
        let five = add_user(&storage, "five", |u| {
            u.display_name = Some("Five".into());
            u.bio = "Writes things".into();
        })
        .await;
        let nine = add_user(&storage, "nine", |u| {
            u.display_name = Some("Nine".into());
            u.website_url = "https://nine.example".into();
        })
        .await;
        let post = add_post(&storage, author.id).await;

        save_display_options(
            &storage,
            &RawDisplayOptions {
                show_name: true,
                show_website: true,
                element_order: Some(RawOrder::List(vec!["name".into(), "website".into()])),
                ..RawDisplayOptions::default()
            },
        )
        .await
        .unwrap();
        assign(&storage, post.id, author.id, &[five.id, nine.id], "Authors").await;

        let out = render_contributors(&storage, &test_settings(), post.id, "<p>Body</p>", true)
            .await
            .unwrap();
        assert!(out.starts_with("<p>Body</p>"));

        let doc = Html::parse_fragment(&out);
        let title = doc.select(&sel(".contributors-box__title")).next().unwrap();
        assert_eq!(title.text().collect::<String>(), "Authors");
        assert_eq!(doc.select(&sel(".contributors-card__avatar")).count(), 0);
        assert_eq!(doc.select(&sel("img")).count(), 0);

        let cards: Vec<_> = doc.select(&sel(".contributors-card")).collect();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].value().attr("aria-label"), Some("Five"));
        assert_eq!(cards[1].value().attr("aria-label"), Some("Nine"));

        assert_eq!(cards[0].select(&sel(".contributors-card__website")).count(), 0);
        assert_eq!(cards[0].select(&sel(".contributors-card__bio")).count(), 0);

        let fields: Vec<_> = cards[1]
            .select(&sel(".contributors-card__info > *"))
            .filter_map(|el| el.value().attr("class"))
            .collect();
        assert_eq!(
            fields,
            vec!["contributors-card__name", "contributors-card__website"]
        );
    }
}
