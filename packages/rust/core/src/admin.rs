//! Authoring and settings form fields.
//!
//! Input names are the keys [`crate::assignment::AssignmentForm`] and
//! [`crate::settings::RawDisplayOptions`] deserialize, so a submitted form
//! decodes straight into them.

use contributors_markup::escape_html;
use contributors_shared::{DisplayOptions, FieldKey, PostId, Result, UserId};
use contributors_storage::Storage;

use crate::assignment::get_assignment;
use crate::nonce::{ASSIGNMENT_ACTION, NonceIssuer};

pub const TITLE_FIELD: &str = "contributors_box_title";
pub const USERS_FIELD: &str = "contributors_list";
pub const NONCE_FIELD: &str = "contributors_nonce";
pub const ORDER_FIELD: &str = "element_order";

/// The authoring form section for one post: box title input, a checklist
/// of every user, and the anti-forgery token for `editor`.
pub async fn render_assignment_form(
    storage: &Storage,
    nonces: &NonceIssuer,
    post_id: PostId,
    editor: UserId,
) -> Result<String> {
    let assignment = get_assignment(storage, post_id).await?;
    let users = storage.list_users().await?;

    let mut html = String::from(r#"<div class="contributors-metabox">"#);
    html.push_str(&format!(
        r#"<p><label for="{TITLE_FIELD}">Box Title</label><input type="text" id="{TITLE_FIELD}" name="{TITLE_FIELD}" value="{}" class="widefat"></p>"#,
        escape_html(&assignment.box_title)
    ));

    html.push_str(r#"<ul class="contributors-metabox__users">"#);
    for user in &users {
        let checked = if assignment.contributor_ids.contains(&user.id) {
            " checked"
        } else {
            ""
        };
        html.push_str(&format!(
            r#"<li><label><input type="checkbox" name="{USERS_FIELD}" value="{}"{checked}> {}</label></li>"#,
            user.id,
            escape_html(&user.display_name)
        ));
    }
    html.push_str("</ul>");

    html.push_str(&format!(
        r#"<input type="hidden" name="{NONCE_FIELD}" value="{}">"#,
        escape_html(&nonces.create(ASSIGNMENT_ACTION, editor))
    ));
    html.push_str("</div>");
    Ok(html)
}

/// The settings section: one checkbox per display flag and the
/// reorderable field list backed by a hidden comma-joined input.
pub fn render_settings_fields(options: &DisplayOptions) -> String {
    let flags = [
        ("show_avatar", "Show Avatar", options.show_avatar),
        ("show_name", "Show Display Name", options.show_name),
        ("show_bio", "Show Bio", options.show_bio),
        ("show_website", "Show Website Link", options.show_website),
    ];

    let mut html = String::from(r#"<table class="form-table contributors-settings">"#);
    for (key, label, on) in flags {
        let checked = if on { " checked" } else { "" };
        html.push_str(&format!(
            r#"<tr><th scope="row">{label}</th><td><input type="checkbox" name="{key}" value="1"{checked}></td></tr>"#
        ));
    }

    let joined = options
        .element_order
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(",");
    html.push_str(r#"<tr><th scope="row">Element Order</th><td><ul class="contributors-sortable">"#);
    for key in &options.element_order {
        html.push_str(&sortable_item(*key));
    }
    html.push_str(&format!(
        r#"</ul><input type="hidden" name="{ORDER_FIELD}" value="{}"></td></tr>"#,
        escape_html(&joined)
    ));
    html.push_str("</table>");
    html
}

fn sortable_item(key: FieldKey) -> String {
    format!(
        r#"<li class="contributors-sortable__item" data-key="{}">{}</li>"#,
        key.as_str(),
        escape_html(key.label())
    )
}
