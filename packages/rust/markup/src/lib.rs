//! Output-context escaping and input sanitizing for contributor markup.
//!
//! Every user-controlled string that reaches rendered HTML goes through one
//! of these helpers:
//! - [`escape_html`] for text and attribute values
//! - [`sanitize_url`] for `href`/`src`/`cite` values
//! - [`filter_html`] for profile bios, which keep a small tag allowlist
//! - [`sanitize_text`] for single-line plain-text form fields

mod filter;
mod text;

use url::Url;

pub use filter::filter_html;
pub use text::sanitize_text;

/// URL schemes allowed in rendered links and images.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

/// Escape `&`, `<`, `>`, `"` and `'` so the value is safe as element text or
/// as a quoted attribute value.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Normalize a user-supplied URL, or `None` if it is empty or uses a
/// disallowed scheme.
///
/// Scheme-less input that looks like a host (`example.com/me`) is treated as
/// `http://`. The result is still raw; escape it before embedding.
pub fn sanitize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) if looks_like_host(trimmed) => {
            Url::parse(&format!("http://{trimmed}")).ok()?
        }
        Err(_) => return None,
    };

    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        tracing::trace!(scheme = parsed.scheme(), "dropping url with disallowed scheme");
        return None;
    }
    Some(parsed.to_string())
}

fn looks_like_host(raw: &str) -> bool {
    !raw.starts_with(['/', '#', '?', '.'])
        && raw
            .split('/')
            .next()
            .is_some_and(|host| host.contains('.') && !host.contains(char::is_whitespace))
}
