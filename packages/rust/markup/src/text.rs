//! Plain-text sanitizer for single-line form fields.

use std::sync::LazyLock;

use regex::Regex;

/// Reduce untrusted input to a single line of plain text.
///
/// Script and style blocks are removed with their content, remaining tags are
/// stripped, and any run of whitespace (including line breaks and tabs)
/// becomes one space. The result is trimmed.
pub fn sanitize_text(raw: &str) -> String {
    static BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<script\b.*?</script\s*>|<style\b.*?</style\s*>").expect("valid regex")
    });
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?[a-zA-Z!/][^>]*>").expect("valid regex")
    });
    static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let without_blocks = BLOCK_RE.replace_all(raw, "");
    let without_tags = TAG_RE.replace_all(&without_blocks, "");
    WS_RE.replace_all(&without_tags, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        assert_eq!(
            sanitize_text("  Guest\n\t<b>Writers</b>  "),
            "Guest Writers"
        );
    }

    #[test]
    fn removes_script_content() {
        assert_eq!(
            sanitize_text("Team<script>steal()</script> Picks"),
            "Team Picks"
        );
    }

    #[test]
    fn keeps_lone_angle_brackets() {
        assert_eq!(sanitize_text("1 < 2 > 0"), "1 < 2 > 0");
    }

    #[test]
    fn blank_input_becomes_empty() {
        assert_eq!(sanitize_text(" \n <br/> "), "");
    }
}
