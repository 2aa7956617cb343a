//! Allowlist HTML filter for rich profile text.
//!
//! The input is parsed as an HTML fragment and re-serialized: allowed
//! elements keep their allowed attributes, other elements are unwrapped
//! (their text survives, escaped), and a few elements are dropped together
//! with everything inside them. Comments and processing instructions vanish.

use scraper::{ElementRef, Html, Node};

use crate::{escape_html, sanitize_url};

/// Allowed elements and the attributes each may carry.
const ALLOWED: &[(&str, &[&str])] = &[
    ("a", &["href", "title", "rel", "target"]),
    ("abbr", &["title"]),
    ("b", &[]),
    ("blockquote", &["cite"]),
    ("br", &[]),
    ("cite", &[]),
    ("code", &[]),
    ("del", &[]),
    ("em", &[]),
    ("i", &[]),
    ("li", &[]),
    ("ol", &[]),
    ("p", &[]),
    ("q", &["cite"]),
    ("s", &[]),
    ("span", &["title"]),
    ("strong", &[]),
    ("sub", &[]),
    ("sup", &[]),
    ("u", &[]),
    ("ul", &[]),
];

/// Attributes whose values are URLs and must pass [`sanitize_url`].
const URL_ATTRIBUTES: &[&str] = &["href", "cite"];

/// Elements removed together with their content.
const DROP_WITH_CONTENT: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "template", "noscript",
];

const VOID_ELEMENTS: &[&str] = &["br"];

/// Filter an HTML fragment down to the allowlist.
pub fn filter_html(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    let mut out = String::with_capacity(fragment.len());
    write_children(doc.root_element(), &mut out);
    out
}

fn write_children(parent: ElementRef<'_>, out: &mut String) {
    for child in parent.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_html(text)),
            Node::Element(_) => {
                if let Some(element) = ElementRef::wrap(child) {
                    write_element(element, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();

    if DROP_WITH_CONTENT.contains(&name) {
        return;
    }

    let Some(allowed_attrs) = ALLOWED
        .iter()
        .find(|(tag, _)| *tag == name)
        .map(|(_, attrs)| *attrs)
    else {
        // Unwrap: keep the text, lose the tag.
        write_children(element, out);
        return;
    };

    out.push('<');
    out.push_str(name);
    for (attr, value) in element.value().attrs() {
        if !allowed_attrs.contains(&attr) {
            continue;
        }
        let value = if URL_ATTRIBUTES.contains(&attr) {
            match sanitize_url(value) {
                Some(url) => url,
                None => continue,
            }
        } else {
            value.to_string()
        };
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&escape_html(&value));
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    write_children(element, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}
