//! `[[Name]]` link markers inside row text.
//!
//! Everything here is pure string work; the storage layer calls
//! [`extract_links`] when it rebuilds a row's reference index.

use std::ops::Range;

const OPEN: &str = "[[";
const CLOSE: &str = "]]";

/// One `[[Name]]` marker. `span` covers the brackets, `name` is the text between them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Link<'a> {
    pub span: Range<usize>,
    pub name: &'a str,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Span<'a> {
    Text(&'a str),
    Link(&'a str),
}

/// Scans left to right for non-overlapping `[[...]]` markers.
///
/// Names are returned verbatim. `[[]]` is not a link, and an unterminated
/// `[[` ends the scan.
pub fn extract_links(text: &str) -> Vec<Link<'_>> {
    let mut links = Vec::new();
    let mut cursor = 0;
    while let Some(start) = text[cursor..].find(OPEN) {
        let start_ix = cursor + start;
        let name_ix = start_ix + OPEN.len();
        let Some(end_rel) = text[name_ix..].find(CLOSE) else {
            break;
        };
        let end_ix = name_ix + end_rel;
        let close_ix = end_ix + CLOSE.len();
        if end_ix > name_ix {
            links.push(Link {
                span: start_ix..close_ix,
                name: &text[name_ix..end_ix],
            });
        }
        cursor = close_ix;
    }
    links
}

/// Distinct link names in order of first appearance.
pub fn link_names(text: &str) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for link in extract_links(text) {
        if !names.contains(&link.name) {
            names.push(link.name);
        }
    }
    names
}

/// Cuts text into alternating plain and link segments for display.
pub fn split_spans(text: &str) -> Vec<Span<'_>> {
    let mut spans = Vec::new();
    let mut cursor = 0;
    for link in extract_links(text) {
        if link.span.start > cursor {
            spans.push(Span::Text(&text[cursor..link.span.start]));
        }
        spans.push(Span::Link(link.name));
        cursor = link.span.end;
    }
    if cursor < text.len() {
        spans.push(Span::Text(&text[cursor..]));
    }
    spans
}

pub fn marker(name: &str) -> String {
    format!("{OPEN}{name}{CLOSE}")
}

/// Whether `[[name]]` reads back as exactly `name`. Rules out the empty
/// name, names containing `]]` and names ending in `]`.
pub fn is_linkable(name: &str) -> bool {
    let marked = marker(name);
    matches!(extract_links(&marked).as_slice(), [link] if link.name == name)
}

/// Rewrites every literal `[[old]]` to `[[new]]`.
pub fn rename_links(text: &str, old: &str, new: &str) -> String {
    text.replace(&marker(old), &marker(new))
}
