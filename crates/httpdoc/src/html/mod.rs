//! Regex-based element extraction from HTML markup.
//!
//! This is not a parser. Elements are matched by tag name with a pair of
//! patterns (void tags and containers), which is enough for pulling forms,
//! links and meta tags out of real-world pages without building a tree.

mod element;
mod elements;
mod text;

use std::collections::BTreeMap;
use std::sync::{OnceLock, Weak};

use regex::Regex;

use crate::error::DocResult;
use crate::navigation::DocumentLink;

pub use element::HtmlElement;
pub use elements::HtmlElements;
pub use text::{decode_entities, escape, html_to_text};

/// Tags that never have content or a closing tag.
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "frame", "hr", "img", "input", "link", "meta", "option",
    "param", "source", "track", "wbr",
];

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

fn attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\s([a-zA-Z0-9\-:_]+)\s*=\s*('[^']*'|"[^"]*")"#)
            .expect("attribute regex is valid")
    })
}

/// Quoted `name=value` attributes of a tag's attribute text.
///
/// Names are lowercased and values entity-decoded. On repeated names the
/// first one wins, as in browsers.
pub fn parse_attributes(text: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    for caps in attr_re().captures_iter(text) {
        let quoted = &caps[2];
        let value = &quoted[1..quoted.len() - 1];
        attrs
            .entry(caps[1].to_ascii_lowercase())
            .or_insert_with(|| decode_entities(value).into_owned());
    }
    attrs
}

/// All `tag` elements in `markup`, in document order, without an owner.
pub fn elements_by_tag_name(markup: &str, tag: &str) -> DocResult<HtmlElements> {
    extract(markup, tag, &Weak::new())
}

pub(crate) fn extract(
    markup: &str,
    tag: &str,
    owner: &Weak<DocumentLink>,
) -> DocResult<HtmlElements> {
    let name = tag.trim().to_ascii_lowercase();
    let quoted = regex::escape(&name);

    let elements: Vec<HtmlElement> = if is_void_tag(&name) {
        let re = Regex::new(&format!(r"<(?i:{quoted})\b([^<>]*?)\s*/?>"))?;
        re.captures_iter(markup)
            .map(|caps| HtmlElement::new(&name, parse_attributes(&caps[1]), None, owner.clone()))
            .collect()
    } else {
        let re = Regex::new(&format!(
            r"<(?i:{quoted})\b([^<>]*)>([\s\S]*?)</(?i:{quoted})\s*>"
        ))?;
        re.captures_iter(markup)
            .map(|caps| {
                HtmlElement::new(
                    &name,
                    parse_attributes(&caps[1]),
                    Some(caps[2].to_string()),
                    owner.clone(),
                )
            })
            .collect()
    };

    Ok(HtmlElements::new(elements))
}
