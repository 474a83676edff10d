//! A single element extracted from markup.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use regex::Regex;

use super::{escape, html_to_text, parse_attributes};
use crate::navigation::DocumentLink;
use crate::request::Params;

fn field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<(input|textarea|select|button)\b([^<>]*)>")
            .expect("form field regex is valid")
    })
}

/// A matched element: tag, attributes and (for containers) inner markup.
#[derive(Clone)]
pub struct HtmlElement {
    tag: String,
    attrs: BTreeMap<String, String>,
    inner: Option<String>,
    owner: Weak<DocumentLink>,
}

impl HtmlElement {
    pub(crate) fn new(
        tag: &str,
        attrs: BTreeMap<String, String>,
        inner: Option<String>,
        owner: Weak<DocumentLink>,
    ) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs,
            inner,
            owner,
        }
    }

    /// Lowercase tag name.
    pub fn tag_name(&self) -> &str {
        &self.tag
    }

    /// Value of attribute `name`, case-insensitive, entities decoded.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(&name.to_ascii_lowercase())
    }

    /// All attributes, keyed by lowercase name.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attrs
    }

    /// Inner markup; empty for void elements.
    pub fn inner_html(&self) -> &str {
        self.inner.as_deref().unwrap_or("")
    }

    /// Inner markup rendered as plain text.
    pub fn inner_text(&self) -> String {
        html_to_text(self.inner_html())
    }

    /// `name`/`value` of every named `input`, `textarea`, `select` and
    /// `button` in the inner markup, in order. Duplicates are kept.
    pub fn form_params(&self) -> Params {
        field_re()
            .captures_iter(self.inner_html())
            .filter_map(|caps| {
                let mut attrs = parse_attributes(&caps[2]);
                let name = attrs.remove("name").filter(|n| !n.is_empty())?;
                let value = attrs.remove("value").unwrap_or_default();
                Some((name, value))
            })
            .collect()
    }

    pub(crate) fn owner(&self) -> Option<Arc<DocumentLink>> {
        self.owner.upgrade()
    }
}

impl fmt::Debug for HtmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HtmlElement")
            .field("tag", &self.tag)
            .field("attrs", &self.attrs)
            .field("inner", &self.inner)
            .field("attached", &(self.owner.strong_count() > 0))
            .finish()
    }
}

impl fmt::Display for HtmlElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (name, value) in &self.attrs {
            write!(f, " {}=\"{}\"", name, escape(value))?;
        }
        match &self.inner {
            Some(inner) => write!(f, ">{}</{}>", inner, self.tag),
            None => write!(f, ">"),
        }
    }
}
