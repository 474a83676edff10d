//! Entity decoding and markup-to-text conversion.

use std::borrow::Cow;
use std::sync::OnceLock;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use regex::{Captures, Regex};

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&#?[A-Za-z0-9]+;").expect("entity regex is valid"))
}

/// Decode named (HTML5 table) and numeric character references.
///
/// Unknown references are left as written.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    entity_re().replace_all(text, |caps: &Captures<'_>| {
        let reference = &caps[0];
        match unescape_with(reference, resolve_html5_entity) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => reference.to_string(),
        }
    })
}

/// Escape text for display inside markup or an attribute value.
pub fn escape(text: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(text)
}

struct TextRules {
    comment: Regex,
    style: Regex,
    script: Regex,
    instruction: Regex,
    whitespace: Regex,
    line_break: Regex,
    list_item: Regex,
    tag: Regex,
}

fn rules() -> &'static TextRules {
    static RULES: OnceLock<TextRules> = OnceLock::new();
    RULES.get_or_init(|| TextRules {
        comment: Regex::new(r"<!--[\s\S]*?-->").expect("comment regex is valid"),
        style: Regex::new(r"(?i)<style\b[^<>]*>[\s\S]*?</style\s*>").expect("style regex is valid"),
        script: Regex::new(r"(?i)<script\b[^<>]*>[\s\S]*?</script\s*>")
            .expect("script regex is valid"),
        instruction: Regex::new(r"<\?[\s\S]*?\?>").expect("instruction regex is valid"),
        whitespace: Regex::new(r"\s+").expect("whitespace regex is valid"),
        line_break: Regex::new(r"(?i)<(?:br|p)\b[^<>]*>").expect("line break regex is valid"),
        list_item: Regex::new(r"(?i)<li\b[^<>]*>").expect("list item regex is valid"),
        tag: Regex::new(r"<[^<>]*>").expect("tag regex is valid"),
    })
}

/// Readable text from a markup fragment.
///
/// `<br>` and `<p>` start a new line, `<li>` a bulleted one. Everything
/// else is whitespace-collapsed.
pub fn html_to_text(markup: &str) -> String {
    let r = rules();
    let text = r.comment.replace_all(markup, "");
    let text = r.style.replace_all(&text, "");
    let text = r.script.replace_all(&text, "");
    let text = r.instruction.replace_all(&text, "");
    let text = r.whitespace.replace_all(&text, " ");
    let text = r.line_break.replace_all(&text, "\n");
    let text = r.list_item.replace_all(&text, "\n• ");
    let text = r.tag.replace_all(&text, "");
    decode_entities(&text).trim().to_string()
}
