//! Regex parameters accepted either as source text or precompiled.

use std::borrow::Cow;

use regex::Regex;

use crate::error::DocResult;

/// A regex argument. Raw text is compiled once when the call is made.
#[derive(Debug, Clone)]
pub enum Pattern {
    Raw(String),
    Compiled(Regex),
}

impl Pattern {
    pub fn compile(&self) -> DocResult<Cow<'_, Regex>> {
        match self {
            Pattern::Raw(src) => Ok(Cow::Owned(Regex::new(src)?)),
            Pattern::Compiled(re) => Ok(Cow::Borrowed(re)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Raw(src) => src,
            Pattern::Compiled(re) => re.as_str(),
        }
    }
}

impl From<&str> for Pattern {
    fn from(src: &str) -> Self {
        Pattern::Raw(src.to_string())
    }
}

impl From<String> for Pattern {
    fn from(src: String) -> Self {
        Pattern::Raw(src)
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Pattern::Compiled(re)
    }
}

impl From<&Regex> for Pattern {
    fn from(re: &Regex) -> Self {
        Pattern::Compiled(re.clone())
    }
}

/// Capture groups of the first match; unmatched optional groups become "".
/// Index 0 is the whole match.
pub fn find_submatches(re: &Regex, text: &str) -> Vec<String> {
    re.captures(text)
        .map(|caps| captures_to_vec(&caps))
        .unwrap_or_default()
}

/// Capture groups of every match, in order.
pub fn find_all_submatches(re: &Regex, text: &str) -> Vec<Vec<String>> {
    re.captures_iter(text)
        .map(|caps| captures_to_vec(&caps))
        .collect()
}

fn captures_to_vec(caps: &regex::Captures<'_>) -> Vec<String> {
    caps.iter()
        .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
        .collect()
}
