//! Ordered collections of extracted elements.

use std::fmt;
use std::slice;

use super::HtmlElement;

/// Ordered sequence of matched elements. Filters return new sequences.
#[derive(Debug, Clone, Default)]
pub struct HtmlElements {
    items: Vec<HtmlElement>,
}

impl HtmlElements {
    pub fn new(items: Vec<HtmlElement>) -> Self {
        Self { items }
    }

    /// The `n`th element, or `None` when out of range.
    pub fn eq(&self, n: usize) -> Option<&HtmlElement> {
        self.items.get(n)
    }

    pub fn first(&self) -> Option<&HtmlElement> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&HtmlElement> {
        self.items.last()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, HtmlElement> {
        self.items.iter()
    }

    /// Elements for which `pred` holds.
    pub fn filter(&self, pred: impl Fn(&HtmlElement) -> bool) -> Self {
        Self::new(self.items.iter().filter(|e| pred(e)).cloned().collect())
    }

    /// Elements carrying attribute `name`, whatever its value.
    pub fn filter_by_attr(&self, name: &str) -> Self {
        self.filter(|e| e.has_attr(name))
    }

    /// Elements whose attribute `name` equals `value`.
    pub fn filter_by_attr_value(&self, name: &str, value: &str) -> Self {
        self.filter(|e| e.attr(name) == Some(value))
    }

    /// This sequence followed by `other`.
    pub fn concat(&self, other: &HtmlElements) -> Self {
        let mut items = self.items.clone();
        items.extend(other.items.iter().cloned());
        Self::new(items)
    }

    pub fn into_vec(self) -> Vec<HtmlElement> {
        self.items
    }
}

impl IntoIterator for HtmlElements {
    type Item = HtmlElement;
    type IntoIter = std::vec::IntoIter<HtmlElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a HtmlElements {
    type Item = &'a HtmlElement;
    type IntoIter = slice::Iter<'a, HtmlElement>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<HtmlElement> for HtmlElements {
    fn from_iter<I: IntoIterator<Item = HtmlElement>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for HtmlElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.items.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}
