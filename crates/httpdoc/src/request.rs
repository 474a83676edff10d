//! Outgoing request description: method, URL, headers, params, body mode.

use reqwest::header::HeaderMap;
use reqwest::Method;
use url::Url;

use crate::multipart::{random_boundary, Part};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Ordered multimap of form or query values.
pub type Params = Vec<(String, String)>;

/// How the request body is produced. Exactly one mode is active.
#[derive(Debug, Default)]
pub enum BodyMode {
    #[default]
    None,
    /// Form params encoded as `application/x-www-form-urlencoded`.
    UrlEncodedForm,
    Raw {
        data: Vec<u8>,
        content_type: String,
    },
    /// Form params become leading fields, followed by the parts.
    Multipart { boundary: String, parts: Vec<Part> },
}

impl BodyMode {
    pub fn is_multipart(&self) -> bool {
        matches!(self, BodyMode::Multipart { .. })
    }
}

/// Methods whose params travel in the query string.
pub fn is_get_like(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::DELETE | Method::TRACE
    )
}

/// Everything needed to issue one request.
#[derive(Debug)]
pub struct RequestSpec {
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) form: Params,
    pub(crate) body: BodyMode,
}

impl RequestSpec {
    pub fn new(url: Url, headers: HeaderMap) -> Self {
        Self {
            method: Method::GET,
            url,
            headers,
            form: Vec::new(),
            body: BodyMode::None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn set_method(&mut self, method: Method) {
        self.method = method;
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &BodyMode {
        &self.body
    }

    pub fn form_params(&self) -> &[(String, String)] {
        &self.form
    }

    pub fn query_params(&self) -> Params {
        self.url.query_pairs().into_owned().collect()
    }

    /// Query value when non-empty, otherwise the form value.
    pub fn param(&self, name: &str) -> Option<String> {
        let query = self
            .url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());
        query.or_else(|| {
            self.form
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        })
    }

    /// Route to the query for GET-like methods, otherwise to the form body.
    pub fn set_param(&mut self, name: &str, value: &str) {
        if is_get_like(&self.method) {
            self.set_query_param(name, value);
        } else {
            self.set_form_value(name, value);
        }
    }

    /// Replace `name` in the query string, keeping the position of its first
    /// occurrence.
    pub fn set_query_param(&mut self, name: &str, value: &str) {
        let mut pairs = self.query_params();
        set_value(&mut pairs, name, value);
        self.set_query(&pairs);
    }

    /// Write a form value; GET-like methods are promoted to POST.
    pub fn set_post_param(&mut self, name: &str, value: &str) {
        if is_get_like(&self.method) {
            self.method = Method::POST;
        }
        self.set_form_value(name, value);
    }

    /// Replace all params: the form for body-carrying methods, else the
    /// query string.
    pub fn set_params(&mut self, values: Params) {
        if is_get_like(&self.method) {
            self.set_query(&values);
        } else {
            self.replace_form(values);
        }
    }

    pub fn set_post_params(&mut self, values: Params) {
        self.method = Method::POST;
        self.replace_form(values);
    }

    /// Raw body; drops any accumulated form fields and parts.
    pub fn set_body(&mut self, data: Vec<u8>, content_type: &str) {
        let content_type = if content_type.is_empty() {
            FORM_URLENCODED.to_string()
        } else {
            content_type.to_string()
        };
        self.method = Method::POST;
        self.form.clear();
        self.body = BodyMode::Raw { data, content_type };
    }

    /// Attach a streamed part; cancels a raw body.
    pub fn add_part(&mut self, part: Part) {
        self.method = Method::POST;
        self.ensure_multipart();
        if let BodyMode::Multipart { parts, .. } = &mut self.body {
            parts.push(part);
        }
    }

    /// Switch to multipart with `values` as the leading fields.
    pub fn set_multipart_params(&mut self, values: Params) {
        self.set_post_params(values);
        self.ensure_multipart();
    }

    /// Fix the multipart boundary; switches to multipart POST.
    pub fn set_multipart_boundary(&mut self, value: &str) {
        self.method = Method::POST;
        self.ensure_multipart();
        if let BodyMode::Multipart { boundary, .. } = &mut self.body {
            *boundary = value.to_string();
        }
    }

    fn ensure_multipart(&mut self) {
        if !self.body.is_multipart() {
            self.body = BodyMode::Multipart {
                boundary: random_boundary(),
                parts: Vec::new(),
            };
        }
    }

    fn set_form_value(&mut self, name: &str, value: &str) {
        self.leave_raw_mode();
        set_value(&mut self.form, name, value);
    }

    fn replace_form(&mut self, values: Params) {
        self.leave_raw_mode();
        self.form = values;
    }

    fn leave_raw_mode(&mut self) {
        if !self.body.is_multipart() {
            self.body = BodyMode::UrlEncodedForm;
        }
    }

    fn set_query(&mut self, pairs: &[(String, String)]) {
        if pairs.is_empty() {
            self.url.set_query(None);
            return;
        }
        self.url
            .query_pairs_mut()
            .clear()
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
}

/// Set semantics over an ordered multimap: replace the first `name`, drop
/// later duplicates, append when absent.
fn set_value(pairs: &mut Params, name: &str, value: &str) {
    let mut replaced = false;
    pairs.retain_mut(|(k, v)| {
        if k != name {
            return true;
        }
        if replaced {
            return false;
        }
        *v = value.to_string();
        replaced = true;
        true
    });
    if !replaced {
        pairs.push((name.to_string(), value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(url: &str) -> RequestSpec {
        RequestSpec::new(Url::parse(url).unwrap(), HeaderMap::new())
    }

    #[test]
    fn test_set_param_on_get_goes_to_query() {
        let mut req = spec("https://example.com/search?m=&q=old");
        req.set_param("q", "sha256");
        assert_eq!(req.url().query(), Some("m=&q=sha256"));
        assert_eq!(req.method(), Method::GET);
        assert!(req.form_params().is_empty());
    }

    #[test]
    fn test_set_post_param_promotes_to_post() {
        let mut req = spec("https://example.com/login");
        req.set_post_param("user", "ann");
        assert_eq!(req.method(), Method::POST);
        assert!(matches!(req.body(), BodyMode::UrlEncodedForm));
        assert_eq!(req.form_params(), &[("user".to_string(), "ann".to_string())]);

        // In POST mode set_param writes the form, not the query.
        req.set_param("pass", "x");
        assert_eq!(req.form_params().len(), 2);
        assert_eq!(req.url().query(), None);
    }

    #[test]
    fn test_query_param_in_post_mode_is_independent() {
        let mut req = spec("https://example.com/api");
        req.set_post_param("a", "1");
        req.set_query_param("page", "2");
        assert_eq!(req.url().query(), Some("page=2"));
        assert_eq!(req.form_params().len(), 1);
    }

    #[test]
    fn test_set_value_replaces_first_and_drops_duplicates() {
        let mut pairs = vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
            ("a".to_string(), "3".to_string()),
        ];
        set_value(&mut pairs, "a", "9");
        assert_eq!(
            pairs,
            vec![("a".to_string(), "9".to_string()), ("b".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_raw_body_clears_form_and_parts() {
        let mut req = spec("https://example.com/upload");
        req.set_post_param("a", "1");
        req.add_part(Part::bytes("f", "data"));
        req.set_body(b"{}".to_vec(), "application/json");

        assert!(req.form_params().is_empty());
        match req.body() {
            BodyMode::Raw { data, content_type } => {
                assert_eq!(data, b"{}");
                assert_eq!(content_type, "application/json");
            }
            other => panic!("expected raw body, got {other:?}"),
        }
    }

    #[test]
    fn test_part_cancels_raw_body() {
        let mut req = spec("https://example.com/upload");
        req.set_body(b"raw".to_vec(), "");
        req.add_part(Part::bytes("f", "data"));
        match req.body() {
            BodyMode::Multipart { parts, .. } => assert_eq!(parts.len(), 1),
            other => panic!("expected multipart body, got {other:?}"),
        }
    }

    #[test]
    fn test_form_write_keeps_multipart_mode() {
        let mut req = spec("https://example.com/upload");
        req.add_part(Part::bytes("f", "data"));
        req.set_post_param("title", "doc");
        assert!(req.body().is_multipart());
        assert_eq!(req.form_params().len(), 1);
    }

    #[test]
    fn test_empty_content_type_defaults_to_form() {
        let mut req = spec("https://example.com/");
        req.set_body(b"a=1".to_vec(), "");
        assert!(matches!(
            req.body(),
            BodyMode::Raw { content_type, .. } if content_type == FORM_URLENCODED
        ));
    }

    #[test]
    fn test_param_prefers_query_then_form() {
        let mut req = spec("https://example.com/?q=&x=1");
        req.set_method(Method::POST);
        req.set_param("q", "from-form");
        assert_eq!(req.param("x").as_deref(), Some("1"));
        assert_eq!(req.param("q").as_deref(), Some("from-form"));
        assert_eq!(req.param("missing"), None);
    }

    #[test]
    fn test_set_params_replaces_query_for_get() {
        let mut req = spec("https://example.com/search?old=1");
        req.set_params(vec![("q".into(), "x".into()), ("q".into(), "y".into())]);
        assert_eq!(req.url().query(), Some("q=x&q=y"));

        req.set_params(Vec::new());
        assert_eq!(req.url().query(), None);
    }

    #[test]
    fn test_put_keeps_method_when_writing_form() {
        let mut req = spec("https://example.com/item/1");
        req.set_method(Method::PUT);
        req.set_param("name", "new");
        assert_eq!(req.method(), Method::PUT);
        assert_eq!(req.form_params().len(), 1);
    }

    #[test]
    fn test_multipart_boundary_switches_to_post() {
        let mut req = spec("https://example.com/");
        req.set_multipart_boundary("B");
        assert_eq!(req.method(), Method::POST);
        match req.body() {
            BodyMode::Multipart { boundary, .. } => assert_eq!(boundary, "B"),
            other => panic!("expected multipart body, got {other:?}"),
        }
    }
}
