//! Following links and submitting forms into new documents.

use reqwest::Method;
use url::Url;

use crate::document::Document;
use crate::error::{DocError, DocResult};
use crate::html::HtmlElement;
use crate::session::Session;

const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// What an extracted element needs from its document to navigate: the
/// effective URL to resolve against and the session to share.
#[derive(Debug)]
pub struct DocumentLink {
    url: Url,
    session: Session,
}

impl DocumentLink {
    pub(crate) fn new(url: Url, session: Session) -> Self {
        Self { url, session }
    }

    /// Unloaded document for `target` resolved against this link's URL,
    /// with `Referer` and `Origin` set. An empty target is the page itself.
    pub fn new_doc(&self, target: &str) -> DocResult<Document> {
        let url = self.url.join(target.trim())?;
        let mut doc = Document::with_url(&self.session, url)?;
        doc.set_header("Referer", referrer(&self.url).as_str())?;
        doc.set_header("Origin", &origin(&self.url))?;
        Ok(doc)
    }
}

/// The page URL without credentials or fragment.
fn referrer(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    // Fails only for URLs that cannot carry credentials, which have none.
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url
}

/// `scheme://host[:port]`, default ports omitted.
fn origin(url: &Url) -> String {
    url.origin().ascii_serialization()
}

impl Document {
    /// Unloaded document for a link relative to this document's effective URL.
    pub fn new_doc(&self, target: &str) -> DocResult<Document> {
        DocumentLink::new(self.url().clone(), self.session().clone()).new_doc(target)
    }

    /// Like [`new_doc`](Self::new_doc) with XHR headers, and the page's CSRF
    /// token when this document is loaded and declares one.
    pub fn new_ajax(&self, target: &str) -> DocResult<Document> {
        let mut doc = self.new_doc(target)?;
        if self.is_loaded() {
            if let Some(token) = self.loaded_csrf_token()?.filter(|t| !t.is_empty()) {
                doc.set_header("x-csrf-token-auth", &token)?;
            }
        }
        doc.set_header("X-Requested-With", "XMLHttpRequest")?;
        Ok(doc)
    }
}

impl HtmlElement {
    /// The document this element points at.
    ///
    /// Forms resolve `action` and carry their fields (query for GET, body
    /// otherwise); `a` and `link` follow `href`; anything else follows `src`.
    pub fn to_document(&self) -> DocResult<Document> {
        let link = self.owner().ok_or(DocError::DetachedElement)?;

        match self.tag_name() {
            "form" => {
                let mut doc = link.new_doc(self.attr("action").unwrap_or(""))?;
                let method = self
                    .attr("method")
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .unwrap_or("GET");
                doc.set_method(method)?;

                let params = self.form_params();
                let multipart = *doc.method() == Method::POST
                    && self
                        .attr("enctype")
                        .is_some_and(|e| e.trim().eq_ignore_ascii_case(MULTIPART_FORM_DATA));
                if multipart {
                    doc.set_multipart_params(params);
                } else {
                    doc.set_params(params);
                }
                Ok(doc)
            }
            "a" | "link" => link.new_doc(self.attr("href").unwrap_or("")),
            _ => link.new_doc(self.attr("src").unwrap_or("")),
        }
    }
}
