//! A lazily-fetched HTTP document.
//!
//! A [`Document`] is built up with setters, loaded exactly once, and then
//! queried: raw and normalized bytes, regex helpers, and tag-level HTML
//! extraction. Elements extracted from a loaded document can navigate to
//! new documents through the same session.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Weak};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, COOKIE, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncRead;
use tracing::{debug, trace};
use url::Url;

use crate::config::{header_name, header_value};
use crate::decoder::{self, charset_param, media_type};
use crate::encoder;
use crate::error::{DocError, DocResult};
use crate::html::{self, HtmlElements};
use crate::multipart::Part;
use crate::navigation::DocumentLink;
use crate::pattern::{find_all_submatches, find_submatches, Pattern};
use crate::request::{Params, RequestSpec};
use crate::session::Session;
use crate::transport::TransportResponse;

const DEFAULT_PART_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug)]
enum LoadState {
    Unloaded,
    /// A load started and has not finished. Seen on entry only when the
    /// previous load future was dropped.
    InFlight,
    Done(DocResult<()>),
}

/// One HTTP request and, once loaded, its response.
pub struct Document {
    session: Session,
    request: RequestSpec,
    response: Option<TransportResponse>,
    body: Option<Vec<u8>>,
    state: LoadState,
    link: Option<Arc<DocumentLink>>,
}

impl Document {
    /// Unloaded document for `url`. Userinfo in the URL becomes basic auth.
    pub fn new(session: &Session, url: &str) -> DocResult<Self> {
        Self::with_url(session, Url::parse(url)?)
    }

    pub(crate) fn with_url(session: &Session, url: Url) -> DocResult<Self> {
        let credentials = (!url.username().is_empty())
            .then(|| (url.username().to_string(), url.password().map(str::to_string)));

        let mut doc = Self {
            session: session.clone(),
            request: RequestSpec::new(url, session.default_headers().clone()),
            response: None,
            body: None,
            state: LoadState::Unloaded,
            link: None,
        };
        if let Some((user, password)) = credentials {
            doc.set_basic_auth(&user, password.as_deref().unwrap_or(""))?;
        }
        Ok(doc)
    }

    // ---------------------------------------------------------------
    // Request side
    // ---------------------------------------------------------------

    /// Session this document was created from.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The request as it will be sent.
    pub fn request(&self) -> &RequestSpec {
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Set the HTTP method from a token such as `PUT`.
    pub fn set_method(&mut self, method: &str) -> DocResult<&mut Self> {
        let token = method.trim().to_ascii_uppercase();
        let method = Method::from_bytes(token.as_bytes())
            .map_err(|_| DocError::InvalidMethod(method.to_string()))?;
        self.request.set_method(method);
        Ok(self)
    }

    /// Effective URL: the final URL after redirects once loaded.
    pub fn url(&self) -> &Url {
        match &self.response {
            Some(resp) => &resp.url,
            None => self.request.url(),
        }
    }

    /// Query pairs of the request URL, in order.
    pub fn query_params(&self) -> Params {
        self.url().query_pairs().into_owned().collect()
    }

    /// Value of `name` from the query, falling back to the form.
    pub fn param(&self, name: &str) -> Option<String> {
        self.request.param(name)
    }

    /// Query value for GET-like methods, form value otherwise.
    pub fn set_param(&mut self, name: &str, value: &str) -> &mut Self {
        self.request.set_param(name, value);
        self
    }

    /// Set `name` in the query string regardless of method.
    pub fn set_query_param(&mut self, name: &str, value: &str) -> &mut Self {
        self.request.set_query_param(name, value);
        self
    }

    pub fn set_get_param(&mut self, name: &str, value: &str) -> &mut Self {
        self.set_query_param(name, value)
    }

    /// Set a form value, promoting GET-like methods to POST.
    pub fn set_post_param(&mut self, name: &str, value: &str) -> &mut Self {
        self.request.set_post_param(name, value);
        self
    }

    /// Replace every param at once, routed like [`set_param`](Self::set_param).
    pub fn set_params(&mut self, values: Params) -> &mut Self {
        self.request.set_params(values);
        self
    }

    pub fn set_post_params(&mut self, values: Params) -> &mut Self {
        self.request.set_post_params(values);
        self
    }

    /// Raw POST body. An empty content type means form-urlencoded.
    pub fn set_body(&mut self, data: impl Into<Vec<u8>>, content_type: &str) -> &mut Self {
        self.request.set_body(data.into(), content_type);
        self
    }

    /// Alias of [`set_body`](Self::set_body).
    pub fn set_post_data(&mut self, data: impl Into<Vec<u8>>, content_type: &str) -> &mut Self {
        self.set_body(data, content_type)
    }

    pub fn set_json<T: Serialize + ?Sized>(&mut self, value: &T) -> DocResult<&mut Self> {
        let data = serde_json::to_vec(value)?;
        Ok(self.set_body(data, "application/json"))
    }

    /// Attach a prepared part; switches to multipart POST.
    pub fn add_multipart_part(&mut self, part: Part) -> &mut Self {
        self.request.add_part(part);
        self
    }

    /// Attach a streamed part named `name`; the field name doubles as filename.
    pub fn set_multipart_content(
        &mut self,
        name: &str,
        source: impl AsyncRead + Send + Unpin + 'static,
        content_type: &str,
    ) -> &mut Self {
        let part = Part::new(name, source)
            .with_filename(name)
            .with_content_type(content_type);
        self.add_multipart_part(part)
    }

    /// Attach a file part. The file is opened now and streamed during load.
    pub async fn set_file(
        &mut self,
        name: &str,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> DocResult<&mut Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        let part = Part::new(name, file)
            .with_filename(filename)
            .with_content_type(content_type.unwrap_or(DEFAULT_PART_CONTENT_TYPE));
        Ok(self.add_multipart_part(part))
    }

    /// Form fields written ahead of the parts in a multipart body.
    pub fn set_multipart_params(&mut self, values: Params) -> &mut Self {
        self.request.set_multipart_params(values);
        self
    }

    /// Fix the boundary instead of a random one.
    pub fn set_multipart_boundary(&mut self, boundary: &str) -> &mut Self {
        self.request.set_multipart_boundary(boundary);
        self
    }

    /// Replace header `name`.
    pub fn set_header(&mut self, name: &str, value: &str) -> DocResult<&mut Self> {
        let name = header_name(name)?;
        let value = header_value(value)?;
        self.request.headers_mut().insert(name, value);
        Ok(self)
    }

    /// Append a value to header `name`.
    pub fn add_header(&mut self, name: &str, value: &str) -> DocResult<&mut Self> {
        let name = header_name(name)?;
        let value = header_value(value)?;
        self.request.headers_mut().append(name, value);
        Ok(self)
    }

    pub fn set_headers<I, K, V>(&mut self, headers: I) -> DocResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self.set_header(name.as_ref(), value.as_ref())?;
        }
        Ok(self)
    }

    pub fn set_user_agent(&mut self, user_agent: &str) -> DocResult<&mut Self> {
        let value = header_value(user_agent)?;
        self.request.headers_mut().insert(USER_AGENT, value);
        Ok(self)
    }

    /// `Authorization: Basic`, marked sensitive.
    pub fn set_basic_auth(&mut self, username: &str, password: &str) -> DocResult<&mut Self> {
        let value = basic_auth(username, password)?;
        self.request.headers_mut().insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Cookie for this request's URL: into the session jar when there is one, the `Cookie` header otherwise.
    pub fn add_cookie(&mut self, name: &str, value: &str) -> DocResult<&mut Self> {
        self.store_cookies(&[(name.to_string(), value.to_string())])?;
        Ok(self)
    }

    pub fn add_cookies<I, K, V>(&mut self, cookies: I) -> DocResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let cookies: Vec<(String, String)> = cookies
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.store_cookies(&cookies)?;
        Ok(self)
    }

    /// Replace the request's `Cookie` header, then add `cookies`.
    pub fn set_cookies<I, K, V>(&mut self, cookies: I) -> DocResult<&mut Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.request.headers_mut().remove(COOKIE);
        self.add_cookies(cookies)
    }

    fn store_cookies(&mut self, cookies: &[(String, String)]) -> DocResult<()> {
        if cookies.is_empty() {
            return Ok(());
        }
        if self
            .session
            .transport()
            .store_cookies(self.request.url(), cookies)
        {
            return Ok(());
        }

        let mut line = self
            .request
            .headers()
            .get(COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        for (name, value) in cookies {
            if !line.is_empty() {
                line.push_str("; ");
            }
            line.push_str(name);
            line.push('=');
            line.push_str(value);
        }
        let value = header_value(&line)?;
        self.request.headers_mut().insert(COOKIE, value);
        Ok(())
    }

    /// Route this document through `addr`. An empty address is ignored.
    pub fn set_proxy(&mut self, addr: &str) -> DocResult<&mut Self> {
        if !addr.trim().is_empty() {
            self.session = self.session.with_proxy(addr)?;
        }
        Ok(self)
    }

    // ---------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------

    /// Fetch, normalize, run hooks and check the status. Exactly once:
    /// later calls return the cached outcome.
    pub async fn load(&mut self) -> DocResult<()> {
        if let LoadState::Done(outcome) = &self.state {
            return outcome.clone();
        }
        if matches!(self.state, LoadState::InFlight) {
            debug!(url = %self.url(), "previous load was abandoned");
            self.state = LoadState::Done(Err(DocError::Cancelled));
            return Err(DocError::Cancelled);
        }

        self.state = LoadState::InFlight;
        let outcome = self.fetch().await;
        self.state = LoadState::Done(outcome.clone());
        outcome
    }

    /// Alias of [`load`](Self::load), reads better after filling a form.
    pub async fn submit(&mut self) -> DocResult<()> {
        self.load().await
    }

    async fn fetch(&mut self) -> DocResult<()> {
        let request = encoder::finalize(&mut self.request)?;
        debug!(method = %request.method, url = %request.url, "loading document");

        let transport = Arc::clone(self.session.transport());
        let response = transport.execute(request).await?;

        let status = response.status;
        let normalized = decoder::normalize(&response.headers, &response.body);
        self.link = Some(Arc::new(DocumentLink::new(
            response.url.clone(),
            self.session.clone(),
        )));
        self.response = Some(response);
        self.body = Some(normalized?);

        self.session.run_hooks(self)?;

        if status >= 400 {
            debug!(url = %self.url(), status, "document loaded with error status");
            return Err(DocError::Status { status });
        }
        debug!(url = %self.url(), status, "document loaded");
        Ok(())
    }

    /// A response was received, whatever its status.
    pub fn is_loaded(&self) -> bool {
        self.response.is_some()
    }

    pub fn response(&self) -> Option<&TransportResponse> {
        self.response.as_ref()
    }

    /// Response status, once loaded.
    pub fn status(&self) -> Option<u16> {
        self.response.as_ref().map(|r| r.status)
    }

    pub fn response_headers(&self) -> Option<&HeaderMap> {
        self.response.as_ref().map(|r| &r.headers)
    }

    /// Body bytes exactly as received.
    pub fn raw_body(&self) -> Option<&[u8]> {
        self.response.as_ref().map(|r| r.body.as_slice())
    }

    /// Decompressed, UTF-8 transcoded body.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    // ---------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------

    /// Normalized body, loading first.
    pub async fn content(&mut self) -> DocResult<&[u8]> {
        self.load().await?;
        Ok(self.body.as_deref().unwrap_or_default())
    }

    /// Content as text, lossily decoded.
    pub async fn content_str(&mut self) -> DocResult<Cow<'_, str>> {
        let bytes = self.content().await?;
        Ok(String::from_utf8_lossy(bytes))
    }

    /// Lowercase media type of the response, without parameters.
    pub async fn content_type(&mut self) -> DocResult<String> {
        self.load().await?;
        Ok(self.header_content_type().map(media_type).unwrap_or_default())
    }

    /// Charset declared by the response; `utf-8` when absent.
    pub async fn charset(&mut self) -> DocResult<String> {
        self.load().await?;
        Ok(self
            .header_content_type()
            .and_then(charset_param)
            .unwrap_or_else(|| "utf-8".to_string()))
    }

    pub async fn is_image(&mut self) -> DocResult<bool> {
        Ok(self.content_type().await?.starts_with("image"))
    }

    /// Deserialize the content as JSON.
    pub async fn json<T: DeserializeOwned>(&mut self) -> DocResult<T> {
        let bytes = self.content().await?;
        Ok(serde_json::from_slice(bytes)?)
    }

    fn header_content_type(&self) -> Option<&str> {
        self.response_headers()?
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Log the request and response at debug level, the body at trace.
    /// Loads first; a failed load is logged, not returned.
    pub async fn trace(&mut self) -> &mut Self {
        if let Err(e) = self.load().await {
            debug!(url = %self.url(), error = %e, "trace: load failed");
        }
        debug!(
            url = %self.request.url(),
            effective_url = %self.url(),
            method = %self.request.method(),
            status = ?self.status(),
            request_headers = ?self.request.headers(),
            query = ?self.query_params(),
            form = ?self.request.form_params(),
            response_headers = ?self.response_headers(),
            "httpdoc request"
        );
        if let Some(body) = self.body() {
            trace!(body = %String::from_utf8_lossy(body), "httpdoc response body");
        }
        self
    }

    // ---------------------------------------------------------------
    // Regex helpers
    // ---------------------------------------------------------------

    /// Groups of the first match of `pattern` in the content.
    pub async fn find_submatches(&mut self, pattern: impl Into<Pattern>) -> DocResult<Vec<String>> {
        let pattern = pattern.into();
        let re = pattern.compile()?;
        let text = self.content_str().await?;
        Ok(find_submatches(&re, &text))
    }

    /// Group `n` of the first match, or an empty string.
    pub async fn submatch(&mut self, pattern: impl Into<Pattern>, n: usize) -> DocResult<String> {
        let groups = self.find_submatches(pattern).await?;
        Ok(groups.into_iter().nth(n).unwrap_or_default())
    }

    /// Every whole match of `pattern`.
    pub async fn find_all(&mut self, pattern: impl Into<Pattern>) -> DocResult<Vec<String>> {
        let pattern = pattern.into();
        let re = pattern.compile()?;
        let text = self.content_str().await?;
        Ok(re.find_iter(&text).map(|m| m.as_str().to_string()).collect())
    }

    /// Groups of every match.
    pub async fn submatches_all(
        &mut self,
        pattern: impl Into<Pattern>,
    ) -> DocResult<Vec<Vec<String>>> {
        let pattern = pattern.into();
        let re = pattern.compile()?;
        let text = self.content_str().await?;
        Ok(find_all_submatches(&re, &text))
    }

    /// Group `n` of every match.
    pub async fn all_submatches(
        &mut self,
        pattern: impl Into<Pattern>,
        n: usize,
    ) -> DocResult<Vec<String>> {
        let all = self.submatches_all(pattern).await?;
        Ok(all
            .into_iter()
            .map(|groups| groups.into_iter().nth(n).unwrap_or_default())
            .collect())
    }

    // ---------------------------------------------------------------
    // HTML helpers
    // ---------------------------------------------------------------

    /// Elements named `tag`, in document order.
    pub async fn elements_by_tag_name(&mut self, tag: &str) -> DocResult<HtmlElements> {
        self.load().await?;
        self.loaded_elements(tag)
    }

    /// Elements from whatever body is present, without loading.
    pub(crate) fn loaded_elements(&self, tag: &str) -> DocResult<HtmlElements> {
        let owner = self.link();
        let text = String::from_utf8_lossy(self.body().unwrap_or_default());
        html::extract(&text, tag, &owner)
    }

    /// Inner text of the first `<title>`, or empty.
    pub async fn title(&mut self) -> DocResult<String> {
        let titles = self.elements_by_tag_name("title").await?;
        Ok(titles.first().map(|t| t.inner_text()).unwrap_or_default())
    }

    pub async fn forms(&mut self) -> DocResult<HtmlElements> {
        self.elements_by_tag_name("form").await
    }

    /// Every `<a>` element.
    pub async fn links(&mut self) -> DocResult<HtmlElements> {
        self.elements_by_tag_name("a").await
    }

    /// `<iframe>` elements followed by `<frame>` elements.
    pub async fn frames(&mut self) -> DocResult<HtmlElements> {
        let iframes = self.elements_by_tag_name("iframe").await?;
        let frames = self.elements_by_tag_name("frame").await?;
        Ok(iframes.concat(&frames))
    }

    pub async fn images(&mut self) -> DocResult<HtmlElements> {
        self.elements_by_tag_name("img").await
    }

    pub async fn scripts(&mut self) -> DocResult<HtmlElements> {
        self.elements_by_tag_name("script").await
    }

    /// Every `<meta>` element.
    pub async fn meta_tags(&mut self) -> DocResult<HtmlElements> {
        self.elements_by_tag_name("meta").await
    }

    /// `content` of `<meta name="description">`, or empty.
    pub async fn meta_description(&mut self) -> DocResult<String> {
        self.load().await?;
        Ok(self.meta_content("name", "description")?.unwrap_or_default())
    }

    /// `content` of `<meta name="csrf-token">`, or empty.
    pub async fn meta_csrf_token(&mut self) -> DocResult<String> {
        self.load().await?;
        Ok(self.loaded_csrf_token()?.unwrap_or_default())
    }

    pub(crate) fn loaded_csrf_token(&self) -> DocResult<Option<String>> {
        self.meta_content("name", "csrf-token")
    }

    fn meta_content(&self, attr: &str, value: &str) -> DocResult<Option<String>> {
        Ok(self
            .loaded_elements("meta")?
            .filter_by_attr_value(attr, value)
            .first()
            .and_then(|e| e.attr("content"))
            .map(str::to_string))
    }

    /// Icon URL from `<link rel=...>`, preferring `icon`, then
    /// `shortcut icon`, then `apple-touch-icon`.
    pub async fn meta_icon(&mut self) -> DocResult<String> {
        let links = self.elements_by_tag_name("link").await?.filter_by_attr("href");
        for rel in ["icon", "shortcut icon", "apple-touch-icon"] {
            let tagged = links.filter_by_attr_value("rel", rel);
            if tagged.is_empty() {
                continue;
            }
            let ico = tagged.filter_by_attr_value("type", "image/ico");
            let pick = ico.first().or_else(|| tagged.first());
            return Ok(pick
                .and_then(|e| e.attr("href"))
                .unwrap_or_default()
                .to_string());
        }
        Ok(String::new())
    }

    /// Representative image: `<link rel="image">`, `<link rel="image_src">`,
    /// then `<meta property="og:image">`.
    pub async fn meta_image(&mut self) -> DocResult<String> {
        let links = self.elements_by_tag_name("link").await?.filter_by_attr("href");
        for rel in ["image", "image_src"] {
            if let Some(href) = links
                .filter_by_attr_value("rel", rel)
                .first()
                .and_then(|e| e.attr("href"))
            {
                return Ok(href.to_string());
            }
        }
        Ok(self
            .meta_content("property", "og:image")?
            .unwrap_or_default())
    }

    fn link(&self) -> Weak<DocumentLink> {
        self.link.as_ref().map(Arc::downgrade).unwrap_or_default()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "httpdoc.Document(url={} loaded={})",
            self.url(),
            self.is_loaded()
        )
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("url", &self.url().as_str())
            .field("method", self.request.method())
            .field("state", &self.state)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

fn basic_auth(username: &str, password: &str) -> DocResult<HeaderValue> {
    let token = STANDARD.encode(format!("{username}:{password}"));
    let mut value = header_value(&format!("Basic {token}"))?;
    value.set_sensitive(true);
    Ok(value)
}
