//! Transport collaborator: one finalized request in, one buffered response out.
//!
//! Redirects, cookies, connection reuse, timeouts and proxies belong here.
//! [`ReqwestTransport`] is the default; tests substitute stubs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::debug;
use url::Url;

use crate::config::{normalize_proxy_addr, ClientConfig};
use crate::error::{DocResult, TransportError};
use crate::multipart::MultipartBody;

/// Finalized request body.
#[derive(Debug)]
pub enum RequestBody {
    Empty,
    Bytes(Vec<u8>),
    Stream(MultipartBody),
}

/// A request ready to go on the wire.
#[derive(Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

/// Fully buffered response as received. The body is not decompressed.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError>;

    /// Store cookies in the transport's jar. Returns `false` when the
    /// transport has no jar and the caller should send them as a header.
    fn store_cookies(&self, _url: &Url, _cookies: &[(String, String)]) -> bool {
        false
    }

    /// A transport with the same settings routed through `proxy`.
    fn with_proxy(&self, _proxy: &Url) -> Result<Arc<dyn Transport>, TransportError> {
        Err(TransportError::unsupported("transport does not support proxies"))
    }
}

/// reqwest-backed transport with a shared cookie jar.
///
/// Automatic decompression is not enabled: the document's response decoder
/// needs the encoded bytes and the original `Content-Encoding` header.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    jar: Option<Arc<reqwest::cookie::Jar>>,
    config: ClientConfig,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> DocResult<Self> {
        let jar = config.cookies.then(|| Arc::new(reqwest::cookie::Jar::default()));
        let proxy = config
            .proxy
            .as_deref()
            .map(normalize_proxy_addr)
            .transpose()?;
        let client = Self::build_client(config, jar.clone(), proxy.as_ref())?;
        Ok(Self {
            client,
            jar,
            config: config.clone(),
        })
    }

    fn build_client(
        config: &ClientConfig,
        jar: Option<Arc<reqwest::cookie::Jar>>,
        proxy: Option<&Url>,
    ) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects));

        if let Some(jar) = jar {
            builder = builder.cookie_provider(jar);
        }
        if let Some(proxy) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }

        Ok(builder.build()?)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: OutgoingRequest) -> Result<TransportResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(data) => builder.body(data),
            RequestBody::Stream(stream) => builder.body(reqwest::Body::wrap_stream(stream)),
        };

        let resp = builder.send().await?;
        let url = resp.url().clone();
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();

        // Buffered; documents are small enough to hold in memory.
        let body = resp.bytes().await?.to_vec();

        debug!(%url, status, bytes = body.len(), "response received");
        Ok(TransportResponse {
            url,
            status,
            headers,
            body,
        })
    }

    fn store_cookies(&self, url: &Url, cookies: &[(String, String)]) -> bool {
        let Some(jar) = &self.jar else {
            return false;
        };
        for (name, value) in cookies {
            jar.add_cookie_str(&format!("{name}={value}"), url);
        }
        true
    }

    fn with_proxy(&self, proxy: &Url) -> Result<Arc<dyn Transport>, TransportError> {
        // Same jar, so a proxied document keeps the session's cookies.
        let client = Self::build_client(&self.config, self.jar.clone(), Some(proxy))?;
        let mut config = self.config.clone();
        config.proxy = Some(proxy.to_string());
        Ok(Arc::new(Self {
            client,
            jar: self.jar.clone(),
            config,
        }))
    }
}
