//! Shared, immutable client configuration for documents.
//!
//! A `Session` bundles the transport (with its cookie jar and connection
//! pool), the default header set and the ordered middleware hooks. It is
//! cheap to clone and every document created from it shares the same state.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::{header_name, header_value, merge_headers, normalize_proxy_addr, ClientConfig};
use crate::document::Document;
use crate::error::{DocError, DocResult};
use crate::transport::{ReqwestTransport, Transport};

/// Post-load middleware. Runs after decoding and before the status check.
pub type Hook = Arc<dyn Fn(&Document) -> anyhow::Result<()> + Send + Sync>;

/// Proxied transports kept per address before the cache is reset.
const PROXY_CACHE_CAP: usize = 1000;

type ProxyCache = Arc<Mutex<HashMap<String, Arc<dyn Transport>>>>;

#[derive(Clone)]
pub struct Session {
    transport: Arc<dyn Transport>,
    default_headers: Arc<HeaderMap>,
    hooks: Arc<[Hook]>,
    proxies: ProxyCache,
}

impl Session {
    /// Session over a reqwest transport built from `config`.
    pub fn new(config: &ClientConfig) -> DocResult<Self> {
        Self::builder().config(config.clone()).build()
    }

    /// Session configured from `HTTPDOC_*` environment variables.
    pub fn from_env() -> DocResult<Self> {
        Self::new(&ClientConfig::from_env())
    }

    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub fn hooks(&self) -> &[Hook] {
        &self.hooks
    }

    /// A new unloaded document for `url`.
    pub fn document(&self, url: &str) -> DocResult<Document> {
        Document::new(self, url)
    }

    /// Fetch `url` and deserialize its body as JSON.
    pub async fn load_json<T: DeserializeOwned>(&self, url: &str) -> DocResult<T> {
        let mut doc = self.document(url)?;
        doc.json().await
    }

    /// The same session routed through `addr`.
    ///
    /// Proxied transports are cached per address and shared by every
    /// session derived from this one.
    pub fn with_proxy(&self, addr: &str) -> DocResult<Session> {
        let proxy = normalize_proxy_addr(addr)?;
        let key = proxy.to_string();

        let mut cache = self.proxies.lock().unwrap_or_else(|e| e.into_inner());
        let transport = if let Some(t) = cache.get(&key).cloned() {
            t
        } else {
            debug!(proxy = %key, "creating proxied transport");
            let t = self.transport.with_proxy(&proxy)?;
            if cache.len() >= PROXY_CACHE_CAP {
                cache.clear();
            }
            cache.insert(key, Arc::clone(&t));
            t
        };
        drop(cache);

        Ok(Session {
            transport,
            default_headers: Arc::clone(&self.default_headers),
            hooks: Arc::clone(&self.hooks),
            proxies: Arc::clone(&self.proxies),
        })
    }

    /// Run hooks in registration order; the first failure stops the chain.
    pub(crate) fn run_hooks(&self, doc: &Document) -> DocResult<()> {
        for (index, hook) in self.hooks.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| hook(doc))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(hook = index, url = %doc.url(), error = %e, "middleware failed");
                    return Err(DocError::Middleware(format!("{e:#}")));
                }
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    warn!(hook = index, url = %doc.url(), panic = %msg, "middleware panicked");
                    return Err(DocError::Middleware(format!("panic: {msg}")));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("default_headers", &self.default_headers)
            .field("hooks", &self.hooks.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    headers: HeaderMap,
    hooks: Vec<Hook>,
}

impl SessionBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `transport` instead of building a reqwest client from the config.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override a default header. Later calls for the same name add values.
    pub fn default_header(mut self, name: &str, value: &str) -> DocResult<Self> {
        self.headers.append(header_name(name)?, header_value(value)?);
        Ok(self)
    }

    pub fn middleware<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Document) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> DocResult<Session> {
        let transport = match self.transport {
            Some(t) => t,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };
        let defaults = self.config.default_header_map()?;

        Ok(Session {
            transport,
            default_headers: Arc::new(merge_headers(&defaults, &self.headers)),
            hooks: self.hooks.into(),
            proxies: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}
