//! Client configuration and default outgoing headers.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{DocError, DocResult};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/134.0.0.0 Safari/537.36";

/// Encodings the response decoder understands.
pub const ACCEPT_ENCODING: &str = "gzip, deflate, br";

const DEFAULT_HEADERS: &[(&str, &str)] = &[
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("accept-encoding", ACCEPT_ENCODING),
    ("accept-language", "en-US,en;q=0.9"),
    ("cache-control", "max-age=0"),
    ("pragma", "no-cache"),
];

/// Transport and header configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whole-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum redirects the transport follows.
    pub max_redirects: usize,
    /// User-Agent sent with every request.
    pub user_agent: String,
    /// Proxy address (`host:port` or a full URL).
    pub proxy: Option<String>,
    /// Keep a cookie jar across documents.
    pub cookies: bool,
    /// Extra default headers, applied after the built-in set.
    pub default_headers: Vec<(String, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            max_redirects: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
            cookies: true,
            default_headers: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `HTTPDOC_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_parse::<u64>("HTTPDOC_TIMEOUT_MS") {
            config.timeout_ms = ms;
        }
        if let Some(n) = env_parse::<usize>("HTTPDOC_MAX_REDIRECTS") {
            config.max_redirects = n;
        }
        if let Ok(ua) = std::env::var("HTTPDOC_USER_AGENT") {
            if !ua.is_empty() {
                config.user_agent = ua;
            }
        }
        if let Ok(proxy) = std::env::var("HTTPDOC_PROXY") {
            if !proxy.is_empty() {
                config.proxy = Some(proxy);
            }
        }

        config
    }

    /// The header set applied to every newly constructed request.
    pub fn default_header_map(&self) -> DocResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in DEFAULT_HEADERS {
            headers.insert(*name, HeaderValue::from_static(*value));
        }
        headers.insert(reqwest::header::USER_AGENT, header_value(&self.user_agent)?);

        let mut extra = HeaderMap::new();
        for (name, value) in &self.default_headers {
            extra.append(header_name(name)?, header_value(value)?);
        }
        Ok(merge_headers(&headers, &extra))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Merge `overrides` over `defaults`: every header name present in
/// `overrides` replaces all of its values from `defaults`.
pub fn merge_headers(defaults: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = defaults.clone();
    for name in overrides.keys() {
        merged.remove(name);
        for value in overrides.get_all(name) {
            merged.append(name.clone(), value.clone());
        }
    }
    merged
}

pub(crate) fn header_name(name: &str) -> DocResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| DocError::InvalidHeader(format!("{name}: {e}")))
}

pub(crate) fn header_value(value: &str) -> DocResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| DocError::InvalidHeader(format!("{value:?}: {e}")))
}

/// Normalize a proxy address: `host:port` becomes `http://host:port`.
pub fn normalize_proxy_addr(addr: &str) -> DocResult<url::Url> {
    let addr = addr.trim();
    let full = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr.trim_start_matches("//"))
    };
    Ok(url::Url::parse(&full)?)
}
