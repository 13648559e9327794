//! `RequestProxy`: the injected HTTP transport (spec §6).
//!
//! The core never talks to the network directly — every byte comes through
//! an implementor of this trait, so an embedder can route requests through
//! an in-page context to inherit credentials/headers without the core
//! knowing anything about it. `ReqwestRequestProxy` is the default transport
//! provided for embedders that don't need that indirection, built the way
//! the teacher's `DownloaderConfig` builds its client: rustls TLS, gzip/
//! brotli/deflate, a desktop-class `Accept`/`Accept-Language` header set.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use thiserror::Error;

use crate::config::DEFAULT_USER_AGENT;

/// What shape of body the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Want {
    Text,
    Bytes,
}

/// Body returned by a successful fetch, shaped per the requested `Want`
/// instead of a dynamic union of possible JS shapes (spec §9 redesign note).
#[derive(Debug, Clone)]
pub enum Body {
    Text(String),
    Bytes(Bytes),
}

impl Body {
    pub fn into_bytes(self) -> Bytes {
        match self {
            Body::Bytes(b) => b,
            Body::Text(s) => Bytes::from(s.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Bytes(b) => b.as_ref(),
            Body::Text(s) => s.as_bytes(),
        }
    }
}

/// Successful response from a `RequestProxy` fetch.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub body: Body,
    /// Final URL after following redirects, for resolving relative URLs.
    pub final_url: String,
}

/// Failure classification for a `RequestProxy` fetch (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyErrorKind {
    Network,
    Timeout,
    Http,
}

#[derive(Debug, Error)]
#[error("proxy fetch failed ({kind:?}, status={status:?}): {message}")]
pub struct ProxyError {
    pub kind: ProxyErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProxyError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ProxyErrorKind::Network,
            status: None,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: ProxyErrorKind::Timeout,
            status: None,
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ProxyErrorKind::Http,
            status: Some(status),
            message: message.into(),
        }
    }
}

/// An extra header to attach to a single request (spec's `headers?` param).
#[derive(Debug, Clone)]
pub struct ProxyHeader {
    pub name: String,
    pub value: String,
}

/// Injected HTTP transport (spec §6 `RequestProxy`).
///
/// Implementations may route via an in-page context to inherit credentials;
/// the core is indifferent to how bytes arrive, only that they do.
#[async_trait]
pub trait RequestProxy: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        want: Want,
        headers: &[ProxyHeader],
        timeout: Duration,
    ) -> Result<ProxyResponse, ProxyError>;
}

/// Default `reqwest`-backed `RequestProxy`.
#[cfg(feature = "reqwest-proxy")]
pub struct ReqwestRequestProxy {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest-proxy")]
impl ReqwestRequestProxy {
    pub fn new() -> Self {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent.into())
            .default_headers(Self::default_headers())
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .expect("default reqwest client configuration is always valid");
        Self { client }
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("*/*"),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers
    }
}

#[cfg(feature = "reqwest-proxy")]
impl Default for ReqwestRequestProxy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "reqwest-proxy")]
#[async_trait]
impl RequestProxy for ReqwestRequestProxy {
    async fn fetch(
        &self,
        url: &str,
        want: Want,
        headers: &[ProxyHeader],
        timeout: Duration,
    ) -> Result<ProxyResponse, ProxyError> {
        let mut builder = self.client.get(url).timeout(timeout);
        for header in headers {
            let name = HeaderName::from_bytes(header.name.as_bytes())
                .map_err(|e| ProxyError::network(format!("invalid header name: {e}")))?;
            let value = HeaderValue::from_str(&header.value)
                .map_err(|e| ProxyError::network(format!("invalid header value: {e}")))?;
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProxyError::timeout(e.to_string())
            } else {
                ProxyError::network(e.to_string())
            }
        })?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(ProxyError::http(status.as_u16(), status.to_string()));
        }

        let body = match want {
            Want::Text => Body::Text(response.text().await.map_err(|e| {
                ProxyError::network(format!("failed to read response text: {e}"))
            })?),
            Want::Bytes => Body::Bytes(response.bytes().await.map_err(|e| {
                ProxyError::network(format!("failed to read response bytes: {e}"))
            })?),
        };

        Ok(ProxyResponse {
            status: status.as_u16(),
            body,
            final_url,
        })
    }
}
