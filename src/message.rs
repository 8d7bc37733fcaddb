//! Host-facing request and response types.
//!
//! The crawling host owns scheduling and transport; it hands the middleware
//! a mutable request before dispatch and the completed response (or the
//! transport error) afterwards.

use std::time::Duration;

use url::Url;

use crate::headers::HeaderBag;

/// Request-scoped metadata the middleware reads and writes.
///
/// This is the typed replacement for a free-form per-request meta map:
/// every key the middleware cares about is an explicit field.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Proxy URL the transport should connect through, credentials included.
    pub proxy: Option<String>,
    /// Download timeout override for this request.
    pub download_timeout: Option<Duration>,
    /// Explicit per-request opt-out; always wins over enablement.
    pub dont_proxy: bool,
    /// Concurrency slot key assigned by the host scheduler, typically
    /// derived from the destination host.
    pub download_slot: Option<String>,
    /// How many times this request was already resubmitted for proxy
    /// authentication failures.
    pub auth_retry_times: u32,
}

/// An outbound crawl request.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub url: Url,
    pub method: String,
    pub headers: HeaderBag,
    pub meta: RequestMeta,
    /// When true the host's duplicate filter must let this request through.
    pub dont_filter: bool,
}

impl ProxyRequest {
    pub fn new(url: Url, method: impl Into<String>) -> Self {
        Self {
            url,
            method: method.into(),
            headers: HeaderBag::new(),
            meta: RequestMeta::default(),
            dont_filter: false,
        }
    }

    /// Destination domain used for per-domain enablement.
    pub fn domain(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// A completed response as seen by the middleware.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HeaderBag,
}

impl ProxyResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderBag::new(),
        }
    }
}

/// Transport-level failure reported by the host instead of a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("connection refused by proxy")]
    ConnectionRefused,
    #[error("connection reset by proxy")]
    ConnectionReset,
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportError {
    /// True for the failures that indicate the proxy endpoint itself went
    /// away, as opposed to an upstream or protocol problem.
    pub fn is_connection_dropped(&self) -> bool {
        matches!(self, Self::ConnectionRefused | Self::ConnectionReset)
    }
}
