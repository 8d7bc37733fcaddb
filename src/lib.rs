//! Adaptive proxy routing and backpressure middleware for web crawlers.
//!
//! Routes outbound crawl traffic through the Relay proxy service and
//! compensates for Relay's fallible, rate-limited behavior: it annotates
//! requests with routing and credentials, classifies proxy-issued distress
//! signals (bans, exhausted capacity, authentication failures, connection
//! drops), throttles the affected scheduler slot with exponential backoff,
//! retries bounded classes of failures, and terminates the crawl when a
//! slot accumulates too many bans.
//!
//! The crate is transport-agnostic: the host crawler owns scheduling, DNS
//! and HTTP, and wires itself in through the traits in [`host`].

pub mod config;
pub mod headers;
pub mod host;
pub mod message;
pub mod middleware;

pub use config::{ConfigError, Credential, ProxyConfig, Settings, SpiderOverrides};
pub use headers::HeaderBag;
pub use host::{CrawlHandle, DnsCache, NoopHost, SlotRegistry, StatsSink};
pub use message::{ProxyRequest, ProxyResponse, RequestMeta, TransportError};
pub use middleware::{
    classify, CapacityReason, Classification, ProxyMiddleware, ProxyMiddlewareBuilder, Target,
    Verdict,
};
