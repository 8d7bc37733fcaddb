//! Interfaces to the crawling host.
//!
//! The middleware never performs I/O itself; it signals the host through
//! these traits. All calls are fire-and-forget and must not block.

use std::time::Duration;

/// Named-counter sink. Amounts are 1.0 for plain increments; delay totals
/// are accumulated in seconds.
pub trait StatsSink: Send + Sync {
    fn inc_value(&self, key: &str, amount: f64);

    fn inc(&self, key: &str) {
        self.inc_value(key, 1.0);
    }
}

/// The host scheduler's per-slot pacing state. Returns `None` for slots the
/// scheduler has not created, in which case delay overrides are skipped.
pub trait SlotRegistry: Send + Sync {
    fn delay(&self, key: &str) -> Option<Duration>;

    /// Returns false when the slot does not exist.
    fn set_delay(&self, key: &str, delay: Duration) -> bool;
}

/// Control surface of the running crawl.
pub trait CrawlHandle: Send + Sync {
    /// Request crawl termination. Called at most once by the middleware.
    fn close(&self, reason: &str);

    /// Override the crawl-wide base download delay.
    fn set_download_delay(&self, delay: Duration);
}

/// Host DNS cache; the middleware only ever asks it to drop an entry so the
/// transport can re-resolve a failed-over proxy endpoint.
pub trait DnsCache: Send + Sync {
    fn invalidate(&self, host: &str);
}

/// Inert implementation of every host trait; the builder default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHost;

impl StatsSink for NoopHost {
    fn inc_value(&self, _key: &str, _amount: f64) {}
}

impl SlotRegistry for NoopHost {
    fn delay(&self, _key: &str) -> Option<Duration> {
        None
    }

    fn set_delay(&self, _key: &str, _delay: Duration) -> bool {
        false
    }
}

impl CrawlHandle for NoopHost {
    fn close(&self, _reason: &str) {}

    fn set_download_delay(&self, _delay: Duration) {}
}

impl DnsCache for NoopHost {
    fn invalidate(&self, _host: &str) {}
}
