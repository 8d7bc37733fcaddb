//! Exponential backoff with full jitter, plus per-slot delay bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

/// Strategy for jittering a backoff upper bound, in seconds.
pub trait Jitter: Send + Sync {
    fn sample(&self, upper: f64) -> f64;
}

/// Uniform sample over `[0, upper]` (full jitter).
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformJitter;

impl Jitter for UniformJitter {
    fn sample(&self, upper: f64) -> f64 {
        rand::thread_rng().gen_range(0.0..=upper)
    }
}

/// Always returns the upper bound; for deterministic tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxJitter;

impl Jitter for MaxJitter {
    fn sample(&self, upper: f64) -> f64 {
        upper
    }
}

/// Generator of throttling delays: `jitter(min(cap, step * 2^attempt))`.
///
/// The upper bound doubles on every draw until it reaches `cap`, where it
/// stays. Recovery replaces the sequence wholesale via [`Self::restart`].
pub struct BackoffSequence {
    step: f64,
    cap: f64,
    attempt: u32,
    jitter: Arc<dyn Jitter>,
}

impl BackoffSequence {
    pub fn new(step: f64, cap: f64) -> Self {
        Self::with_jitter(step, cap, Arc::new(UniformJitter))
    }

    pub fn with_jitter(step: f64, cap: f64, jitter: Arc<dyn Jitter>) -> Self {
        Self {
            step,
            cap,
            attempt: 0,
            jitter,
        }
    }

    /// Draw the next delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let upper = (self.step * 2f64.powi(self.attempt.min(1024) as i32)).min(self.cap);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_secs_f64(self.jitter.sample(upper).max(0.0))
    }

    /// Fresh sequence with the same parameters, back at attempt zero.
    pub fn restart(&self) -> BackoffSequence {
        Self::with_jitter(self.step, self.cap, Arc::clone(&self.jitter))
    }
}

impl std::fmt::Debug for BackoffSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffSequence")
            .field("step", &self.step)
            .field("cap", &self.cap)
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Mutable per-slot state plus the shared backoff sequence, kept behind one
/// lock by the controller. Throttling distress is proxy-wide, so the
/// sequence is shared across slots and backend targets; ban counters and
/// saved delays are per slot.
#[derive(Debug)]
pub(crate) struct SlotTracker {
    bans: HashMap<String, u32>,
    saved_delays: HashMap<String, Duration>,
    pub(crate) backoff: BackoffSequence,
}

impl SlotTracker {
    pub(crate) fn new(backoff: BackoffSequence) -> Self {
        Self {
            bans: HashMap::new(),
            saved_delays: HashMap::new(),
            backoff,
        }
    }

    /// Increment the slot's ban counter, returning the new count.
    pub(crate) fn record_ban(&mut self, key: &str) -> u32 {
        let count = self.bans.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub(crate) fn clear_bans(&mut self, key: &str) {
        self.bans.insert(key.to_string(), 0);
    }

    #[cfg(test)]
    pub(crate) fn ban_count(&self, key: &str) -> u32 {
        self.bans.get(key).copied().unwrap_or(0)
    }

    /// Remember the slot's pre-override delay. Set-once: later overrides on
    /// the same slot keep the first saved value until it is restored.
    pub(crate) fn save_delay_once(&mut self, key: &str, current: Duration) {
        self.saved_delays.entry(key.to_string()).or_insert(current);
    }

    /// Take the saved delay, clearing it. Restore-once.
    pub(crate) fn take_saved_delay(&mut self, key: &str) -> Option<Duration> {
        self.saved_delays.remove(key)
    }
}
