//! Fixed-window rate limiting keyed by client identifier.
//!
//! The limiter is an explicitly constructed instance, not a process global:
//! it owns its entry map and a background sweep task that drops expired
//! windows, and the task dies with the limiter. Only requests riding on the
//! server-shared credential are counted; trusted and loopback callers are
//! bypassed upstream in the pipeline.

use crate::config::RateLimitConfig;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    reset_at: Instant,
}

/// Outcome of one gate check. `remaining: None` means unbounded (the caller
/// was exempted rather than counted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: Option<u32>,
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    pub fn bypassed() -> Self {
        Self {
            allowed: true,
            remaining: None,
            retry_after_secs: 0,
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    sweeper: Option<JoinHandle<()>>,
}

impl RateLimiter {
    /// Create a limiter and start its sweep task on the current runtime.
    pub fn new(config: RateLimitConfig) -> Self {
        let entries: Arc<Mutex<HashMap<String, Entry>>> = Arc::default();
        let sweeper = if config.enabled {
            let entries = Arc::clone(&entries);
            let period = config.window.max(Duration::from_secs(1));
            Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let now = Instant::now();
                    let mut map = entries.lock();
                    let before = map.len();
                    map.retain(|_, entry| entry.reset_at > now);
                    let swept = before - map.len();
                    if swept > 0 {
                        debug!(swept, live = map.len(), "swept expired rate-limit windows");
                    }
                }
            }))
        } else {
            None
        };
        Self {
            config,
            entries,
            sweeper,
        }
    }

    /// Count one request for `key` against the current window.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::bypassed();
        }

        let now = Instant::now();
        let mut map = self.entries.lock();
        let entry = map.entry(key.to_string()).or_insert(Entry {
            count: 0,
            reset_at: now + self.config.window,
        });

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + self.config.window;
        }

        if entry.count >= self.config.max_requests {
            let retry_after = entry.reset_at.saturating_duration_since(now);
            return RateLimitDecision {
                allowed: false,
                remaining: Some(0),
                retry_after_secs: retry_after.as_secs().max(1),
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: Some(self.config.max_requests - entry.count),
            retry_after_secs: 0,
        }
    }

    /// Stop the sweep task. Also runs on drop.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.sweeper.take() {
            handle.abort();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Loopback-style callers (local dev) are never throttled.
pub fn is_local_client(client_id: &str) -> bool {
    matches!(client_id, "127.0.0.1" | "::1" | "localhost")
}

/// Derive the client key from proxy headers, most trustworthy first:
/// CDN connecting IP, then the first forwarded-for hop, then the reverse
/// proxy's real-ip, else a shared anonymous bucket.
pub fn derive_client_id(
    cf_connecting_ip: Option<&str>,
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
) -> String {
    if let Some(ip) = cf_connecting_ip.map(str::trim).filter(|s| !s.is_empty()) {
        return ip.to_string();
    }
    if let Some(first) = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return first.to_string();
    }
    if let Some(ip) = real_ip.map(str::trim).filter(|s| !s.is_empty()) {
        return ip.to_string();
    }
    "anonymous".to_string()
}
