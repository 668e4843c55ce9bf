//! Per-client sliding-window rate limiter.
//!
//! Each client gets an independent window of request timestamps over the
//! last 60 seconds. [`RateLimiter::check`] prunes expired entries, then
//! either denies or admits-and-records the current request. Keyed by
//! `client_id`, never by the raw API key, so a client can rotate its key
//! without resetting its budget.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lr_types::RateLimitDecision;

const WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window rate limiter shared across all requests in the process.
///
/// `DashMap`'s per-shard locking is what gives us a serialize-per-client,
/// parallel-across-clients concurrency model cheaply: the `entry()` call
/// below holds one shard's lock for the whole prune-then-append critical
/// section, so two requests for
/// the same client serialize, while requests for different clients
/// (almost always landing in different shards) proceed in parallel.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check and, if admitted, record a request for `client_id` against
    /// `limit` requests per 60-second window.
    pub fn check(&self, client_id: &str, limit: u32) -> RateLimitDecision {
        let now = Instant::now();
        let mut window = self.windows.entry(client_id.to_string()).or_default();

        while let Some(&front) = window.front() {
            if now.duration_since(front) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() as u32 >= limit {
            let reset = window
                .front()
                .map(|&front| WINDOW.saturating_sub(now.duration_since(front)))
                .unwrap_or(WINDOW);
            return RateLimitDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_seconds: reset.as_secs(),
            };
        }

        window.push_back(now);
        let remaining = limit.saturating_sub(window.len() as u32);
        let reset = window
            .front()
            .map(|&front| WINDOW.saturating_sub(now.duration_since(front)))
            .unwrap_or(WINDOW);

        RateLimitDecision {
            allowed: true,
            limit,
            remaining,
            reset_seconds: reset.as_secs(),
        }
    }

    /// Drop windows that are fully expired and empty. Optional — windows
    /// are never torn down on their own, so long-lived processes with a
    /// large, churning client population may want to call this
    /// periodically.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.windows.retain(|_, window| {
            while let Some(&front) = window.front() {
                if now.duration_since(front) >= WINDOW {
                    window.pop_front();
                } else {
                    break;
                }
            }
            !window.is_empty()
        });
    }

    /// Clear state for one client. Used by tests.
    pub fn reset(&self, client_id: &str) {
        self.windows.remove(client_id);
    }
}
