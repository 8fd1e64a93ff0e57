//! Rate limiting for timeline and action endpoints
//!
//! Tracks the quota the server last reported for each endpoint and holds
//! the caller back until the quota resets once it is exhausted. The server
//! is the only source of truth: nothing is decremented locally, the next
//! response simply overwrites the stored quota.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use crate::types::{Endpoint, RateLimitInfo};

/// Last quota reported for an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub remaining: i64,
    pub reset_at: Instant,
}

/// Rate limiter for a single account
#[derive(Debug, Default)]
pub struct RateLimiter {
    quotas: HashMap<Endpoint, Quota>,
}

impl RateLimiter {
    /// Create a rate limiter with no quota information
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until a call against `endpoint` is allowed
    ///
    /// Returns immediately when the endpoint reports no rate-limit data, has
    /// quota left, or its reset time has passed. Otherwise sleeps once until
    /// the reset time.
    pub async fn check_and_wait(&self, endpoint: Endpoint) {
        let Some(quota) = self.quotas.get(&endpoint) else {
            return;
        };

        if quota.remaining > 0 {
            return;
        }

        let now = Instant::now();
        if quota.reset_at <= now {
            debug!(%endpoint, "Rate limit window already reset");
            return;
        }

        let wait = quota.reset_at - now;
        info!(
            %endpoint,
            wait_secs = wait.as_secs_f64(),
            "Rate limit exhausted, waiting for reset"
        );
        sleep_until(quota.reset_at).await;
    }

    /// Store the quota reported with the latest response for `endpoint`
    ///
    /// Responses without rate-limit metadata leave the stored quota alone.
    pub fn record(&mut self, endpoint: Endpoint, info: Option<RateLimitInfo>) {
        if let Some(info) = info {
            debug!(%endpoint, remaining = info.remaining, "Rate limit updated");
            self.quotas.insert(
                endpoint,
                Quota {
                    remaining: info.remaining,
                    reset_at: info.reset_at,
                },
            );
        }
    }

    /// Treat `endpoint` as exhausted for `retry_after`
    ///
    /// Used when a call was refused for rate limiting without usable quota
    /// headers. A later reset already on record is kept.
    pub fn mark_exhausted(&mut self, endpoint: Endpoint, retry_after: Duration) {
        let reset_at = Instant::now() + retry_after;
        let reset_at = match self.quotas.get(&endpoint) {
            Some(quota) if quota.remaining <= 0 => quota.reset_at.max(reset_at),
            _ => reset_at,
        };

        info!(%endpoint, retry_after_secs = retry_after.as_secs(), "Rate limited by server");
        self.quotas.insert(
            endpoint,
            Quota {
                remaining: 0,
                reset_at,
            },
        );
    }

    /// Current quota for an endpoint, if the server ever reported one
    pub fn quota(&self, endpoint: Endpoint) -> Option<Quota> {
        self.quotas.get(&endpoint).copied()
    }
}
