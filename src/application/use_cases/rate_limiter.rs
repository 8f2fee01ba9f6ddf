//! Rate Limiter for gateway requests
//!
//! Sliding-window admission control per identity:
//! - Request instants kept for the trailing hour, pruned on every access
//! - Per-minute ceiling as the primary gate, per-hour ceiling as the secondary
//! - Check and record happen under one lock, so concurrent requests for the
//!   same identity cannot be admitted past a ceiling
//! - Admitted slots can be rolled back (used when generation fails upstream)

use crate::domain::query::Identity;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests admitted in any trailing 60 seconds
    pub max_requests_per_minute: usize,
    /// Maximum requests admitted in any trailing hour
    pub max_requests_per_hour: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 20,
            max_requests_per_hour: 200,
        }
    }
}

/// A recorded slot that can be handed back with [`RateLimiter::rollback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    identity: Identity,
    at: Instant,
}

impl Reservation {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request admitted and recorded
    Allowed(Reservation),
    /// A ceiling is reached
    Exceeded { retry_after_seconds: i64 },
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }

    pub fn retry_after_seconds(&self) -> Option<i64> {
        match self {
            RateLimitResult::Allowed(_) => None,
            RateLimitResult::Exceeded {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
        }
    }
}

/// Rate limit status for an identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub identity: String,
    pub minute_count: usize,
    pub hour_count: usize,
    pub max_requests_per_minute: usize,
    pub max_requests_per_hour: usize,
    pub is_rate_limited: bool,
    pub retry_after_seconds: Option<i64>,
}

/// Sliding-window rate limiter keyed by identity
pub struct RateLimiter {
    windows: Mutex<HashMap<Identity, VecDeque<Instant>>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with default config
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config
    pub fn with_config(config: RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit (and record) a request for `identity`, or report when to retry.
    pub async fn admit(&self, identity: &Identity) -> RateLimitResult {
        self.admit_at(identity, Instant::now()).await
    }

    pub async fn admit_at(&self, identity: &Identity, now: Instant) -> RateLimitResult {
        let mut windows = self.windows.lock().await;
        let window = windows.entry(identity.clone()).or_default();
        prune(window, now);

        if let Some(retry_after_seconds) = self.retry_after(window, now) {
            warn!(
                identity = %identity,
                retry_after_seconds,
                "Rate limit exceeded"
            );
            return RateLimitResult::Exceeded {
                retry_after_seconds,
            };
        }

        window.push_back(now);
        debug!(
            identity = %identity,
            hour_count = window.len(),
            "Request admitted"
        );

        RateLimitResult::Allowed(Reservation {
            identity: identity.clone(),
            at: now,
        })
    }

    /// Hand back a slot so it no longer counts against the identity.
    pub async fn rollback(&self, reservation: &Reservation) {
        let mut windows = self.windows.lock().await;
        if let Some(window) = windows.get_mut(&reservation.identity) {
            if let Some(pos) = window.iter().rposition(|t| *t == reservation.at) {
                window.remove(pos);
                debug!(identity = %reservation.identity, "Rate limit slot rolled back");
            }
        }
    }

    /// Get current rate limit status for an identity
    pub async fn status(&self, identity: &Identity) -> RateLimitStatus {
        self.status_at(identity, Instant::now()).await
    }

    pub async fn status_at(&self, identity: &Identity, now: Instant) -> RateLimitStatus {
        let mut windows = self.windows.lock().await;
        let (minute_count, hour_count, retry_after) = match windows.get_mut(identity) {
            Some(window) => {
                prune(window, now);
                (
                    count_within(window, now, MINUTE),
                    window.len(),
                    self.retry_after(window, now),
                )
            }
            None => (0, 0, None),
        };

        RateLimitStatus {
            identity: identity.to_string(),
            minute_count,
            hour_count,
            max_requests_per_minute: self.config.max_requests_per_minute,
            max_requests_per_hour: self.config.max_requests_per_hour,
            is_rate_limited: retry_after.is_some(),
            retry_after_seconds: retry_after,
        }
    }

    /// Forget all recorded requests for an identity
    pub async fn reset(&self, identity: &Identity) {
        info!(identity = %identity, "Resetting rate limit window");
        self.windows.lock().await.remove(identity);
    }

    /// Drop identities whose window has emptied (maintenance function)
    pub async fn purge_idle(&self) -> usize {
        self.purge_idle_at(Instant::now()).await
    }

    pub async fn purge_idle_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| {
            prune(window, now);
            !window.is_empty()
        });
        let purged = before - windows.len();
        if purged > 0 {
            debug!(purged, "Purged idle rate limit windows");
        }
        purged
    }

    pub async fn tracked_identities(&self) -> usize {
        self.windows.lock().await.len()
    }

    /// Seconds until the window admits again, or `None` if it admits now.
    fn retry_after(&self, window: &VecDeque<Instant>, now: Instant) -> Option<i64> {
        let minute = gate_retry_after(window, now, MINUTE, self.config.max_requests_per_minute);
        let hour = gate_retry_after(window, now, HOUR, self.config.max_requests_per_hour);
        match (minute, hour) {
            (Some(m), Some(h)) => Some(m.max(h)),
            (m, h) => m.or(h),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes instants that have left the hour horizon. The window is ordered
/// oldest first.
fn prune(window: &mut VecDeque<Instant>, now: Instant) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= HOUR {
            window.pop_front();
        } else {
            break;
        }
    }
}

fn count_within(window: &VecDeque<Instant>, now: Instant, span: Duration) -> usize {
    window
        .iter()
        .filter(|t| now.saturating_duration_since(**t) < span)
        .count()
}

/// Once `limit` or more instants fall inside `span`, the next admission waits
/// until enough of them leave the span to drop the count below `limit`.
fn gate_retry_after(
    window: &VecDeque<Instant>,
    now: Instant,
    span: Duration,
    limit: usize,
) -> Option<i64> {
    let inside: Vec<&Instant> = window
        .iter()
        .filter(|t| now.saturating_duration_since(**t) < span)
        .collect();
    if inside.len() < limit {
        return None;
    }

    let blocking = inside.get(inside.len() - limit).copied()?;
    let remaining = span.saturating_sub(now.saturating_duration_since(*blocking));
    let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
    Some(secs.max(1) as i64)
}
