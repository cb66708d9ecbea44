//! Endpoint Health Tracking
//!
//! Per-endpoint breaker state kept in a registry keyed by endpoint id.
//!
//! ## States
//!
//! - **Closed**: no failure remembered, requests flow through
//! - **Open**: a failure was recorded; requests are skipped until the
//!   backoff window has elapsed, after which the next attempt is let through
//!
//! ## Transitions
//!
//! ```text
//! Closed --[failure]--> Open (last_failure_time = now)
//! Open   --[failure]--> Open (last_failure_time = now, backoff may grow)
//! Open   --[success]--> Closed (failure memory cleared)
//! ```
//!
//! Writes are last-write-wins timestamp overwrites. A stale read only makes
//! an attempt happen slightly early or late.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::constants::health as health_constants;
use crate::types::EndpointId;

// =============================================================================
// Clock
// =============================================================================

/// Monotonic time source, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Clock backed by `Instant::now`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// =============================================================================
// Backoff Policy
// =============================================================================

/// How long an endpoint stays skipped after a failure
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffPolicy {
    /// Same window after every failure
    Constant(Duration),
    /// `base * 2^(failures-1)`, capped at `max`, with optional +0-25% jitter
    CappedExponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Constant(Duration::from_secs(health_constants::DEFAULT_BACKOFF_SECS))
    }
}

impl BackoffPolicy {
    /// Backoff window after `consecutive_failures` failures in a row
    pub fn backoff_for(&self, consecutive_failures: u32) -> Duration {
        match *self {
            Self::Constant(window) => window,
            Self::CappedExponential { base, max, jitter } => {
                let exponent = consecutive_failures
                    .saturating_sub(1)
                    .min(health_constants::MAX_BACKOFF_EXPONENT);
                let window = base.saturating_mul(1u32 << exponent).min(max);
                if jitter {
                    (window + random_jitter(window)).min(max)
                } else {
                    window
                }
            }
        }
    }
}

/// Random jitter of up to a quarter of the window
fn random_jitter(window: Duration) -> Duration {
    let max_jitter_ms = (window.as_millis() as u64) / 4;
    if max_jitter_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..max_jitter_ms))
}

// =============================================================================
// Endpoint Health State
// =============================================================================

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Available
    Closed,
    /// In (or just past) backoff
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
        }
    }
}

/// Mutable health record for one endpoint
#[derive(Debug, Clone, Default)]
pub struct EndpointHealthState {
    last_failure_time: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    backoff_duration: Duration,
    consecutive_failures: u32,
}

impl EndpointHealthState {
    pub fn state(&self) -> CircuitState {
        if self.last_failure_time.is_some() {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// `now - last_failure_time > backoff_duration`
    pub fn is_available(&self, now: Instant) -> bool {
        self.retry_in(now).is_none()
    }

    /// Remaining backoff, or `None` when an attempt may be made
    pub fn retry_in(&self, now: Instant) -> Option<Duration> {
        let last = self.last_failure_time?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed > self.backoff_duration {
            None
        } else {
            // At exactly the boundary the endpoint is still backing off.
            Some((self.backoff_duration - elapsed).max(Duration::from_nanos(1)))
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn backoff_duration(&self) -> Duration {
        self.backoff_duration
    }

    /// Record a failure. The failure time never moves backwards.
    fn record_failure(&mut self, now: Instant, policy: &BackoffPolicy) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure_time = Some(match self.last_failure_time {
            Some(prev) if prev > now => prev,
            _ => now,
        });
        self.last_failure_at = Some(Utc::now());
        self.backoff_duration = policy.backoff_for(self.consecutive_failures);
        self.backoff_duration
    }

    /// Record a success; returns whether failure memory was cleared
    fn record_success(&mut self) -> bool {
        let was_open = self.last_failure_time.is_some();
        *self = Self::default();
        was_open
    }

    fn snapshot(&self, endpoint: &EndpointId, now: Instant) -> HealthSnapshot {
        let retry_in = self.retry_in(now);
        HealthSnapshot {
            endpoint: endpoint.clone(),
            state: self.state(),
            available: retry_in.is_none(),
            consecutive_failures: self.consecutive_failures,
            backoff_ms: self.backoff_duration.as_millis() as u64,
            retry_in_ms: retry_in.map(|d| d.as_millis() as u64),
            last_failure_at: self.last_failure_at,
        }
    }
}

/// Serializable view of an endpoint's health, for introspection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub endpoint: EndpointId,
    pub state: CircuitState,
    pub available: bool,
    pub consecutive_failures: u32,
    pub backoff_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_in_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let retry = self
            .retry_in_ms
            .map(|ms| format!(" retry in {:.1}s", ms as f64 / 1000.0))
            .unwrap_or_default();
        format!(
            "[{}] {} | failures={} backoff={}ms{}",
            self.endpoint, self.state, self.consecutive_failures, self.backoff_ms, retry
        )
    }
}

// =============================================================================
// Health Registry
// =============================================================================

static GLOBAL_REGISTRY: LazyLock<HealthRegistry> = LazyLock::new(HealthRegistry::new);

/// Registry of endpoint health keyed by endpoint id.
///
/// Clones share the same underlying map. Entries are created lazily on
/// first use and only removed by an explicit reset.
#[derive(Clone)]
pub struct HealthRegistry {
    states: Arc<DashMap<EndpointId, EndpointHealthState>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for HealthRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthRegistry")
            .field("endpoints", &self.states.len())
            .finish()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Isolated registry on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            states: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Process-wide registry shared by every service built without an
    /// explicit one
    pub fn global() -> HealthRegistry {
        GLOBAL_REGISTRY.clone()
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// `Err(retry_in)` while `endpoint` is backing off
    pub fn check(&self, endpoint: &EndpointId) -> std::result::Result<(), Duration> {
        let now = self.clock.now();
        let state = self.states.entry(endpoint.clone()).or_default();
        match state.retry_in(now) {
            Some(retry_in) => Err(retry_in),
            None => Ok(()),
        }
    }

    /// Record a failed call; returns the new backoff window
    pub fn record_failure(&self, endpoint: &EndpointId, policy: &BackoffPolicy) -> Duration {
        let now = self.clock.now();
        let mut state = self.states.entry(endpoint.clone()).or_default();
        let backoff = state.record_failure(now, policy);
        debug!(
            endpoint = %endpoint,
            failures = state.consecutive_failures,
            backoff_ms = backoff.as_millis() as u64,
            "Recorded endpoint failure"
        );
        backoff
    }

    /// Record a successful call; returns whether the circuit was open
    pub fn record_success(&self, endpoint: &EndpointId) -> bool {
        self.states
            .entry(endpoint.clone())
            .or_default()
            .record_success()
    }

    /// Read-only view; unknown endpoints report as closed
    pub fn snapshot(&self, endpoint: &EndpointId) -> HealthSnapshot {
        let now = self.clock.now();
        match self.states.get(endpoint) {
            Some(state) => state.snapshot(endpoint, now),
            None => EndpointHealthState::default().snapshot(endpoint, now),
        }
    }

    pub fn snapshots<'a>(
        &self,
        endpoints: impl IntoIterator<Item = &'a EndpointId>,
    ) -> Vec<HealthSnapshot> {
        endpoints.into_iter().map(|id| self.snapshot(id)).collect()
    }

    /// Administrative reset of one endpoint
    pub fn reset(&self, endpoint: &EndpointId) {
        if self.states.remove(endpoint).is_some() {
            info!(endpoint = %endpoint, "Endpoint health manually reset to CLOSED");
        }
    }

    /// Administrative reset of every endpoint
    pub fn reset_all(&self) {
        self.states.clear();
        info!("All endpoint health state reset");
    }
}
