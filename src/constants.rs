//! Global Constants
//!
//! Centralized constants for routing, health tracking and escalation.
//! All magic numbers should be defined here with documentation.

/// Endpoint health / circuit breaker constants
pub mod health {
    /// Default backoff window after a failure (seconds)
    pub const DEFAULT_BACKOFF_SECS: u64 = 10;

    /// Upper bound for capped-exponential backoff (seconds)
    pub const MAX_BACKOFF_SECS: u64 = 300;

    /// Exponent cap so the shift never overflows
    pub const MAX_BACKOFF_EXPONENT: u32 = 16;

    /// Timeout for liveness probes (seconds)
    pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;
}

/// Quality escalation constants
pub mod escalation {
    /// Default score below which the secondary endpoint is consulted
    pub const DEFAULT_AUTO_POLISH_THRESHOLD: f64 = 70.0;

    /// Lowest valid quality score
    pub const MIN_SCORE: f64 = 0.0;

    /// Highest valid quality score
    pub const MAX_SCORE: f64 = 100.0;
}

/// Routing constants
pub mod routing {
    /// Endpoint id used for the fast/cheap model
    pub const PRIMARY_ID: &str = "primary";

    /// Endpoint id used for the strong/fallback model
    pub const SECONDARY_ID: &str = "secondary";

    /// Task assumed when a request does not name one
    pub const DEFAULT_TASK: &str = "chat";

    /// Tasks served by the primary endpoint first
    pub const DEFAULT_FAST_PATH_TASKS: &[&str] = &["chat", "summarize", "classify"];

    /// Default priority tier for endpoints without an explicit one
    pub const DEFAULT_PRIORITY: u8 = 100;
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

    /// Default generation budget
    pub const DEFAULT_MAX_TOKENS: u32 = 1024;

    /// Path probed by proxy endpoints for liveness
    pub const PROXY_HEALTH_PATH: &str = "health";
}
