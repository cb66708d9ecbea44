//! Unified Error Type System
//!
//! Centralized error types for the router.
//! Provides classification used by the breaker and the cascade.
//!
//! ## Error Categories
//!
//! - **Configuration**: no endpoint registered for a capability (fatal, never retried)
//! - **Transport**: network failure, timeout, non-success status, open circuit
//! - **Provider**: endpoint reachable but rejected the request
//! - **Exhausted**: primary and secondary (or every route candidate) failed
//! - **InvalidRequest**: caller supplied an unusable request
//!
//! ## Design Principles
//!
//! - Single error type (RouteError) for the crate
//! - Only configuration errors are meant to reach the caller as hard failures
//! - No panic/unwrap - all errors are recoverable values

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Error categories driving breaker and cascade decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Deployment mistake - surface immediately
    Configuration,
    /// Network, timeout, bad status or skipped endpoint - trip breaker, cascade
    Transport,
    /// Application-level rejection - not retried
    Provider,
    /// Every escalation stage or route candidate failed
    Exhausted,
    /// Caller input is unusable
    InvalidRequest,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Transport => write!(f, "TRANSPORT"),
            Self::Provider => write!(f, "PROVIDER"),
            Self::Exhausted => write!(f, "EXHAUSTED"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
        }
    }
}

impl ErrorCategory {
    /// Whether a failure of this category opens the endpoint's circuit
    pub fn trips_breaker(&self) -> bool {
        matches!(self, Self::Transport)
    }

    /// Whether the cascade may move on to the next candidate
    pub fn allows_cascade(&self) -> bool {
        matches!(self, Self::Transport)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum RouteError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // -------------------------------------------------------------------------
    // Routing Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // -------------------------------------------------------------------------
    // Endpoint Errors
    // -------------------------------------------------------------------------
    #[error("Transport error [{endpoint}]: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Circuit open [{endpoint}]: retry in {retry_in:?}")]
    CircuitOpen { endpoint: String, retry_in: Duration },

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Provider error [{provider}]: {message}")]
    Provider { provider: String, message: String },

    // -------------------------------------------------------------------------
    // Escalation Errors
    // -------------------------------------------------------------------------
    #[error("Escalation exhausted: primary: {primary}; secondary: {secondary}")]
    EscalationExhausted { primary: String, secondary: String },

    #[error("no endpoint available")]
    NoEndpointAvailable { attempted: Vec<String> },
}

pub type Result<T> = std::result::Result<T, RouteError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl RouteError {
    /// Create a transport error
    pub fn transport(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a provider rejection
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Aggregate the two failures of an escalation. `primary` is either the
    /// primary's error or the reason its answer was rejected.
    pub fn exhausted(primary: impl ToString, secondary: &RouteError) -> Self {
        Self::EscalationExhausted {
            primary: primary.to_string(),
            secondary: secondary.to_string(),
        }
    }

    /// Category used for breaker and cascade decisions
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) => ErrorCategory::Configuration,
            Self::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            Self::Provider { .. } => ErrorCategory::Provider,
            Self::EscalationExhausted { .. } | Self::NoEndpointAvailable { .. } => {
                ErrorCategory::Exhausted
            }
            Self::Io(_)
            | Self::Json(_)
            | Self::Http(_)
            | Self::Transport { .. }
            | Self::CircuitOpen { .. }
            | Self::Timeout { .. } => ErrorCategory::Transport,
        }
    }

    /// Only configuration errors propagate as hard failures
    pub fn is_fatal(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps upstream responses and client failures onto `RouteError`
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a non-success HTTP status. Every status other than 200 is a
    /// transport failure; the status text is kept in the message.
    pub fn classify_http_status(status: u16, body: &str, endpoint: &str) -> RouteError {
        let hint = match status {
            429 => "rate limited",
            401 | 403 => "authentication rejected",
            404 => "endpoint not found",
            400 | 422 => "request rejected",
            500..=599 => "server error",
            _ => "unexpected status",
        };
        let body = body.trim();
        let message = if body.is_empty() {
            format!("HTTP {} ({})", status, hint)
        } else {
            format!("HTTP {} ({}): {}", status, hint, truncate(body, 200))
        };
        RouteError::transport(endpoint, message)
    }

    /// Classify a reqwest failure (connect, timeout, body read)
    pub fn classify_reqwest(err: &reqwest::Error, endpoint: &str) -> RouteError {
        let message = if err.is_timeout() {
            format!("request timed out: {}", err)
        } else if err.is_connect() {
            format!("connection failed: {}", err)
        } else {
            format!("request failed: {}", err)
        };
        RouteError::transport(endpoint, message)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// =============================================================================
// Tests
// =============================================================================
