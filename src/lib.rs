//! modelroute - Capability Router for Model Endpoints
//!
//! Routes generation requests across heterogeneous model endpoints (a cheap
//! "primary" and a stronger "secondary"), skipping endpoints that recently
//! failed and escalating to the secondary when the primary's answer scores
//! too low.
//!
//! ## Core Features
//!
//! - **Capability Routing**: ordered candidate lists per task type
//! - **Circuit Breaking**: per-endpoint backoff shared across requests
//! - **Quality Escalation**: score-gated handoff with soft/strict fallback
//! - **Layered Config**: defaults, TOML files and environment variables
//!
//! ## Quick Start
//!
//! ```ignore
//! use modelroute::{ConfigLoader, RequestContext, RouterService};
//!
//! let config = ConfigLoader::load()?;
//! let service = RouterService::from_config(&config)?;
//! let result = service
//!     .generate("Hello", &RequestContext::new(), 256, 30.0)
//!     .await?;
//! service.shutdown().await;
//! ```
//!
//! ## Modules
//!
//! - [`adapter`]: endpoint adapters behind one trait
//! - [`transport`]: circuit breaker registry and cascading dispatch
//! - [`routing`]: capability table and route selection
//! - [`escalation`]: primary/secondary quality gate
//! - [`service`]: request boundary used by the CLI

pub mod adapter;
pub mod cli;
pub mod config;
pub mod constants;
pub mod escalation;
pub mod routing;
pub mod service;
pub mod timeout;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::{EndpointId, ErrorCategory, ErrorClassifier, Result, RouteError};

// Adapters
pub use adapter::{
    GenerateOptions, ModelAdapter, ModelConfig, ModelResponse, ProviderKind, QualityScore,
    RequestContext, SharedAdapter, create_adapter,
};

// =============================================================================
// Routing Re-exports
// =============================================================================

pub use escalation::{Decision, EscalationPolicy, EscalationReport, QualityEscalator};
pub use routing::{CapabilityEntry, CapabilityRouter, Route, RouterPolicy};
pub use service::{GenerateResult, GenerationPayload, RouteInfo, RouterService, Suggestion};
pub use transport::{
    BackoffPolicy, CircuitState, DispatchOutcome, DispatchReport, HealthAwareTransport,
    HealthRegistry, HealthSnapshot,
};

// Timeout
pub use timeout::with_timeout;
