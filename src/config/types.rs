//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! The loaded `Config` is an explicit value handed to the service at
//! construction; nothing here is read from a global.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::adapter::{GenerateOptions, ModelConfig, ProviderKind, validate_endpoint};
use crate::constants::{
    escalation as esc_constants, health as health_constants, network as net_constants,
    routing as routing_constants,
};
use crate::escalation::EscalationPolicy;
use crate::routing::{CapabilityEntry, RouterPolicy};
use crate::transport::BackoffPolicy;
use crate::types::{EndpointId, Result, RouteError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Configured endpoints keyed by identity
    pub endpoints: BTreeMap<String, EndpointSettings>,

    /// Primary/fallback designation and fast-path tasks
    pub routing: RoutingSettings,

    /// Quality escalation policy
    pub escalation: EscalationSettings,

    /// Circuit breaker backoff
    pub health: HealthSettings,

    /// Per-request defaults
    pub request: RequestSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            endpoints: BTreeMap::new(),
            routing: RoutingSettings::default(),
            escalation: EscalationSettings::default(),
            health: HealthSettings::default(),
            request: RequestSettings::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `RouteError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.escalation.auto_polish_threshold;
        if !(esc_constants::MIN_SCORE..=esc_constants::MAX_SCORE).contains(&threshold) {
            return Err(RouteError::Config(format!(
                "escalation.auto_polish_threshold must be between {} and {}, got {}",
                esc_constants::MIN_SCORE,
                esc_constants::MAX_SCORE,
                threshold
            )));
        }

        if self.health.backoff_secs == 0 {
            return Err(RouteError::Config(
                "health.backoff_secs must be greater than 0".to_string(),
            ));
        }

        if self.health.max_backoff_secs < self.health.backoff_secs {
            return Err(RouteError::Config(format!(
                "health.max_backoff_secs ({}) must not be below backoff_secs ({})",
                self.health.max_backoff_secs, self.health.backoff_secs
            )));
        }

        match Duration::try_from_secs_f64(self.request.timeout_secs) {
            Ok(timeout) if !timeout.is_zero() => {}
            _ => {
                return Err(RouteError::Config(format!(
                    "request.timeout_secs must be a positive number of seconds, got {}",
                    self.request.timeout_secs
                )));
            }
        }

        if self.request.max_tokens == 0 {
            return Err(RouteError::Config(
                "request.max_tokens must be greater than 0".to_string(),
            ));
        }

        for (id, endpoint) in &self.endpoints {
            if endpoint.timeout_secs == 0 {
                return Err(RouteError::Config(format!(
                    "endpoints.{}.timeout_secs must be greater than 0",
                    id
                )));
            }
            if !endpoint.cost.is_finite() || endpoint.cost < 0.0 {
                return Err(RouteError::Config(format!(
                    "endpoints.{}.cost must be a non-negative number",
                    id
                )));
            }
            if endpoint.is_configured() {
                validate_endpoint(&endpoint.base_url)?;
            }
        }

        Ok(())
    }

    /// Endpoints that have a base URL, in id order
    pub fn configured_endpoints(&self) -> impl Iterator<Item = (&String, &EndpointSettings)> {
        self.endpoints.iter().filter(|(id, endpoint)| {
            if !endpoint.is_configured() {
                debug!(endpoint = %id, "Endpoint has no base_url; treating as unconfigured");
            }
            endpoint.is_configured()
        })
    }

    /// Immutable per-endpoint configuration for adapter construction
    pub fn model_configs(&self) -> Vec<ModelConfig> {
        self.configured_endpoints()
            .map(|(id, endpoint)| endpoint.to_model_config(id))
            .collect()
    }

    pub fn capability_entries(&self) -> Vec<CapabilityEntry> {
        self.configured_endpoints()
            .map(|(id, endpoint)| {
                CapabilityEntry::new(id.as_str())
                    .with_tasks(endpoint.capabilities.iter().cloned())
                    .with_priority(endpoint.priority)
                    .with_cost(endpoint.cost)
            })
            .collect()
    }

    pub fn router_policy(&self) -> RouterPolicy {
        RouterPolicy {
            primary: self.routing.primary.as_deref().map(EndpointId::from),
            fallback: self.routing.fallback.as_deref().map(EndpointId::from),
            fast_path_tasks: self.routing.fast_path_tasks.iter().cloned().collect(),
        }
    }

    pub fn escalation_policy(&self) -> Result<EscalationPolicy> {
        EscalationPolicy::new(
            self.escalation.auto_polish_threshold,
            self.escalation.soft_fallback,
        )
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        let base = Duration::from_secs(self.health.backoff_secs);
        match self.health.strategy {
            BackoffStrategy::Constant => BackoffPolicy::Constant(base),
            BackoffStrategy::Exponential => BackoffPolicy::CappedExponential {
                base,
                max: Duration::from_secs(self.health.max_backoff_secs),
                jitter: self.health.jitter,
            },
        }
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions::new(
            self.request.max_tokens,
            Duration::try_from_secs_f64(self.request.timeout_secs)
                .unwrap_or(Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS)),
        )
    }
}

// =============================================================================
// Endpoint Configuration
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    /// Provider kind: local, hosted, proxy
    pub kind: ProviderKind,

    /// Model name (adapter default when empty)
    pub model: String,

    /// Endpoint base URL; empty means not configured
    pub base_url: String,

    /// Inline credential. Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the credential
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Per-call timeout ceiling (seconds)
    pub timeout_secs: u64,

    /// Routing tier, lower is tried first
    pub priority: u8,

    /// Relative cost score
    pub cost: f64,

    /// Tasks served (`*` for any)
    pub capabilities: Vec<String>,
}

impl std::fmt::Debug for EndpointSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSettings")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("timeout_secs", &self.timeout_secs)
            .field("priority", &self.priority)
            .field("cost", &self.cost)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: String::new(),
            base_url: String::new(),
            api_key: None,
            api_key_env: None,
            timeout_secs: net_constants::DEFAULT_TIMEOUT_SECS,
            priority: routing_constants::DEFAULT_PRIORITY,
            cost: 0.0,
            capabilities: Vec::new(),
        }
    }
}

impl EndpointSettings {
    pub fn is_configured(&self) -> bool {
        !self.base_url.trim().is_empty()
    }

    pub fn to_model_config(&self, id: &str) -> ModelConfig {
        let mut config = ModelConfig::new(id, self.kind, self.base_url.trim())
            .with_model(self.model.clone())
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            config = config.with_api_key(key);
        }
        if let Some(var) = &self.api_key_env {
            config = config.with_credential_env(var.clone());
        }
        config
    }
}

// =============================================================================
// Routing Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Fast/cheap endpoint tried first for fast-path tasks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,

    /// Strong endpoint for everything else
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,

    /// Tasks routed to the primary first
    pub fast_path_tasks: Vec<String>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            primary: Some(routing_constants::PRIMARY_ID.to_string()),
            fallback: Some(routing_constants::SECONDARY_ID.to_string()),
            fast_path_tasks: routing_constants::DEFAULT_FAST_PATH_TASKS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

// =============================================================================
// Escalation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationSettings {
    /// Drive primary-first requests through the quality escalator
    pub enabled: bool,

    /// Primary scores strictly below this escalate to the fallback
    pub auto_polish_threshold: f64,

    /// Switch to the fallback instead of failing when the primary fails
    pub soft_fallback: bool,
}

impl Default for EscalationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_polish_threshold: esc_constants::DEFAULT_AUTO_POLISH_THRESHOLD,
            soft_fallback: true,
        }
    }
}

// =============================================================================
// Health Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    #[default]
    Constant,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    /// Backoff window after a failure (base window for exponential)
    pub backoff_secs: u64,

    pub strategy: BackoffStrategy,

    /// Cap for exponential backoff
    pub max_backoff_secs: u64,

    /// Add random jitter to exponential backoff
    pub jitter: bool,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            backoff_secs: health_constants::DEFAULT_BACKOFF_SECS,
            strategy: BackoffStrategy::Constant,
            max_backoff_secs: health_constants::MAX_BACKOFF_SECS,
            jitter: false,
        }
    }
}

// =============================================================================
// Request Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    pub max_tokens: u32,

    /// Per-call deadline (seconds, fractional allowed)
    pub timeout_secs: f64,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            max_tokens: net_constants::DEFAULT_MAX_TOKENS,
            timeout_secs: net_constants::DEFAULT_TIMEOUT_SECS as f64,
        }
    }
}
