//! Model Adapter Contract
//!
//! Defines the `ModelAdapter` trait every backend implements, plus the
//! immutable endpoint configuration and the response type they produce.
//!
//! ## Provider kinds
//!
//! - `local`: a model process on this host (Ollama wire format)
//! - `hosted`: a remote OpenAI-compatible chat completions API
//! - `proxy`: any endpoint speaking the plain `{prompt, max_tokens, options}` contract

mod hosted;
mod http;
mod local;
mod proxy;

pub use hosted::HostedAdapter;
pub use local::LocalAdapter;
pub use proxy::ProxyAdapter;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{escalation as esc_constants, network as net_constants};
use crate::types::{EndpointId, Result, RouteError};

/// Free-form request context forwarded to adapters
pub type RequestContext = Map<String, Value>;

/// Shared adapter type for concurrent access across requests.
pub type SharedAdapter = Arc<dyn ModelAdapter>;

// =============================================================================
// Provider Kind
// =============================================================================

/// Closed set of backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local model process
    Local,
    /// Remote hosted API
    Hosted,
    /// Plain prompt/response proxy
    #[default]
    Proxy,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Local => write!(f, "local"),
            ProviderKind::Hosted => write!(f, "hosted"),
            ProviderKind::Proxy => write!(f, "proxy"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(ProviderKind::Local),
            "hosted" => Ok(ProviderKind::Hosted),
            "proxy" => Ok(ProviderKind::Proxy),
            _ => Err(format!(
                "Unknown provider kind: {}. Valid values: local, hosted, proxy",
                s
            )),
        }
    }
}

// =============================================================================
// Model Configuration
// =============================================================================

/// Immutable configuration for one endpoint.
///
/// The credential is held as a `SecretString` and redacted from debug output.
/// `credential_env` names an environment variable read at request time when
/// no inline key is given.
pub struct ModelConfig {
    id: EndpointId,
    kind: ProviderKind,
    model: String,
    base_url: String,
    api_key: Option<SecretString>,
    credential_env: Option<String>,
    timeout: Duration,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("credential_env", &self.credential_env)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModelConfig {
    pub fn new(
        id: impl Into<EndpointId>,
        kind: ProviderKind,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            model: String::new(),
            base_url: base_url.into(),
            api_key: None,
            credential_env: None,
            timeout: Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_credential_env(mut self, var: impl Into<String>) -> Self {
        self.credential_env = Some(var.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve the credential: inline key first, then the referenced env var
    pub fn credential(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            return Some(key.expose_secret().to_string());
        }
        self.credential_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|v| !v.is_empty())
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some() || self.credential_env.is_some()
    }
}

// =============================================================================
// Quality Score
// =============================================================================

/// Quality signal attached to a response, always within [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct QualityScore(f64);

impl QualityScore {
    pub fn new(value: f64) -> Result<Self> {
        if value.is_finite() && (esc_constants::MIN_SCORE..=esc_constants::MAX_SCORE).contains(&value)
        {
            Ok(Self(value))
        } else {
            Err(RouteError::InvalidRequest(format!(
                "quality score must be within [{}, {}], got {}",
                esc_constants::MIN_SCORE,
                esc_constants::MAX_SCORE,
                value
            )))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for QualityScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Model Response
// =============================================================================

/// Response metadata. A missing score is a distinct state, not zero.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<QualityScore>,
    degraded: bool,
    latency_ms: u64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl ResponseMetadata {
    pub fn score(&self) -> Option<QualityScore> {
        self.score
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// One successful generation. Built once by an adapter; the consuming
/// builders below are the only way to derive a variant of it.
#[derive(Debug, Clone, Serialize)]
pub struct ModelResponse {
    content: String,
    provider: String,
    model: String,
    metadata: ResponseMetadata,
}

impl ModelResponse {
    pub fn new(
        content: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            provider: provider.into(),
            model: model.into(),
            metadata: ResponseMetadata::default(),
        }
    }

    pub fn with_score(mut self, score: QualityScore) -> Self {
        self.metadata.score = Some(score);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.metadata.latency_ms = latency.as_millis() as u64;
        self
    }

    /// Attach extra metadata. Reserved keys (`score`, `degraded`) are ignored.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key != "score" && key != "degraded" && key != "latency_ms" {
            self.metadata.extra.insert(key, value);
        }
        self
    }

    /// Mark as produced by a fallback path
    pub fn into_degraded(mut self) -> Self {
        self.metadata.degraded = true;
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn metadata(&self) -> &ResponseMetadata {
        &self.metadata
    }

    pub fn score(&self) -> Option<QualityScore> {
        self.metadata.score
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata.degraded
    }
}

// =============================================================================
// Generate Options
// =============================================================================

/// Per-request generation options
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Deadline for a single endpoint call
    pub timeout: Duration,
    /// Provider-specific options forwarded verbatim
    pub extra: Map<String, Value>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: net_constants::DEFAULT_MAX_TOKENS,
            timeout: Duration::from_secs(net_constants::DEFAULT_TIMEOUT_SECS),
            extra: Map::new(),
        }
    }
}

impl GenerateOptions {
    pub fn new(max_tokens: u32, timeout: Duration) -> Self {
        Self {
            max_tokens,
            timeout,
            extra: Map::new(),
        }
    }
}

// =============================================================================
// Model Adapter Trait
// =============================================================================

/// Uniform capability set every backend implements
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Idempotent setup (verifies reachability). Failure is reported as `false`.
    async fn initialize(&self) -> bool;

    /// Generate a response for `prompt`
    async fn generate(
        &self,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> Result<ModelResponse>;

    /// Cheap, time-bounded liveness probe. Never performs a generation.
    async fn health_check(&self) -> bool;

    /// Release held resources. Safe without a prior `initialize`.
    async fn cleanup(&self) -> Result<()>;

    /// Endpoint identity for logging and attribution
    fn name(&self) -> &str;

    /// Model name currently in use
    fn model(&self) -> &str;
}

/// Create a shared adapter from configuration
pub fn create_adapter(config: ModelConfig) -> Result<SharedAdapter> {
    match config.kind() {
        ProviderKind::Local => Ok(Arc::new(LocalAdapter::new(config)?)),
        ProviderKind::Hosted => Ok(Arc::new(HostedAdapter::new(config)?)),
        ProviderKind::Proxy => Ok(Arc::new(ProxyAdapter::new(config)?)),
    }
}

/// Parse an endpoint URL, accepting only the http and https schemes
pub(crate) fn validate_endpoint(endpoint: &str) -> Result<url::Url> {
    let url = url::Url::parse(endpoint).map_err(|e| {
        RouteError::Config(format!("Invalid endpoint URL '{}': {}", endpoint, e))
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RouteError::Config(format!(
            "Endpoint must use http or https scheme, got: {}",
            url.scheme()
        )));
    }

    Ok(url)
}

/// Join a relative path onto a base URL without dropping the base's path
pub(crate) fn join_path(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
