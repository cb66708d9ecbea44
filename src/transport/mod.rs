//! Health-Aware Transport
//!
//! Breaker-guarded calls to configured endpoints with cascading fallback.
//!
//! ## Strategy
//!
//! 1. Check the endpoint's health; skip it (no network call) while backing off
//! 2. Call the adapter under the per-request deadline
//! 3. Success closes the circuit; a transport-class failure opens it
//! 4. On skip or transport failure, move to the next candidate in the route
//! 5. A provider rejection stops the cascade
//! 6. When every candidate is skipped or fails, report "no endpoint available"

mod headers;
mod health;

pub use headers::build_auth_headers;
pub use health::{
    BackoffPolicy, CircuitState, Clock, EndpointHealthState, HealthRegistry, HealthSnapshot,
    SystemClock,
};

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::adapter::{GenerateOptions, ModelAdapter, ModelResponse, RequestContext, SharedAdapter};
use crate::routing::Route;
use crate::timeout::with_timeout;
use crate::types::{EndpointId, Result, RouteError};

// =============================================================================
// Dispatch Report
// =============================================================================

/// What happened to one candidate during a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Produced the response
    Served,
    /// Backing off; no network call made
    Skipped,
    /// Transport-class failure
    Failed,
    /// Application-level rejection; cascade stopped
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub endpoint: EndpointId,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-dispatch trace of every candidate considered
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub attempts: Vec<AttemptRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub served_by: Option<EndpointId>,
    pub total_duration_ms: u64,
}

impl DispatchReport {
    pub fn skipped(&self) -> usize {
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Skipped)
            .count()
    }

    fn record(&mut self, endpoint: &EndpointId, started: Instant, result: &Result<ModelResponse>) {
        let outcome = match result {
            Ok(_) => AttemptOutcome::Served,
            Err(RouteError::CircuitOpen { .. }) => AttemptOutcome::Skipped,
            Err(e) if e.category().allows_cascade() => AttemptOutcome::Failed,
            Err(_) => AttemptOutcome::Rejected,
        };
        self.attempts.push(AttemptRecord {
            endpoint: endpoint.clone(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
            error: result.as_ref().err().map(|e| e.to_string()),
        });
    }
}

/// Result of driving a route to completion
#[derive(Debug)]
pub struct DispatchOutcome {
    pub result: Result<ModelResponse>,
    pub report: DispatchReport,
}

// =============================================================================
// Transport
// =============================================================================

/// Registered adapters plus the health registry guarding them
pub struct HealthAwareTransport {
    adapters: BTreeMap<EndpointId, SharedAdapter>,
    registry: HealthRegistry,
    policy: BackoffPolicy,
}

impl std::fmt::Debug for HealthAwareTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthAwareTransport")
            .field("endpoints", &self.adapters.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

impl HealthAwareTransport {
    pub fn new(registry: HealthRegistry, policy: BackoffPolicy) -> Self {
        Self {
            adapters: BTreeMap::new(),
            registry,
            policy,
        }
    }

    /// Register an adapter under `id`, replacing any previous one
    pub fn register(&mut self, id: impl Into<EndpointId>, adapter: SharedAdapter) {
        self.adapters.insert(id.into(), adapter);
    }

    pub fn with_adapter(mut self, id: impl Into<EndpointId>, adapter: SharedAdapter) -> Self {
        self.register(id, adapter);
        self
    }

    pub fn adapter(&self, id: &EndpointId) -> Option<&SharedAdapter> {
        self.adapters.get(id)
    }

    pub fn endpoint_ids(&self) -> impl Iterator<Item = &EndpointId> {
        self.adapters.keys()
    }

    pub fn registry(&self) -> &HealthRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// One breaker-guarded call to a single endpoint
    pub async fn attempt(
        &self,
        id: &EndpointId,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> Result<ModelResponse> {
        let adapter = self
            .adapters
            .get(id)
            .ok_or_else(|| RouteError::Config(format!("Endpoint '{}' is not configured", id)))?;

        if let Err(retry_in) = self.registry.check(id) {
            debug!(endpoint = %id, retry_in_ms = retry_in.as_millis() as u64, "Skipping endpoint (circuit OPEN)");
            return Err(RouteError::CircuitOpen {
                endpoint: id.to_string(),
                retry_in,
            });
        }

        let operation = format!("generate [{}]", id);
        let result = with_timeout(
            options.timeout,
            adapter.generate(prompt, context, options),
            &operation,
        )
        .await;

        match &result {
            Ok(_) => {
                if self.registry.record_success(id) {
                    info!(endpoint = %id, state = %CircuitState::Closed, "Endpoint recovered");
                }
            }
            Err(e) if e.category().trips_breaker() => {
                let backoff = self.registry.record_failure(id, &self.policy);
                warn!(
                    endpoint = %id,
                    state = %CircuitState::Open,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Endpoint failed, circuit opened"
                );
            }
            Err(e) => {
                debug!(endpoint = %id, error = %e, category = %e.category(), "Endpoint rejected request");
            }
        }

        result
    }

    /// Walk `route` in order until one endpoint serves the request.
    ///
    /// Never returns a transport-class error from a single endpoint: when
    /// every candidate is skipped or fails the result is
    /// `RouteError::NoEndpointAvailable`.
    #[instrument(skip(self, route, prompt, context, options), fields(task = %route.task, candidates = route.endpoints.len()))]
    pub async fn dispatch(
        &self,
        route: &Route,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> DispatchOutcome {
        let start_time = Instant::now();
        let mut report = DispatchReport::default();

        if route.endpoints.is_empty() {
            return DispatchOutcome {
                result: Err(RouteError::Config("no endpoints configured".to_string())),
                report,
            };
        }

        for (position, id) in route.endpoints.iter().enumerate() {
            if position > 0 {
                info!(endpoint = %id, position, "Cascading to next candidate");
            }

            let attempt_start = Instant::now();
            let result = self.attempt(id, prompt, context, options).await;
            report.record(id, attempt_start, &result);

            match result {
                Ok(response) => {
                    report.served_by = Some(id.clone());
                    report.total_duration_ms = start_time.elapsed().as_millis() as u64;
                    return DispatchOutcome {
                        result: Ok(response),
                        report,
                    };
                }
                Err(e) if e.category().allows_cascade() => continue,
                Err(e) => {
                    report.total_duration_ms = start_time.elapsed().as_millis() as u64;
                    return DispatchOutcome {
                        result: Err(e),
                        report,
                    };
                }
            }
        }

        report.total_duration_ms = start_time.elapsed().as_millis() as u64;
        warn!(
            attempts = report.attempts.len(),
            skipped = report.skipped(),
            "No endpoint available"
        );

        DispatchOutcome {
            result: Err(RouteError::NoEndpointAvailable {
                attempted: route.endpoints.iter().map(|id| id.to_string()).collect(),
            }),
            report,
        }
    }

    /// Adapter view of one endpoint whose `generate` goes through the breaker
    pub fn guard(self: &Arc<Self>, id: &EndpointId) -> Option<GuardedAdapter> {
        let adapter = self.adapters.get(id)?.clone();
        Some(GuardedAdapter {
            transport: Arc::clone(self),
            id: id.clone(),
            adapter,
        })
    }

    /// Initialize every adapter concurrently
    pub async fn initialize_all(&self) -> Vec<(EndpointId, bool)> {
        let futures = self.adapters.iter().map(|(id, adapter)| async move {
            let ok = adapter.initialize().await;
            if !ok {
                warn!(endpoint = %id, "Endpoint failed to initialize");
            }
            (id.clone(), ok)
        });
        join_all(futures).await
    }

    /// Clean up every adapter; failures are logged and counted, never abort
    /// the remaining cleanups
    pub async fn cleanup_all(&self) -> usize {
        let futures = self.adapters.iter().map(|(id, adapter)| async move {
            match adapter.cleanup().await {
                Ok(()) => true,
                Err(e) => {
                    warn!(endpoint = %id, error = %e, "Endpoint cleanup failed");
                    false
                }
            }
        });
        join_all(futures).await.into_iter().filter(|ok| !ok).count()
    }
}

// =============================================================================
// Guarded Adapter
// =============================================================================

/// A single endpoint seen through the transport's breaker
pub struct GuardedAdapter {
    transport: Arc<HealthAwareTransport>,
    id: EndpointId,
    adapter: SharedAdapter,
}

impl GuardedAdapter {
    pub fn id(&self) -> &EndpointId {
        &self.id
    }
}

#[async_trait]
impl ModelAdapter for GuardedAdapter {
    async fn initialize(&self) -> bool {
        self.adapter.initialize().await
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> Result<ModelResponse> {
        self.transport
            .attempt(&self.id, prompt, context, options)
            .await
    }

    async fn health_check(&self) -> bool {
        self.adapter.health_check().await
    }

    async fn cleanup(&self) -> Result<()> {
        self.adapter.cleanup().await
    }

    fn name(&self) -> &str {
        self.id.as_str()
    }

    fn model(&self) -> &str {
        self.adapter.model()
    }
}
