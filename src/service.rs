//! Router Service
//!
//! The boundary the thin API layer and the CLI call into. Composes the
//! capability router, the health-aware transport and (when a primary and a
//! fallback are both configured) the quality escalator.
//!
//! Only configuration errors escape as `Err`; every other failure is
//! returned as `GenerateResult { ok: false, error }`.

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Span, debug, info, instrument, warn};
use uuid::Uuid;

use crate::adapter::{GenerateOptions, ModelResponse, RequestContext, create_adapter};
use crate::config::Config;
use crate::constants::{health as health_constants, routing as routing_constants};
use crate::escalation::{EscalationPolicy, QualityEscalator};
use crate::routing::CapabilityRouter;
use crate::timeout::with_timeout_map;
use crate::transport::{HealthAwareTransport, HealthRegistry, HealthSnapshot};
use crate::types::{EndpointId, Result, RouteError};

// =============================================================================
// Boundary Types
// =============================================================================

/// Successful generation as seen by callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationPayload {
    pub response: String,
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub degraded: bool,
}

impl From<ModelResponse> for GenerationPayload {
    fn from(response: ModelResponse) -> Self {
        Self {
            score: response.score().map(|s| s.value()),
            degraded: response.is_degraded(),
            provider: response.provider().to_string(),
            model: response.model().to_string(),
            response: response.content().to_string(),
        }
    }
}

/// `{ok, result?, error?}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerationPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerateResult {
    pub fn success(response: ModelResponse) -> Self {
        Self {
            ok: true,
            result: Some(response.into()),
            error: None,
        }
    }

    pub fn failure(error: &RouteError) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// Reply to `suggest`
#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub model: String,
    pub suggestion: String,
    /// Full boundary result
    pub raw: Value,
}

/// Reply to `route_info`
#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    pub task: String,
    pub candidates: Vec<EndpointId>,
    pub health: Vec<HealthSnapshot>,
}

/// Liveness of one endpoint, for the `health` command
#[derive(Debug, Clone, Serialize)]
pub struct EndpointProbe {
    pub endpoint: EndpointId,
    pub model: String,
    pub reachable: bool,
    pub health: HealthSnapshot,
}

// =============================================================================
// Service
// =============================================================================

pub struct RouterService {
    router: CapabilityRouter,
    transport: Arc<HealthAwareTransport>,
    escalator: Option<QualityEscalator>,
    defaults: GenerateOptions,
}

impl std::fmt::Debug for RouterService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterService")
            .field("router", &self.router)
            .field("transport", &self.transport)
            .field("escalator", &self.escalator)
            .finish()
    }
}

impl RouterService {
    /// Build from configuration, sharing the process-wide health registry
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_registry(config, HealthRegistry::global())
    }

    /// Build from configuration with an explicit health registry
    pub fn with_registry(config: &Config, registry: HealthRegistry) -> Result<Self> {
        config.validate()?;

        let mut transport = HealthAwareTransport::new(registry, config.backoff_policy());
        for model_config in config.model_configs() {
            let id = model_config.id().clone();
            debug!(endpoint = %id, kind = %model_config.kind(), "Registering endpoint");
            transport.register(id, create_adapter(model_config)?);
        }

        let router = CapabilityRouter::new(config.router_policy(), config.capability_entries());
        let escalation = if config.escalation.enabled {
            Some(config.escalation_policy()?)
        } else {
            None
        };

        Ok(Self::from_parts(
            router,
            transport,
            escalation,
            config.generate_options(),
        ))
    }

    /// Assemble from prebuilt parts. The escalator is wired only when the
    /// router has distinct primary and fallback endpoints.
    pub fn from_parts(
        router: CapabilityRouter,
        transport: HealthAwareTransport,
        escalation: Option<EscalationPolicy>,
        defaults: GenerateOptions,
    ) -> Self {
        let transport = Arc::new(transport);

        let escalator = match (escalation, router.primary(), router.fallback()) {
            (Some(policy), Some(primary), Some(fallback)) if primary != fallback => {
                match (transport.guard(primary), transport.guard(fallback)) {
                    (Some(primary), Some(fallback)) => Some(QualityEscalator::new(
                        Arc::new(primary),
                        Arc::new(fallback),
                        policy,
                    )),
                    _ => None,
                }
            }
            _ => None,
        };

        Self {
            router,
            transport,
            escalator,
            defaults,
        }
    }

    pub fn router(&self) -> &CapabilityRouter {
        &self.router
    }

    pub fn transport(&self) -> &Arc<HealthAwareTransport> {
        &self.transport
    }

    pub fn registry(&self) -> &HealthRegistry {
        self.transport.registry()
    }

    pub fn escalator(&self) -> Option<&QualityEscalator> {
        self.escalator.as_ref()
    }

    pub fn defaults(&self) -> &GenerateOptions {
        &self.defaults
    }

    /// Initialize every endpoint; returns how many came up
    pub async fn initialize(&self) -> usize {
        let results = self.transport.initialize_all().await;
        let ready = results.iter().filter(|(_, ok)| *ok).count();
        info!(ready, total = results.len(), "Endpoints initialized");
        ready
    }

    /// Release every endpoint's resources. Never fails; individual cleanup
    /// failures are logged.
    pub async fn shutdown(&self) {
        let failures = self.transport.cleanup_all().await;
        if failures > 0 {
            warn!(failures, "Shutdown completed with cleanup failures");
        } else {
            debug!("Shutdown complete");
        }
    }

    /// Primary boundary operation.
    ///
    /// The task is read from `context["task"]` (default `chat`).
    #[instrument(skip(self, prompt, context), fields(request_id = %Uuid::new_v4(), task = tracing::field::Empty))]
    pub async fn generate(
        &self,
        prompt: &str,
        context: &RequestContext,
        max_tokens: u32,
        timeout_seconds: f64,
    ) -> Result<GenerateResult> {
        let task = task_of(context);
        Span::current().record("task", task);

        let options = match self.options_for(prompt, max_tokens, timeout_seconds) {
            Ok(options) => options,
            Err(e) => return Ok(GenerateResult::failure(&e)),
        };

        let route = self.router.choose_model(task, context)?;

        let result = match (&self.escalator, self.router.primary()) {
            (Some(escalator), Some(primary)) if route.starts_with(primary) => {
                let (result, report) = escalator
                    .generate_with_report(prompt, context, &options)
                    .await;
                debug!(path = %report.path(), reason = ?report.reason, "Escalation finished");
                result
            }
            _ => {
                let outcome = self.transport.dispatch(&route, prompt, context, &options).await;
                debug!(
                    attempts = outcome.report.attempts.len(),
                    served_by = ?outcome.report.served_by,
                    "Dispatch finished"
                );
                outcome.result
            }
        };

        match result {
            Ok(response) => {
                info!(
                    provider = %response.provider(),
                    degraded = response.is_degraded(),
                    latency_ms = response.metadata().latency_ms(),
                    "Request served"
                );
                Ok(GenerateResult::success(response))
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, category = %e.category(), "Request failed");
                Ok(GenerateResult::failure(&e))
            }
        }
    }

    /// Generate with the configured request defaults
    pub async fn generate_default(
        &self,
        prompt: &str,
        context: &RequestContext,
    ) -> Result<GenerateResult> {
        self.generate(
            prompt,
            context,
            self.defaults.max_tokens,
            self.defaults.timeout.as_secs_f64(),
        )
        .await
    }

    /// Suggestion for `task`; the prompt is taken from `context["prompt"]`
    pub async fn suggest(&self, task: &str, context: &RequestContext) -> Result<Suggestion> {
        let prompt = context
            .get("prompt")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let mut context = context.clone();
        context.insert("task".to_string(), Value::from(task));

        let result = self.generate_default(&prompt, &context).await?;
        let (model, suggestion) = match &result.result {
            Some(payload) => (payload.model.clone(), payload.response.clone()),
            None => (String::new(), String::new()),
        };

        Ok(Suggestion {
            model,
            suggestion,
            raw: serde_json::to_value(&result)?,
        })
    }

    /// Candidates and their health for `task`
    pub fn route_info(&self, task: &str) -> Result<RouteInfo> {
        let route = self.router.choose_model(task, &RequestContext::new())?;
        let health = self.registry().snapshots(&route.endpoints);
        Ok(RouteInfo {
            task: route.task,
            candidates: route.endpoints,
            health,
        })
    }

    /// Run every endpoint's liveness probe concurrently
    pub async fn probe_all(&self) -> Vec<EndpointProbe> {
        let probe_timeout = Duration::from_secs(health_constants::HEALTH_CHECK_TIMEOUT_SECS);
        let probes = self.transport.endpoint_ids().filter_map(|id| {
            let adapter = self.transport.adapter(id)?.clone();
            Some(async move {
                let reachable = with_timeout_map(probe_timeout, adapter.health_check(), "health probe")
                    .await
                    .unwrap_or(false);
                EndpointProbe {
                    endpoint: id.clone(),
                    model: adapter.model().to_string(),
                    reachable,
                    health: self.registry().snapshot(id),
                }
            })
        });
        join_all(probes).await
    }

    fn options_for(
        &self,
        prompt: &str,
        max_tokens: u32,
        timeout_seconds: f64,
    ) -> Result<GenerateOptions> {
        if prompt.trim().is_empty() {
            return Err(RouteError::InvalidRequest("prompt must not be empty".to_string()));
        }
        if max_tokens == 0 {
            return Err(RouteError::InvalidRequest(
                "max_tokens must be greater than 0".to_string(),
            ));
        }
        let timeout = Duration::try_from_secs_f64(timeout_seconds)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or_else(|| {
                RouteError::InvalidRequest(format!(
                    "timeout_seconds must be a positive number of seconds, got {}",
                    timeout_seconds
                ))
            })?;

        let mut options = self.defaults.clone();
        options.max_tokens = max_tokens;
        options.timeout = timeout;
        Ok(options)
    }
}

fn task_of(context: &RequestContext) -> &str {
    context
        .get("task")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or(routing_constants::DEFAULT_TASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ModelAdapter, SharedAdapter};
    use crate::config::EndpointSettings;
    use crate::routing::{CapabilityEntry, RouterPolicy};
    use crate::test_support::{MockAdapter, MockReply};
    use crate::transport::BackoffPolicy;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(
        primary: Arc<MockAdapter>,
        secondary: Arc<MockAdapter>,
        policy: Option<EscalationPolicy>,
    ) -> RouterService {
        let router = CapabilityRouter::new(
            RouterPolicy::default(),
            vec![
                CapabilityEntry::new("primary"),
                CapabilityEntry::new("secondary"),
            ],
        );
        let transport = HealthAwareTransport::new(HealthRegistry::new(), BackoffPolicy::default())
            .with_adapter("primary", primary as SharedAdapter)
            .with_adapter("secondary", secondary as SharedAdapter);
        RouterService::from_parts(router, transport, policy, GenerateOptions::default())
    }

    fn context(task: &str) -> RequestContext {
        let mut context = RequestContext::new();
        context.insert("task".into(), Value::from(task));
        context
    }

    #[tokio::test]
    async fn test_soft_fallback_end_to_end() {
        let primary = Arc::new(MockAdapter::failing("primary"));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("Hi")));
        let service = service(primary, secondary, Some(EscalationPolicy::default()));

        let result = service
            .generate("Hello", &RequestContext::new(), 128, 5.0)
            .await
            .unwrap();

        assert!(result.ok);
        let payload = result.result.clone().unwrap();
        assert_eq!(payload.response, "Hi");
        assert_eq!(payload.provider, "secondary");
        assert!(payload.degraded);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["result"]["response"], "Hi");
        assert_eq!(json["result"]["degraded"], true);
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn test_escalation_by_score() {
        let primary = Arc::new(MockAdapter::new("primary", MockReply::scored("draft", 50.0)));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::scored("polished", 91.0)));
        let service = service(primary, secondary.clone(), Some(EscalationPolicy::default()));

        let result = service
            .generate("Hello", &context("summarize"), 128, 5.0)
            .await
            .unwrap();
        let payload = result.result.unwrap();
        assert_eq!(payload.provider, "secondary");
        assert_eq!(payload.score, Some(91.0));
        assert!(!payload.degraded);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_non_fast_path_task_goes_to_fallback() {
        let primary = Arc::new(MockAdapter::new("primary", MockReply::text("cheap")));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("strong")));
        let service = service(primary.clone(), secondary, Some(EscalationPolicy::default()));

        let result = service
            .generate("write code", &context("codegen"), 128, 5.0)
            .await
            .unwrap();
        assert_eq!(result.result.unwrap().provider, "secondary");
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_without_escalation_dispatch_cascades() {
        let primary = Arc::new(MockAdapter::failing("primary"));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("Hi")));
        let service = service(primary, secondary, None);
        assert!(service.escalator().is_none());

        let result = service
            .generate("Hello", &RequestContext::new(), 128, 5.0)
            .await
            .unwrap();
        let payload = result.result.unwrap();
        assert_eq!(payload.provider, "secondary");
        assert!(!payload.degraded);
    }

    #[tokio::test]
    async fn test_total_failure_is_structured() {
        let primary = Arc::new(MockAdapter::failing("primary"));
        let secondary = Arc::new(MockAdapter::failing("secondary"));
        let service = service(primary, secondary, None);

        let result = service
            .generate("Hello", &RequestContext::new(), 128, 5.0)
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.result.is_none());
        assert_eq!(result.error.as_deref(), Some("no endpoint available"));
    }

    #[tokio::test]
    async fn test_strict_mode_failure_is_structured() {
        let primary = Arc::new(MockAdapter::failing("primary"));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("Hi")));
        let service = service(
            primary,
            secondary.clone(),
            Some(EscalationPolicy::new(70.0, false).unwrap()),
        );

        let result = service
            .generate("Hello", &RequestContext::new(), 128, 5.0)
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("primary unreachable"));
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_no_endpoints_is_hard_failure() {
        let service = RouterService::with_registry(&Config::default(), HealthRegistry::new())
            .unwrap();
        let err = service
            .generate("Hello", &RequestContext::new(), 128, 5.0)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(service.route_info("chat").is_err());
    }

    #[test]
    fn test_unrepresentable_config_timeout_is_config_error() {
        let mut config = Config::default();
        config.request.timeout_secs = 1e30;
        let err = RouterService::with_registry(&config, HealthRegistry::new()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_invalid_request_is_structured() {
        let primary = Arc::new(MockAdapter::new("primary", MockReply::text("x")));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("y")));
        let service = service(primary.clone(), secondary, None);

        let result = service
            .generate("Hello", &RequestContext::new(), 128, -1.0)
            .await
            .unwrap();
        assert!(!result.ok);
        let result = service
            .generate("Hello", &RequestContext::new(), 128, 1e30)
            .await
            .unwrap();
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("timeout_seconds"));
        let result = service
            .generate("Hello", &RequestContext::new(), 128, f64::NAN)
            .await
            .unwrap();
        assert!(!result.ok);
        let result = service
            .generate("   ", &RequestContext::new(), 128, 5.0)
            .await
            .unwrap();
        assert!(!result.ok);
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_route_info_reports_health() {
        let primary = Arc::new(MockAdapter::failing("primary"));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("Hi")));
        let service = service(primary, secondary, Some(EscalationPolicy::default()));

        service
            .generate("Hello", &RequestContext::new(), 128, 5.0)
            .await
            .unwrap();

        let info = service.route_info("chat").unwrap();
        assert_eq!(
            info.candidates,
            vec![EndpointId::from("primary"), EndpointId::from("secondary")]
        );
        assert!(!info.health[0].available);
        assert_eq!(info.health[0].consecutive_failures, 1);
        assert!(info.health[1].available);
    }

    #[tokio::test]
    async fn test_suggest() {
        let primary = Arc::new(MockAdapter::new("primary", MockReply::scored("Try a loop", 80.0)));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("y")));
        let service = service(primary, secondary, Some(EscalationPolicy::default()));

        let mut context = RequestContext::new();
        context.insert("prompt".into(), json!("How do I repeat this?"));
        let suggestion = service.suggest("chat", &context).await.unwrap();
        assert_eq!(suggestion.model, "mock-model");
        assert_eq!(suggestion.suggestion, "Try a loop");
        assert_eq!(suggestion.raw["ok"], true);
        assert_eq!(suggestion.raw["result"]["score"], 80.0);

        let empty = service.suggest("chat", &RequestContext::new()).await.unwrap();
        assert_eq!(empty.raw["ok"], false);
    }

    #[tokio::test]
    async fn test_shutdown_cleans_up_every_adapter() {
        let primary = Arc::new(MockAdapter::new("primary", MockReply::text("x")).with_failing_cleanup());
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("y")));
        let service = service(primary.clone(), secondary.clone(), Some(EscalationPolicy::default()));

        assert_eq!(service.initialize().await, 2);
        service.shutdown().await;
        assert_eq!(primary.cleanup_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(secondary.cleanup_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_liveness_check_does_not_generate() {
        let primary = Arc::new(MockAdapter::new("primary", MockReply::text("x")));
        let secondary = Arc::new(MockAdapter::new("secondary", MockReply::text("y")).unhealthy());
        let service = service(primary.clone(), secondary, None);

        let probes = service.probe_all().await;
        assert_eq!(probes.len(), 2);
        assert!(probes[0].reachable);
        assert!(!probes[1].reachable);
        assert_eq!(primary.calls(), 0);
        assert_eq!(primary.name(), "primary");
    }

    #[tokio::test]
    async fn test_from_config_over_http() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("authorization", "Bearer sk-secondary"))
            .and(body_partial_json(json!({"prompt": "Hello", "max_tokens": 64})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "Hi", "model": "strong"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.endpoints.insert(
            "primary".into(),
            EndpointSettings {
                base_url: dead_url,
                ..EndpointSettings::default()
            },
        );
        config.endpoints.insert(
            "secondary".into(),
            EndpointSettings {
                base_url: server.uri(),
                api_key: Some("sk-secondary".into()),
                ..EndpointSettings::default()
            },
        );

        let service = RouterService::with_registry(&config, HealthRegistry::new()).unwrap();
        let result = service
            .generate("Hello", &RequestContext::new(), 64, 5.0)
            .await
            .unwrap();

        assert!(result.ok);
        let payload = result.result.unwrap();
        assert_eq!(payload.response, "Hi");
        assert_eq!(payload.provider, "secondary");
        assert!(payload.degraded);
        assert_eq!(payload.model, "strong");

        // The failed primary is now backing off
        let info = service.route_info("chat").unwrap();
        assert!(!info.health[0].available);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
