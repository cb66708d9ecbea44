//! Proxy Endpoint Adapter
//!
//! Speaks the plain upstream contract:
//! `POST <base_url>` with `{prompt, max_tokens, options}`; a 200 reply whose
//! JSON body carries a `response` string is a success. The reply may also
//! carry a quality `score` (top level or inside `metadata`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::http::{self, ClientSlot};
use super::{
    GenerateOptions, ModelAdapter, ModelConfig, ModelResponse, QualityScore, RequestContext,
    join_path, validate_endpoint,
};
use crate::constants::{health as health_constants, network as net_constants};
use crate::types::{Result, RouteError};

/// Adapter for endpoints implementing the prompt/response proxy contract
pub struct ProxyAdapter {
    config: ModelConfig,
    client: ClientSlot,
    initialized: AtomicBool,
}

impl ProxyAdapter {
    pub fn new(config: ModelConfig) -> Result<Self> {
        validate_endpoint(config.base_url())?;
        let client = ClientSlot::new(&config)?;

        Ok(Self {
            config,
            client,
            initialized: AtomicBool::new(false),
        })
    }

    fn build_request<'a>(
        prompt: &'a str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> ProxyRequest<'a> {
        let mut forwarded = options.extra.clone();
        if !context.is_empty() {
            forwarded.insert("context".to_string(), Value::Object(context.clone()));
        }

        ProxyRequest {
            prompt,
            max_tokens: options.max_tokens,
            options: forwarded,
        }
    }

    /// Turn a decoded body into a response, enforcing the score range
    fn into_response(&self, body: ProxyResponse, elapsed: Duration) -> Result<ModelResponse> {
        let endpoint = self.config.id().as_str();

        let content = match (body.response, body.error) {
            (Some(content), _) => content,
            (None, Some(error)) => return Err(RouteError::provider(endpoint, error)),
            (None, None) => {
                return Err(RouteError::transport(
                    endpoint,
                    "Response body has no 'response' field",
                ));
            }
        };

        let mut metadata = body.metadata.unwrap_or_default();
        let raw_score = match body.score.or_else(|| metadata.remove("score")) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.as_f64().ok_or_else(|| {
                RouteError::provider(endpoint, format!("Quality score is not a number: {}", value))
            })?),
        };
        metadata.remove("degraded");

        let model = body
            .model
            .unwrap_or_else(|| self.config.model().to_string());
        let mut response =
            ModelResponse::new(content, endpoint, model).with_latency(elapsed);

        if let Some(raw) = raw_score {
            let score = QualityScore::new(raw)
                .map_err(|e| RouteError::provider(endpoint, e.to_string()))?;
            response = response.with_score(score);
        }

        for (key, value) in metadata {
            response = response.with_extra(key, value);
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelAdapter for ProxyAdapter {
    async fn initialize(&self) -> bool {
        if self.initialized.load(Ordering::Acquire) {
            return true;
        }
        let ok = self.health_check().await;
        self.initialized.store(ok, Ordering::Release);
        ok
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> Result<ModelResponse> {
        debug!(
            endpoint = %self.config.id(),
            max_tokens = options.max_tokens,
            "Generating via proxy endpoint"
        );

        let start_time = Instant::now();
        let client = self.client.get(&self.config)?;
        let request = Self::build_request(prompt, context, options);

        let body: ProxyResponse = http::post_json(
            &client,
            &self.config,
            self.config.base_url(),
            &request,
            options.timeout,
        )
        .await?;

        self.into_response(body, start_time.elapsed())
    }

    async fn health_check(&self) -> bool {
        let client = match self.client.get(&self.config) {
            Ok(client) => client,
            Err(e) => {
                warn!(endpoint = %self.config.id(), error = %e, "Health check could not build client");
                return false;
            }
        };
        let url = join_path(self.config.base_url(), net_constants::PROXY_HEALTH_PATH);
        let timeout = Duration::from_secs(health_constants::HEALTH_CHECK_TIMEOUT_SECS);

        match http::probe(&client, &self.config, &url, timeout).await {
            Ok(_) => {
                info!(endpoint = %self.config.id(), "Proxy endpoint is available");
                true
            }
            Err(e) => {
                warn!(endpoint = %self.config.id(), error = %e, "Proxy endpoint health check failed");
                false
            }
        }
    }

    async fn cleanup(&self) -> Result<()> {
        self.initialized.store(false, Ordering::Release);
        if self.client.release() {
            debug!(endpoint = %self.config.id(), "Released HTTP client");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        self.config.id().as_str()
    }

    fn model(&self) -> &str {
        self.config.model()
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    prompt: &'a str,
    max_tokens: u32,
    options: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ProxyResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    score: Option<Value>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ProviderKind;
    use crate::types::ErrorCategory;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(url: &str) -> ProxyAdapter {
        let config = ModelConfig::new("secondary", ProviderKind::Proxy, url)
            .with_model("strong-model")
            .with_api_key("sek");
        ProxyAdapter::new(config).unwrap()
    }

    fn options() -> GenerateOptions {
        GenerateOptions::new(64, Duration::from_secs(5))
    }

    /// Server answering every generate POST with `status` and `body`
    async fn replying(status: u16, body: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    async fn generate_against(body: Value) -> Result<ModelResponse> {
        let server = replying(200, body).await;
        adapter(&server.uri())
            .generate("p", &RequestContext::new(), &options())
            .await
    }

    #[tokio::test]
    async fn test_generate_sends_wire_contract() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("authorization", "Bearer sek"))
            .and(body_partial_json(json!({
                "prompt": "Hello",
                "max_tokens": 64,
                "options": {"context": {"task": "chat"}}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "Hi", "score": 88})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut context = RequestContext::new();
        context.insert("task".into(), Value::from("chat"));

        let response = adapter(&server.uri())
            .generate("Hello", &context, &options())
            .await
            .unwrap();
        assert_eq!(response.content(), "Hi");
        assert_eq!(response.provider(), "secondary");
        assert_eq!(response.model(), "strong-model");
        assert_eq!(response.score().map(|s| s.value()), Some(88.0));
    }

    #[tokio::test]
    async fn test_score_inside_metadata() {
        let response =
            generate_against(json!({"response": "ok", "metadata": {"score": 41.5, "tokens": 9}}))
                .await
                .unwrap();
        assert_eq!(response.score().map(|s| s.value()), Some(41.5));
        assert_eq!(response.metadata().get("tokens"), Some(&Value::from(9)));
    }

    #[tokio::test]
    async fn test_missing_score_stays_absent() {
        let response = generate_against(json!({"response": "ok"})).await.unwrap();
        assert!(response.score().is_none());

        let response = generate_against(json!({"response": "ok", "metadata": {"score": null}}))
            .await
            .unwrap();
        assert!(response.score().is_none());
    }

    #[tokio::test]
    async fn test_non_numeric_score_rejected_wherever_it_appears() {
        let err = generate_against(json!({"response": "ok", "metadata": {"score": "50"}}))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Provider);
        assert!(err.to_string().contains("not a number"));

        let err = generate_against(json!({"response": "ok", "score": "50"}))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Provider);
    }

    #[tokio::test]
    async fn test_non_200_is_transport_failure() {
        let server = replying(503, json!({"error": "overloaded"})).await;
        let err = adapter(&server.uri())
            .generate("p", &RequestContext::new(), &options())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transport);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_error_body_is_provider_rejection() {
        let err = generate_against(json!({"error": "prompt rejected"}))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Provider);
        assert!(err.to_string().contains("prompt rejected"));
    }

    #[tokio::test]
    async fn test_out_of_range_score_rejected() {
        let err = generate_against(json!({"response": "ok", "score": 140}))
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Provider);
    }

    #[tokio::test]
    async fn test_health_check_and_cleanup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        let adapter = adapter(&server.uri());

        assert!(adapter.initialize().await);
        assert!(adapter.initialize().await);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);

        adapter.cleanup().await.unwrap();
        // cleanup twice is harmless
        adapter.cleanup().await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_health() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let adapter = adapter(&url);
        assert!(!adapter.health_check().await);
        assert!(!adapter.initialize().await);
    }
}
