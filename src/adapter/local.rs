//! Local Model Process Adapter
//!
//! Adapter for a model served by a process on this host using the Ollama
//! wire format. Local models report token counts but no quality score.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::http::{self, ClientSlot};
use super::{
    GenerateOptions, ModelAdapter, ModelConfig, ModelResponse, RequestContext, join_path,
    validate_endpoint,
};
use crate::constants::health as health_constants;
use crate::types::{Result, RouteError};

const DEFAULT_MODEL: &str = "llama3:latest";

/// Adapter for a locally-running model process
pub struct LocalAdapter {
    config: ModelConfig,
    model: String,
    client: ClientSlot,
    initialized: AtomicBool,
}

impl LocalAdapter {
    pub fn new(config: ModelConfig) -> Result<Self> {
        let url = validate_endpoint(config.base_url())?;

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
        {
            warn!(
                endpoint = %config.id(),
                host,
                "Local endpoint is not on this host. Ensure this is intentional."
            );
        }

        let model = if config.model().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.model().to_string()
        };
        let client = ClientSlot::new(&config)?;

        Ok(Self {
            config,
            model,
            client,
            initialized: AtomicBool::new(false),
        })
    }

    fn build_request(
        &self,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> LocalRequest {
        let mut model_options = options.extra.clone();
        model_options.insert("num_predict".to_string(), Value::from(options.max_tokens));

        LocalRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            system: context
                .get("system")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            stream: false,
            options: model_options,
        }
    }
}

#[async_trait]
impl ModelAdapter for LocalAdapter {
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
        debug!(endpoint = %self.config.id(), model = %self.model, "Generating with local model");

        let start_time = Instant::now();
        let client = self.client.get(&self.config)?;
        let request = self.build_request(prompt, context, options);
        let url = join_path(self.config.base_url(), "api/generate");

        let body: LocalResponse =
            http::post_json(&client, &self.config, &url, &request, options.timeout).await?;

        if let Some(error) = body.error {
            return Err(RouteError::provider(self.config.id().as_str(), error));
        }

        let content = body.response.ok_or_else(|| {
            RouteError::transport(
                self.config.id().as_str(),
                "Response body has no 'response' field",
            )
        })?;

        Ok(
            ModelResponse::new(content, self.config.id().as_str(), &self.model)
                .with_latency(start_time.elapsed())
                .with_extra(
                    "input_tokens",
                    Value::from(body.prompt_eval_count.unwrap_or(0)),
                )
                .with_extra("output_tokens", Value::from(body.eval_count.unwrap_or(0))),
        )
    }

    async fn health_check(&self) -> bool {
        let Ok(client) = self.client.get(&self.config) else {
            return false;
        };
        let url = join_path(self.config.base_url(), "api/tags");
        let timeout = Duration::from_secs(health_constants::HEALTH_CHECK_TIMEOUT_SECS);

        let response = match http::probe(&client, &self.config, &url, timeout).await {
            Ok(response) => response,
            Err(e) => {
                warn!(endpoint = %self.config.id(), error = %e, "Local model not available");
                return false;
            }
        };

        match response.json::<TagsResponse>().await {
            Ok(tags) => {
                let base_name = self.model.trim_end_matches(":latest");
                let model_available = tags
                    .models
                    .iter()
                    .any(|m| m.name == self.model || m.name.starts_with(base_name));

                if model_available {
                    info!(endpoint = %self.config.id(), model = %self.model, "Local model is available");
                } else {
                    warn!(
                        endpoint = %self.config.id(),
                        model = %self.model,
                        "Local runtime is up but the model is not pulled"
                    );
                }
                model_available
            }
            Err(_) => {
                info!(endpoint = %self.config.id(), "Local runtime is available");
                true
            }
        }
    }

    async fn cleanup(&self) -> Result<()> {
        self.initialized.store(false, Ordering::Release);
        self.client.release();
        Ok(())
    }

    fn name(&self) -> &str {
        self.config.id().as_str()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct LocalRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct LocalResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<TagsModel>,
}

#[derive(Debug, Deserialize)]
struct TagsModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ProviderKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn tags_replying(models: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
            .mount(&server)
            .await;
        server
    }

    fn adapter(url: &str, model: &str) -> LocalAdapter {
        let config = ModelConfig::new("local", ProviderKind::Local, url).with_model(model);
        LocalAdapter::new(config).unwrap()
    }

    #[test]
    fn test_default_model() {
        let config = ModelConfig::new("local", ProviderKind::Local, "http://localhost:11434");
        let adapter = LocalAdapter::new(config).expect("Failed to create adapter");
        assert_eq!(adapter.model(), DEFAULT_MODEL);
        assert_eq!(adapter.name(), "local");
    }

    #[tokio::test]
    async fn test_generate_parses_token_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "qwen2:7b",
                "system": "be brief",
                "stream": false,
                "options": {"num_predict": 32}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "pong",
                "prompt_eval_count": 7,
                "eval_count": 3
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut context = RequestContext::new();
        context.insert("system".into(), Value::from("be brief"));
        let response = adapter(&server.uri(), "qwen2:7b")
            .generate("ping", &context, &GenerateOptions::new(32, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(response.content(), "pong");
        assert_eq!(response.model(), "qwen2:7b");
        assert!(response.score().is_none());
        assert_eq!(response.metadata().get("output_tokens"), Some(&Value::from(3)));

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_health_requires_pulled_model() {
        let server = tags_replying(json!([{"name": "other:latest"}])).await;
        assert!(!adapter(&server.uri(), "llama3:latest").health_check().await);

        let server = tags_replying(json!([{"name": "llama3:latest"}])).await;
        assert!(adapter(&server.uri(), "llama3:latest").health_check().await);
    }
}
