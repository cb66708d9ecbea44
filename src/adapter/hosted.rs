//! Hosted API Adapter
//!
//! Adapter for remote OpenAI-compatible Chat Completions endpoints.
//! The credential is required and sent through the shared header builder.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
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

const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Adapter for a hosted chat completions API
pub struct HostedAdapter {
    config: ModelConfig,
    model: String,
    client: ClientSlot,
    initialized: AtomicBool,
}

impl std::fmt::Debug for HostedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedAdapter")
            .field("config", &self.config)
            .field("model", &self.model)
            .finish()
    }
}

impl HostedAdapter {
    pub fn new(config: ModelConfig) -> Result<Self> {
        validate_endpoint(config.base_url())?;

        if !config.has_credential() {
            return Err(RouteError::Config(format!(
                "Hosted endpoint '{}' needs an api_key or api_key_env",
                config.id()
            )));
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
    ) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = context.get("system").and_then(|v| v.as_str()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: options.max_tokens,
            temperature: options.extra.get("temperature").and_then(|v| v.as_f64()),
        }
    }
}

#[async_trait]
impl ModelAdapter for HostedAdapter {
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
        debug!(endpoint = %self.config.id(), model = %self.model, "Generating with hosted API");

        let start_time = Instant::now();
        let client = self.client.get(&self.config)?;
        let request = self.build_request(prompt, context, options);
        let url = join_path(self.config.base_url(), "chat/completions");

        let body: ChatCompletionResponse =
            http::post_json(&client, &self.config, &url, &request, options.timeout).await?;

        let endpoint = self.config.id().as_str();
        let choice = body.choices.into_iter().next().ok_or_else(|| {
            RouteError::transport(endpoint, "No choices in chat completion response")
        })?;

        let content = match (choice.message.content, choice.message.refusal) {
            (Some(content), _) => content,
            (None, Some(refusal)) => return Err(RouteError::provider(endpoint, refusal)),
            (None, None) => {
                return Err(RouteError::provider(
                    endpoint,
                    format!(
                        "Empty completion (finish_reason: {})",
                        choice.finish_reason.as_deref().unwrap_or("unknown")
                    ),
                ));
            }
        };

        let model = body.model.unwrap_or_else(|| self.model.clone());
        let mut response =
            ModelResponse::new(content, endpoint, model).with_latency(start_time.elapsed());
        if let Some(usage) = body.usage {
            response = response
                .with_extra("input_tokens", Value::from(usage.prompt_tokens))
                .with_extra("output_tokens", Value::from(usage.completion_tokens));
        }
        Ok(response)
    }

    async fn health_check(&self) -> bool {
        let Ok(client) = self.client.get(&self.config) else {
            return false;
        };
        let url = join_path(self.config.base_url(), "models");
        let timeout = Duration::from_secs(health_constants::HEALTH_CHECK_TIMEOUT_SECS);

        match http::probe(&client, &self.config, &url, timeout).await {
            Ok(_) => {
                info!(endpoint = %self.config.id(), "Hosted API is available");
                true
            }
            Err(e) => {
                warn!(endpoint = %self.config.id(), error = %e, "Hosted API check failed");
                false
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
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::ProviderKind;
    use crate::types::ErrorCategory;
    use serde_json::{Value, json};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> GenerateOptions {
        GenerateOptions::new(128, Duration::from_secs(5))
    }

    fn adapter(url: &str, key: &str) -> HostedAdapter {
        let config = ModelConfig::new("cloud", ProviderKind::Hosted, url).with_api_key(key);
        HostedAdapter::new(config).unwrap()
    }

    async fn completions_replying(status: u16, body: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_requires_credential() {
        let config = ModelConfig::new("cloud", ProviderKind::Hosted, "https://api.example.com/v1");
        assert!(HostedAdapter::new(config).is_err());
    }

    #[tokio::test]
    async fn test_generate_chat_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"max_tokens": 128})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-x",
                "choices": [{"message": {"content": "Hi there"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 5, "completion_tokens": 2}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = adapter(&server.uri(), "sk-test")
            .generate("Hello", &RequestContext::new(), &options())
            .await
            .unwrap();
        assert_eq!(response.content(), "Hi there");
        assert_eq!(response.model(), "gpt-x");
        assert_eq!(response.provider(), "cloud");

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Hello");
    }

    #[tokio::test]
    async fn test_refusal_is_provider_error() {
        let server = completions_replying(
            200,
            json!({"choices": [{"message": {"content": null, "refusal": "cannot help"}}]}),
        )
        .await;
        let err = adapter(&server.uri(), "sk-test")
            .generate("x", &RequestContext::new(), &options())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Provider);
    }

    #[tokio::test]
    async fn test_auth_failure_is_transport() {
        let server = completions_replying(401, json!({"error": "bad key"})).await;
        let err = adapter(&server.uri(), "sk-wrong")
            .generate("x", &RequestContext::new(), &options())
            .await
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Transport);
    }
}
