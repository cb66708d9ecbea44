//! CLI Common Utilities
//!
//! Shared setup for command handlers: configuration loading, service
//! construction and cancellation-safe execution.

use std::future::Future;
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use crate::adapter::RequestContext;
use crate::config::{Config, ConfigLoader};
use crate::service::RouterService;
use crate::types::{Result, RouteError};

/// Command execution context
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// Service built from `config`
    pub service: RouterService,
}

impl CommandContext {
    /// Load configuration (optionally from an explicit file) and build the service
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = ConfigLoader::load_with(config_path)?;
        let service = RouterService::from_config(&config)?;
        Ok(Self { config, service })
    }

    /// Run `work`, then shut the service down. Ctrl-C abandons `work` but
    /// cleanup still runs.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let outcome = tokio::select! {
            result = work => result,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
                Err(RouteError::Io(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "interrupted",
                )))
            }
        };
        self.service.shutdown().await;
        outcome
    }
}

/// Parse `key=value` pairs into a request context. Values that parse as
/// JSON keep their type; anything else is a string.
pub fn parse_context(pairs: &[String]) -> Result<RequestContext> {
    let mut context = RequestContext::new();
    for pair in pairs {
        let (key, raw) = pair.split_once('=').ok_or_else(|| {
            RouteError::InvalidRequest(format!("context entry '{}' is not key=value", pair))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(RouteError::InvalidRequest(format!(
                "context entry '{}' has an empty key",
                pair
            )));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        context.insert(key.to_string(), value);
    }
    Ok(context)
}

/// Whether `format` asks for JSON output
pub fn wants_json(format: &str) -> bool {
    format.eq_ignore_ascii_case("json")
}
