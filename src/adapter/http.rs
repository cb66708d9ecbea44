//! Shared HTTP plumbing for adapters
//!
//! Status handling is uniform: exactly 200 is success, anything else is a
//! transport failure classified by `ErrorClassifier`.

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

use super::ModelConfig;
use crate::transport::build_auth_headers;
use crate::types::{ErrorClassifier, Result, RouteError};

/// Build a client honoring the endpoint's request timeout
pub(crate) fn build_client(config: &ModelConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.timeout())
        .build()
        .map_err(|e| RouteError::Config(format!("Failed to create HTTP client: {}", e)))
}

/// POST a JSON body and decode a JSON reply
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    config: &ModelConfig,
    url: &str,
    body: &B,
    timeout: Duration,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let endpoint = config.id().as_str();
    let headers = build_auth_headers(config)?;

    debug!(endpoint, url, "Sending request");

    let response = client
        .post(url)
        .headers(headers)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| ErrorClassifier::classify_reqwest(&e, endpoint))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| ErrorClassifier::classify_reqwest(&e, endpoint))?;

    if status != StatusCode::OK {
        return Err(ErrorClassifier::classify_http_status(
            status.as_u16(),
            &text,
            endpoint,
        ));
    }

    serde_json::from_str(&text)
        .map_err(|e| RouteError::transport(endpoint, format!("Malformed response body: {}", e)))
}

/// GET `url`, failing on any non-success status
pub(crate) async fn probe(
    client: &reqwest::Client,
    config: &ModelConfig,
    url: &str,
    timeout: Duration,
) -> Result<reqwest::Response> {
    let endpoint = config.id().as_str();
    let headers = build_auth_headers(config)?;

    let response = client
        .get(url)
        .headers(headers)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ErrorClassifier::classify_reqwest(&e, endpoint))?;

    if response.status().is_success() {
        Ok(response)
    } else {
        Err(ErrorClassifier::classify_http_status(
            response.status().as_u16(),
            "",
            endpoint,
        ))
    }
}

/// Lazily (re)built HTTP client.
///
/// `release` drops the pooled connections; the next request rebuilds the
/// client, so cleanup never leaves an adapter unusable.
pub(crate) struct ClientSlot {
    slot: RwLock<Option<reqwest::Client>>,
}

impl ClientSlot {
    pub(crate) fn new(config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            slot: RwLock::new(Some(build_client(config)?)),
        })
    }

    pub(crate) fn get(&self, config: &ModelConfig) -> Result<reqwest::Client> {
        if let Some(client) = self
            .slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return Ok(client.clone());
        }

        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match slot.as_ref() {
            Some(client) => Ok(client.clone()),
            None => {
                let client = build_client(config)?;
                *slot = Some(client.clone());
                Ok(client)
            }
        }
    }

    /// Drop the pooled client. Returns whether one was held.
    pub(crate) fn release(&self) -> bool {
        self.slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .is_some()
    }
}
