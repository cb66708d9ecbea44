//! Auth header construction
//!
//! The single place where outbound headers for an endpoint are built.
//! Every adapter request goes through `build_auth_headers`.

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};

use crate::adapter::{ModelConfig, ProviderKind};
use crate::types::{Result, RouteError};

/// Build the headers for a call to `config`'s endpoint.
///
/// Hosted endpoints require a credential; local and proxy endpoints send
/// one only when configured. The Authorization value is marked sensitive
/// so it never appears in debug output.
pub fn build_auth_headers(config: &ModelConfig) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    match config.credential() {
        Some(key) => {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|_| {
                RouteError::Config(format!(
                    "Credential for endpoint '{}' contains invalid header characters",
                    config.id()
                ))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        None if config.kind() == ProviderKind::Hosted => {
            return Err(RouteError::Config(format!(
                "Endpoint '{}' requires a credential but none is available",
                config.id()
            )));
        }
        None => {}
    }

    Ok(headers)
}
