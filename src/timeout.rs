//! Deadline helpers
//!
//! Every outbound endpoint call is bounded by a per-request deadline.
//! Expiry is reported as `RouteError::Timeout`, which the transport treats
//! exactly like any other transport failure.

use std::future::Future;
use std::time::Duration;

use crate::types::{Result, RouteError};

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the
/// specified duration. The inner future is dropped on expiry, which cancels
/// the underlying request.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(RouteError::timeout(operation_name, timeout)),
    }
}

/// Execute an async operation with a timeout, wrapping a non-Result output
pub async fn with_timeout_map<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => Ok(result),
        Err(_) => Err(RouteError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, RouteError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, RouteError>(42)
            },
            "slow operation",
        )
        .await;
        assert!(matches!(result.unwrap_err(), RouteError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_with_timeout_map_expires() {
        let result = with_timeout_map(
            Duration::from_millis(10),
            tokio::time::sleep(Duration::from_secs(1)),
            "probe",
        )
        .await;
        assert!(result.is_err());
    }
}
