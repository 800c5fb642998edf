//! Runs a blocking unit of work with a wall-clock deadline.
//!
//! Realized as `tokio::task::spawn_blocking` fronted by `tokio::time::timeout`,
//! per the "worker pool fronted by a future with timed wait" option in the
//! design notes. Cancellation is best-effort: a blocking task already running
//! on the pool keeps running to completion even after its deadline future has
//! elapsed, because `spawn_blocking` handles are not abortable.

use std::time::Duration;

use crate::error::{Result, ToolError};

/// Runs `op` on a dedicated blocking thread, bounded by `timeout`.
///
/// - If `op` completes in time, its result (success or failure) is returned
///   as-is.
/// - If `op` is still running when `timeout` elapses: returns `default` if
///   one was supplied, otherwise a [`ToolError::Timeout`] naming `op_name`.
pub async fn execute_bounded<F, T>(
    op_name: &str,
    timeout: Duration,
    default: Option<T>,
    op: F,
) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(op)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(ToolError::SpawnFailed(join_err.to_string())),
        Err(_elapsed) => match default {
            Some(value) => {
                tracing::warn!(op = op_name, secs = timeout.as_secs(), "bounded op timed out, returning default");
                Ok(value)
            }
            None => Err(ToolError::Timeout {
                op: op_name.to_string(),
                secs: timeout.as_secs(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[tokio::test]
    async fn returns_value_when_within_deadline() {
        let result = execute_bounded("quick", Duration::from_secs(1), None, || Ok(42)).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn propagates_failure_from_the_unit() {
        let result: Result<i32> = execute_bounded("failing", Duration::from_secs(1), None, || {
            Err(ToolError::InvalidArgument("bad".to_string()))
        })
        .await;
        assert!(matches!(result, Err(ToolError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn returns_default_on_timeout_when_provided() {
        let result = execute_bounded("slow", Duration::from_millis(30), Some(7), || {
            sleep(Duration::from_millis(500));
            Ok(1)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn returns_timeout_error_when_no_default() {
        let result: Result<i32> = execute_bounded("slow", Duration::from_millis(30), None, || {
            sleep(Duration::from_millis(500));
            Ok(1)
        })
        .await;
        match result {
            Err(ToolError::Timeout { op, .. }) => assert_eq!(op, "slow"),
            other => panic!("expected timeout error, got {other:?}"),
        }
    }
}
