use std::future::Future;
use std::time::Duration;
use tracing::error;

/// Asynchronous teardown implemented by engine components.
pub trait AsyncShutdown {
    type Result;
    fn shutdown(&mut self) -> impl Future<Output = Self::Result>;
}

/// Hard-deadline watchdog: run `operation`, forcibly abandoning it (and logging) if
/// it exceeds `deadline`.
pub async fn with_watchdog<F>(name: &str, deadline: Duration, operation: F) -> Option<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(output) => Some(output),
        Err(_) => {
            error!(%name, ?deadline, "shutdown watchdog expired - abandoning laggard");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watchdog_passes_fast_operations() {
        let result = with_watchdog("fast", Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn test_watchdog_abandons_laggards() {
        let result = with_watchdog("slow", Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await;
        assert!(result.is_none());
    }
}
