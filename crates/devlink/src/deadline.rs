use std::future::Future;
use std::time::Duration;

/// Runs `operation`, abandoning it once `limit` elapses.
pub(crate) async fn bounded<F, T, E>(
    limit: Duration,
    operation: F,
    on_elapsed: impl FnOnce() -> E,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(on_elapsed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_operations_report_the_fallback_error() {
        let result: Result<(), &str> = bounded(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
            || "timed out",
        )
        .await;

        assert_eq!(result, Err("timed out"));
    }

    #[tokio::test]
    async fn completed_operations_pass_through() {
        let result: Result<u8, &str> =
            bounded(Duration::from_secs(1), async { Ok(7) }, || "timed out").await;
        assert_eq!(result, Ok(7));
    }
}
