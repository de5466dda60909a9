//! Per-call deadline for external calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, OpContext, Result};

/// Run `fut` with `limit` as its deadline.
///
/// On expiry the future is dropped, which cancels the in-flight request.
pub(crate) async fn bounded<T, F>(limit: Duration, ctx: &OpContext, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(op = ctx.op, session = %ctx.session_id, batch = ctx.batch, "External call timed out");
            Err(Error::Timeout {
                ctx: ctx.clone(),
                duration_ms: limit.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passes_through_result() {
        let ctx = OpContext::new("embed", "s-1", 1);
        let value = bounded(Duration::from_secs(1), &ctx, async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_expiry() {
        let ctx = OpContext::new("embed", "s-1", 1);
        let err = bounded(Duration::from_millis(50), &ctx, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("50ms"));
    }
}
