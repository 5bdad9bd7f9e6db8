use crossflow_types::EngineError;
use std::future::Future;
use tracing::warn;

/// Degrade a failed read to a default value instead of aborting the whole
/// fan-out. Used with `tokio::join!` when fetching independent values
/// (balance, allowance, token accounts) where a single unavailable endpoint
/// must not fail the read.
pub async fn or_default<T, Fut>(operation: Fut, default: T) -> T
where
    Fut: Future<Output = Result<T, EngineError>>,
{
    match operation.await {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "parallel read failed, degrading to default");
            default
        }
    }
}
