use crossflow_types::EngineError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Tuning for a confirmation race
#[derive(Debug, Clone)]
pub struct RaceConfig {
    /// Interval between submit/poll cycles on each worker
    pub poll_interval: Duration,

    /// Shared deadline across all workers
    pub timeout: Duration,

    /// Consecutive failures after which a single worker retires
    pub max_endpoint_failures: u32,
}

impl Default for RaceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(600),
            max_endpoint_failures: 10,
        }
    }
}

/// Race a request/poll loop across redundant endpoints.
///
/// One worker per endpoint runs `probe` on a fixed interval. `Ok(Some(_))`
/// is a terminal result and wins the race; `Ok(None)` means "not yet";
/// errors are swallowed and retried on that worker unless definitive
/// (`EngineError::is_definitive`) or the worker has failed too many times in
/// a row. Losing workers are cancelled by drop; their in-flight futures are
/// discarded. The overall call fails only when every worker has failed or
/// the shared deadline elapses.
///
/// Correctness depends only on at least one endpoint being honest and
/// reachable before the deadline.
pub async fn race<E, T, F, Fut>(
    endpoints: &[E],
    config: &RaceConfig,
    probe: F,
) -> Result<T, EngineError>
where
    E: Clone,
    F: Fn(E) -> Fut,
    Fut: Future<Output = Result<Option<T>, EngineError>>,
{
    if endpoints.is_empty() {
        return Err(EngineError::Validation(
            "confirmation race requires at least one endpoint".to_string(),
        ));
    }

    let mut workers: FuturesUnordered<_> = endpoints
        .iter()
        .cloned()
        .map(|endpoint| worker(endpoint, config, &probe))
        .collect();

    let deadline = tokio::time::sleep(config.timeout);
    tokio::pin!(deadline);

    let mut last_error = None;
    loop {
        tokio::select! {
            result = workers.next() => match result {
                Some(Ok(value)) => return Ok(value),
                Some(Err(e)) if e.is_definitive() => return Err(e),
                Some(Err(e)) => {
                    warn!(error = %e, "confirmation worker retired");
                    last_error = Some(e);
                }
                None => {
                    return Err(last_error.unwrap_or_else(|| {
                        EngineError::TransactionExpired("all endpoints failed".to_string())
                    }))
                }
            },
            _ = &mut deadline => {
                return Err(EngineError::TransactionExpired(format!(
                    "no confirmation within {:?}",
                    config.timeout
                )))
            }
        }
    }
}

async fn worker<E, T, F, Fut>(endpoint: E, config: &RaceConfig, probe: &F) -> Result<T, EngineError>
where
    E: Clone,
    F: Fn(E) -> Fut,
    Fut: Future<Output = Result<Option<T>, EngineError>>,
{
    let mut consecutive_failures = 0u32;
    loop {
        match probe(endpoint.clone()).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => consecutive_failures = 0,
            Err(e) if e.is_definitive() => return Err(e),
            Err(e) => {
                consecutive_failures += 1;
                debug!(error = %e, failures = consecutive_failures, "endpoint probe failed");
                if consecutive_failures >= config.max_endpoint_failures {
                    return Err(e);
                }
            }
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}

/// One-shot variant for redundant reads (balances, allowances): issue the
/// operation against every endpoint concurrently, take the first success,
/// discard the rest. Fails only when every endpoint fails.
pub async fn race_first_success<E, T, F, Fut>(endpoints: &[E], op: F) -> Result<T, EngineError>
where
    E: Clone,
    F: Fn(E) -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    if endpoints.is_empty() {
        return Err(EngineError::Validation(
            "read race requires at least one endpoint".to_string(),
        ));
    }

    let mut ops: FuturesUnordered<_> = endpoints.iter().cloned().map(op).collect();

    let mut last_error = None;
    while let Some(result) = ops.next().await {
        match result {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(error = %e, "endpoint read failed");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.expect("at least one endpoint ran"))
}
