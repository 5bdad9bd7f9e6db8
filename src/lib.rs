//! Crossflow: a resumable cross-chain route execution engine.
//!
//! A route from a quote service is executed step by step. Each step runs
//! through an ordered task pipeline (signatures, allowances, submission,
//! confirmation) that can pause whenever user interaction is required and
//! resume later without repeating on-chain work. All progress lands in the
//! route's execution records via the status manager, so a crashed or closed
//! session picks up exactly where it left off.

pub use crossflow_config as config;
pub use crossflow_confirm as confirm;
pub use crossflow_executor as executor;
pub use crossflow_pipeline as pipeline;
pub use crossflow_status as status;
pub use crossflow_types as types;

pub use crossflow_config::{ConfigLoader, EngineConfig};
pub use crossflow_executor::{
    EcosystemAdapter, EvmAdapter, ExecutionOptions, ExecutorConfig, ExecutorDeps,
    StepExecutionError, StepExecutor, StepOutcome,
};
pub use crossflow_status::StatusManager;
pub use crossflow_types::{EngineError, ExecutionStatus, Route, Step};

use futures::stream::{self, StreamExt};

/// Drive several routes at once, one executor per route. Steps within a
/// route stay strictly sequential; `route_concurrency` caps how many routes
/// are in flight (see `ExecutionSettings::route_concurrency`). Results come
/// back in executor order.
pub async fn execute_routes(
    executors: Vec<StepExecutor>,
    route_concurrency: usize,
) -> Vec<Result<Vec<StepOutcome>, StepExecutionError>> {
    stream::iter(executors)
        .map(|executor| async move { executor.execute_route().await })
        .buffered(route_concurrency.max(1))
        .collect()
        .await
}
