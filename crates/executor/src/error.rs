use crossflow_types::{ActionType, EngineError};
use thiserror::Error;

/// Failure of a step execution, wrapped with the step and the action that
/// was in flight when the underlying error surfaced.
#[derive(Debug, Error)]
#[error("step {step_id} execution failed: {source}")]
pub struct StepExecutionError {
    pub step_id: String,

    /// Action being worked on when the failure happened, when attributable
    pub action: Option<ActionType>,

    #[source]
    pub source: EngineError,
}

impl StepExecutionError {
    pub fn engine_error(&self) -> &EngineError {
        &self.source
    }
}
