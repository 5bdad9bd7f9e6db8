use crate::context::{ContextPatch, PipelineContext};
use async_trait::async_trait;
use crossflow_types::EngineError;

/// How a task run ended. Pausing is a normal return value, never an error:
/// the error channel is reserved for genuine failures. Skipping is not an
/// outcome; the pipeline decides it up front via `should_run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Completed,
    Paused,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub patch: ContextPatch,
}

impl TaskOutcome {
    pub fn completed() -> Self {
        Self {
            status: TaskStatus::Completed,
            patch: ContextPatch::new(),
        }
    }

    pub fn completed_with(patch: ContextPatch) -> Self {
        Self {
            status: TaskStatus::Completed,
            patch,
        }
    }

    pub fn paused() -> Self {
        Self {
            status: TaskStatus::Paused,
            patch: ContextPatch::new(),
        }
    }
}

/// One idempotent unit of work in a step pipeline.
///
/// Tasks must be safe to re-run after a resume: `should_run` and the run
/// body inspect prior state (context keys, action fields such as an existing
/// tx hash) instead of assuming a fresh start.
#[async_trait]
pub trait Task: Send + Sync {
    /// Stable identifier, recorded in saved state to resume at this task
    fn id(&self) -> &'static str;

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(true)
    }

    async fn run(&self, context: &PipelineContext) -> Result<TaskOutcome, EngineError>;
}
