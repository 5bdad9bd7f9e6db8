pub mod context;
pub mod pipeline;
pub mod task;

pub use context::{ContextPatch, PipelineContext};
pub use pipeline::{PipelineOutcome, TaskPipeline};
pub use task::{Task, TaskOutcome, TaskStatus};
