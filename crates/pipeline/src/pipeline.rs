use crate::context::PipelineContext;
use crate::task::{Task, TaskStatus};
use crossflow_types::{EngineError, PipelineSavedState};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of running a pipeline. `Paused` is the only suspension path and is
/// never raised through the error channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    Completed {
        context: PipelineContext,
    },
    Paused {
        paused_at_task: String,
        context: PipelineContext,
    },
}

impl PipelineOutcome {
    /// Durable snapshot for a paused pipeline; `None` when completed
    pub fn saved_state(&self) -> Option<PipelineSavedState> {
        match self {
            Self::Completed { .. } => None,
            Self::Paused {
                paused_at_task,
                context,
            } => Some(PipelineSavedState {
                paused_at_task: paused_at_task.clone(),
                pipeline_context: context.clone().into_map(),
            }),
        }
    }
}

/// An ordered list of tasks run strictly in sequence. The pipeline owns
/// merging task patches into the context and deciding whether to continue
/// or pause.
pub struct TaskPipeline {
    tasks: Vec<Arc<dyn Task>>,
}

impl TaskPipeline {
    pub fn new(tasks: Vec<Arc<dyn Task>>) -> Self {
        Self { tasks }
    }

    pub fn task_ids(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.id()).collect()
    }

    pub async fn run(&self, context: PipelineContext) -> Result<PipelineOutcome, EngineError> {
        self.run_from(0, context).await
    }

    /// Re-enter at the task recorded in the saved state, with the saved
    /// context restored over the caller's base context. Tasks before the
    /// pause point are never re-executed; the resumed task's `should_run`
    /// is re-evaluated.
    pub async fn resume(
        &self,
        saved: &PipelineSavedState,
        base: PipelineContext,
    ) -> Result<PipelineOutcome, EngineError> {
        let start = self
            .tasks
            .iter()
            .position(|t| t.id() == saved.paused_at_task)
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "saved state references unknown task '{}'",
                    saved.paused_at_task
                ))
            })?;

        let mut context = base;
        context.merge_map(&saved.pipeline_context);
        info!(paused_at = %saved.paused_at_task, "resuming pipeline");
        self.run_from(start, context).await
    }

    async fn run_from(
        &self,
        start: usize,
        mut context: PipelineContext,
    ) -> Result<PipelineOutcome, EngineError> {
        for task in &self.tasks[start..] {
            if !task.should_run(&context).await? {
                debug!(task = task.id(), "skipping task");
                continue;
            }

            debug!(task = task.id(), "running task");
            let outcome = task.run(&context).await?;
            context.merge(&outcome.patch);

            if outcome.status == TaskStatus::Paused {
                info!(task = task.id(), "pipeline paused");
                return Ok(PipelineOutcome::Paused {
                    paused_at_task: task.id().to_string(),
                    context,
                });
            }
        }

        Ok(PipelineOutcome::Completed { context })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextPatch;
    use crate::task::TaskOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records run order and can pause until released
    struct RecordingTask {
        task_id: &'static str,
        runs: Arc<AtomicUsize>,
        order: Arc<Mutex<Vec<&'static str>>>,
        pause_first_run: bool,
        output_key: Option<(&'static str, u64)>,
    }

    impl RecordingTask {
        fn new(task_id: &'static str, order: Arc<Mutex<Vec<&'static str>>>) -> Self {
            Self {
                task_id,
                runs: Arc::new(AtomicUsize::new(0)),
                order,
                pause_first_run: false,
                output_key: None,
            }
        }

        fn pausing(mut self) -> Self {
            self.pause_first_run = true;
            self
        }

        fn with_output(mut self, key: &'static str, value: u64) -> Self {
            self.output_key = Some((key, value));
            self
        }
    }

    #[async_trait]
    impl Task for RecordingTask {
        fn id(&self) -> &'static str {
            self.task_id
        }

        async fn should_run(&self, context: &PipelineContext) -> Result<bool, EngineError> {
            // Idempotency: a task that already wrote its output is done.
            if let Some((key, _)) = self.output_key {
                return Ok(!context.contains(key));
            }
            Ok(true)
        }

        async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
            let run = self.runs.fetch_add(1, Ordering::SeqCst);
            self.order.lock().unwrap().push(self.task_id);

            if self.pause_first_run && run == 0 {
                return Ok(TaskOutcome::paused());
            }
            let mut patch = ContextPatch::new();
            if let Some((key, value)) = self.output_key {
                patch = patch.set(key, value);
            }
            Ok(TaskOutcome::completed_with(patch))
        }
    }

    #[tokio::test]
    async fn test_runs_tasks_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = TaskPipeline::new(vec![
            Arc::new(RecordingTask::new("a", order.clone())),
            Arc::new(RecordingTask::new("b", order.clone())),
            Arc::new(RecordingTask::new("c", order.clone())),
        ]);

        let outcome = pipeline.run(PipelineContext::default()).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Completed { .. }));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_pause_stops_iteration_and_snapshots_context() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = TaskPipeline::new(vec![
            Arc::new(RecordingTask::new("a", order.clone()).with_output("a_done", 1)),
            Arc::new(RecordingTask::new("b", order.clone()).pausing()),
            Arc::new(RecordingTask::new("c", order.clone())),
        ]);

        let outcome = pipeline.run(PipelineContext::default()).await.unwrap();
        let saved = outcome.saved_state().expect("paused outcome saves state");
        assert_eq!(saved.paused_at_task, "b");
        assert!(saved.pipeline_context.contains_key("a_done"));
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"], "c must not run");
    }

    #[tokio::test]
    async fn test_resume_skips_tasks_before_pause_point() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let task_a = Arc::new(RecordingTask::new("a", order.clone()).with_output("a_done", 1));
        let task_b = Arc::new(RecordingTask::new("b", order.clone()).pausing());
        let task_c = Arc::new(RecordingTask::new("c", order.clone()).with_output("c_done", 3));
        let pipeline = TaskPipeline::new(vec![task_a.clone(), task_b.clone(), task_c.clone()]);

        let outcome = pipeline.run(PipelineContext::default()).await.unwrap();
        let saved = outcome.saved_state().unwrap();

        let resumed = pipeline
            .resume(&saved, PipelineContext::default())
            .await
            .unwrap();
        assert!(matches!(resumed, PipelineOutcome::Completed { .. }));

        // a ran once (before pause), b ran twice (pause + resume), c once
        assert_eq!(task_a.runs.load(Ordering::SeqCst), 1);
        assert_eq!(task_b.runs.load(Ordering::SeqCst), 2);
        assert_eq!(task_c.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resume_with_unknown_task_fails() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let pipeline = TaskPipeline::new(vec![Arc::new(RecordingTask::new("a", order))]);

        let saved = PipelineSavedState {
            paused_at_task: "ghost".to_string(),
            pipeline_context: serde_json::Map::new(),
        };
        let result = pipeline.resume(&saved, PipelineContext::default()).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_resume_reevaluates_should_run_of_paused_task() {
        let order = Arc::new(Mutex::new(Vec::new()));
        // Task "b" pauses, but on resume its output key is already present in
        // the saved context, so should_run skips it.
        let task_b = Arc::new(
            RecordingTask::new("b", order.clone())
                .pausing()
                .with_output("b_done", 2),
        );
        let pipeline = TaskPipeline::new(vec![task_b.clone()]);

        let outcome = pipeline.run(PipelineContext::default()).await.unwrap();
        let mut saved = outcome.saved_state().unwrap();
        saved
            .pipeline_context
            .insert("b_done".to_string(), serde_json::json!(2));

        let resumed = pipeline
            .resume(&saved, PipelineContext::default())
            .await
            .unwrap();
        assert!(matches!(resumed, PipelineOutcome::Completed { .. }));
        assert_eq!(task_b.runs.load(Ordering::SeqCst), 1, "b skipped on resume");
    }

    #[tokio::test]
    async fn test_errors_propagate_not_pause() {
        struct FailingTask;

        #[async_trait]
        impl Task for FailingTask {
            fn id(&self) -> &'static str {
                "fail"
            }
            async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
                Err(EngineError::Rpc("connection refused".to_string()))
            }
        }

        let pipeline = TaskPipeline::new(vec![Arc::new(FailingTask)]);
        let result = pipeline.run(PipelineContext::default()).await;
        assert!(matches!(result, Err(EngineError::Rpc(_))));
    }
}
