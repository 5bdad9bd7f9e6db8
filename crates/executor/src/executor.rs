//! Drives one step from quote to terminal state, resumable at any pause

use crate::adapter::EcosystemAdapter;
use crate::context::{ClientCheck, ExecutorConfig, ExecutorDeps, StepFlags, TaskEnv};
use crate::error::StepExecutionError;
use crossflow_pipeline::{PipelineContext, PipelineOutcome, TaskPipeline};
use crossflow_status::{ExecutionUpdate, StatusManager};
use crossflow_types::{
    ActionType, Chain, ChainId, EngineError, ExecutionStatus, PipelineSavedState, Step, TxType,
};
use crossflow_status::ActionUpdate;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Execution policy supplied by the caller
#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    /// When false, any point needing a signature or confirmation pauses
    /// instead of prompting.
    pub allow_user_interaction: bool,

    pub allow_chain_switch: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            allow_user_interaction: true,
            allow_chain_switch: true,
        }
    }
}

/// How a step run ended. Pausing is an ordinary outcome: the step stays
/// resumable and `execute_step` picks it up where it left off.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Completed(Step),
    Paused(Step),
}

impl StepOutcome {
    pub fn step(&self) -> &Step {
        match self {
            Self::Completed(step) | Self::Paused(step) => step,
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, Self::Paused(_))
    }
}

/// Executes steps by assembling an adapter-provided task pipeline over the
/// shared status manager. All state lives in the step's execution record,
/// so the executor itself is stateless across calls.
pub struct StepExecutor {
    status: Arc<StatusManager>,
    deps: ExecutorDeps,
    adapter: Arc<dyn EcosystemAdapter>,
    chains: HashMap<ChainId, Chain>,
    config: ExecutorConfig,
    options: ExecutionOptions,
}

impl StepExecutor {
    pub fn new(
        status: Arc<StatusManager>,
        deps: ExecutorDeps,
        adapter: Arc<dyn EcosystemAdapter>,
        chains: HashMap<ChainId, Chain>,
    ) -> Self {
        Self {
            status,
            deps,
            adapter,
            chains,
            config: ExecutorConfig::default(),
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    /// Execute (or resume) the step until it completes, pauses or fails.
    ///
    /// A rejected atomic-batch upgrade is retried exactly once with the
    /// strategy forced to standard; every other failure is recorded on the
    /// execution and returned wrapped with step context.
    pub async fn execute_step(&self, step_id: &str) -> Result<StepOutcome, StepExecutionError> {
        match self.drive(step_id, false).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                let parsed = self.adapter.parse_error(error);
                if matches!(parsed, EngineError::BatchUpgradeRejected) {
                    warn!(step_id = %step_id, "batch upgrade rejected, retrying on the standard path");
                    if let Err(e) = self.discard_batch_attempt(step_id) {
                        return Err(self.fail(step_id, e));
                    }
                    return match self.drive(step_id, true).await {
                        Ok(outcome) => Ok(outcome),
                        Err(e) => Err(self.fail(step_id, self.adapter.parse_error(e))),
                    };
                }
                Err(self.fail(step_id, parsed))
            }
        }
    }

    async fn drive(&self, step_id: &str, force_standard: bool) -> Result<StepOutcome, EngineError> {
        let step = self.status.init_execution(step_id)?;

        self.chains
            .get(&step.from_chain_id)
            .ok_or(EngineError::ChainNotFound(step.from_chain_id))?;
        if step.is_bridge() {
            self.chains
                .get(&step.to_chain_id)
                .ok_or(EngineError::ChainNotFound(step.to_chain_id))?;
        }

        let base = TaskEnv {
            status: self.status.clone(),
            deps: self.deps.clone(),
            config: self.config.clone(),
            chains: self.chains.clone(),
            step_id: step_id.to_string(),
            flags: StepFlags {
                is_bridge_execution: step.is_bridge(),
                allow_user_interaction: self.options.allow_user_interaction,
                allow_chain_switch: self.options.allow_chain_switch,
                force_standard,
                ..StepFlags::default()
            },
        };
        let env = Arc::new(self.adapter.create_context(base).await?);

        // Wallet identity and chain are verified before the pipeline can
        // request any signature.
        match env.check_client(&step).await? {
            ClientCheck::Ready => {}
            ClientCheck::InteractionRequired => {
                info!(step_id = %step_id, "chain switch needs the user, pausing");
                let step = self.status.update_execution(
                    step_id,
                    ExecutionUpdate::status(ExecutionStatus::ActionRequired),
                )?;
                return Ok(StepOutcome::Paused(step));
            }
        }

        let pipeline = TaskPipeline::new(self.adapter.build_tasks(&env, &step));
        let saved = step
            .execution
            .as_ref()
            .and_then(|e| e.pipeline_saved_state.clone());
        let outcome = match saved {
            Some(saved) => pipeline.resume(&saved, PipelineContext::default()).await?,
            None => pipeline.run(PipelineContext::default()).await?,
        };

        match outcome {
            PipelineOutcome::Completed { .. } => {
                let step = self.status.complete_execution(step_id)?;
                info!(step_id = %step_id, "step execution completed");
                Ok(StepOutcome::Completed(step))
            }
            PipelineOutcome::Paused {
                paused_at_task,
                context,
            } => {
                let saved = PipelineSavedState {
                    paused_at_task,
                    pipeline_context: context.into_map(),
                };
                let step = self.status.save_pipeline_state(step_id, saved)?;
                Ok(StepOutcome::Paused(step))
            }
        }
    }

    /// Execute the route's steps strictly in order, stopping at the first
    /// paused step. Returns one outcome per step reached; calling again
    /// resumes the route, since completed steps skip their work.
    pub async fn execute_route(&self) -> Result<Vec<StepOutcome>, StepExecutionError> {
        let route = self.status.route();
        let mut outcomes = Vec::with_capacity(route.steps.len());
        for step in &route.steps {
            let outcome = self.execute_step(&step.id).await?;
            let paused = outcome.is_paused();
            outcomes.push(outcome);
            if paused {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Drop everything a failed batch attempt left behind so the standard
    /// retry starts from a clean action.
    fn discard_batch_attempt(&self, step_id: &str) -> Result<(), EngineError> {
        self.status.clear_pipeline_state(step_id)?;
        let step = self.status.step(step_id)?;
        let action_type = if step.is_bridge() {
            ActionType::CrossChain
        } else {
            ActionType::Swap
        };
        let stale = step
            .execution
            .as_ref()
            .and_then(|e| e.action(action_type))
            .is_some();
        if stale {
            self.status.update_action(
                step_id,
                action_type,
                ActionUpdate::reset().with_tx_type(TxType::Standard),
            )?;
        }
        Ok(())
    }

    fn fail(&self, step_id: &str, error: EngineError) -> StepExecutionError {
        let action = self
            .status
            .step(step_id)
            .ok()
            .and_then(|s| s.execution)
            .and_then(|e| e.last_active_action().map(|a| a.action_type));
        if let Err(record_err) = self.status.fail_execution(step_id, &error, action) {
            warn!(step_id = %step_id, error = %record_err, "could not record execution failure");
        }
        StepExecutionError {
            step_id: step_id.to_string(),
            action,
            source: error,
        }
    }
}
