use crate::context::TaskEnv;
use crate::tasks::{ensure_ready, keys, pause_for_interaction, pending_with_hash};
use async_trait::async_trait;
use crossflow_pipeline::{ContextPatch, PipelineContext, Task, TaskOutcome};
use crossflow_status::{ActionUpdate, ExecutionUpdate};
use crossflow_types::{ActionType, EngineError, ExecutionStatus, Substatus};
use std::sync::Arc;
use tracing::info;

fn primary_action_done(env: &TaskEnv) -> Result<bool, EngineError> {
    let step = env.step()?;
    let action_type = env.primary_action_type(&step);
    Ok(step
        .execution
        .as_ref()
        .and_then(|e| e.action(action_type))
        .map(|a| a.status == ExecutionStatus::Done)
        .unwrap_or(false))
}

/// Refresh a missing or stale transaction request through the quote service
/// and guard against rate drift. The refreshed step replaces quote-owned
/// fields only; the execution record survives.
pub struct PrepareStandardTask {
    env: Arc<TaskEnv>,
}

impl PrepareStandardTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for PrepareStandardTask {
    fn id(&self) -> &'static str {
        "prepare_transaction"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        let step = self.env.step()?;
        let action_type = self.env.primary_action_type(&step);
        let already_sent = step
            .execution
            .as_ref()
            .and_then(|e| e.action(action_type))
            .map(|a| a.tx_hash.is_some() || a.status == ExecutionStatus::Done)
            .unwrap_or(false);
        Ok(step.transaction_request.is_none() && !already_sent)
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;

        let refreshed = env.deps.quotes.refresh_step_transaction(&step).await?;
        env.deps.quotes.compare_steps(&step, &refreshed)?;
        env.status.replace_step(refreshed)?;
        info!(step_id = %env.step_id, "transaction request refreshed");

        Ok(TaskOutcome::completed())
    }
}

/// Send the step's main transaction through the wallet. On resume with a
/// hash already recorded, falls through to the wait task.
pub struct SendStandardTask {
    env: Arc<TaskEnv>,
}

impl SendStandardTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for SendStandardTask {
    fn id(&self) -> &'static str {
        "send_transaction"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(!primary_action_done(&self.env)?)
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let action_type = env.primary_action_type(&step);

        let (_, action) = env.status.find_or_create_action(&env.step_id, action_type)?;
        if let Some(hash) = action.tx_hash {
            return Ok(TaskOutcome::completed_with(
                ContextPatch::new().set(keys::TX_HASH, hash),
            ));
        }

        if let Some(pause) =
            pause_for_interaction(env, action_type, ExecutionStatus::ActionRequired)?
        {
            return Ok(pause);
        }
        if let Some(pause) = ensure_ready(env, &step, action_type).await? {
            return Ok(pause);
        }

        let request = step.transaction_request.clone().ok_or_else(|| {
            EngineError::TransactionUnprepared("step has no transaction request".to_string())
        })?;

        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::status(ExecutionStatus::ActionRequired),
        )?;
        let hash = env.deps.wallet.send_transaction(&request).await?;
        info!(step_id = %env.step_id, tx_hash = %hash, "transaction sent");
        env.status.update_action(
            &env.step_id,
            action_type,
            pending_with_hash(env, step.from_chain_id, &hash),
        )?;

        Ok(TaskOutcome::completed_with(
            ContextPatch::new().set(keys::TX_HASH, hash),
        ))
    }
}

/// Race the receipt poll across the source chain's endpoints until the
/// transaction confirms or definitively fails.
pub struct WaitStandardTask {
    env: Arc<TaskEnv>,
}

impl WaitStandardTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for WaitStandardTask {
    fn id(&self) -> &'static str {
        "wait_for_confirmation"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(!primary_action_done(&self.env)?)
    }

    async fn run(&self, context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let action_type = env.primary_action_type(&step);

        let (_, action) = env.status.find_or_create_action(&env.step_id, action_type)?;
        let tx_hash = action
            .tx_hash
            .or_else(|| context.get::<String>(keys::TX_HASH))
            .ok_or_else(|| {
                EngineError::Validation("no transaction hash to wait on".to_string())
            })?;

        let mut update = ExecutionUpdate::status(ExecutionStatus::Pending);
        if env.flags.is_bridge_execution {
            update = update.with_substatus(Substatus::WaitSourceConfirmations);
        }
        env.status.update_execution(&env.step_id, update)?;

        let receipt = env.wait_for_receipt(step.from_chain_id, &tx_hash).await?;
        info!(step_id = %env.step_id, tx_hash = %tx_hash, block = receipt.block_number, "transaction confirmed");
        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::status(ExecutionStatus::Done),
        )?;

        Ok(TaskOutcome::completed_with(
            ContextPatch::new().set(keys::TX_HASH, tx_hash),
        ))
    }
}
