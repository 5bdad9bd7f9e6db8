use crate::context::TaskEnv;
use crate::tasks::{ensure_ready, keys, pause_for_interaction};
use async_trait::async_trait;
use crossflow_confirm::{race, race_first_success};
use crossflow_pipeline::{ContextPatch, PipelineContext, Task, TaskOutcome};
use crossflow_status::{ActionUpdate, ExecutionUpdate};
use crossflow_types::{
    ActionType, EngineError, ExecutionStatus, Substatus, TransactionRequest, TxType,
};
use std::sync::Arc;
use tracing::info;

use crate::interfaces::BatchStatus;

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

/// Refresh the transaction request and decide whether an approval call must
/// fold into the batch. No standalone approval transaction is ever sent on
/// this path.
pub struct PrepareBatchTask {
    env: Arc<TaskEnv>,
}

impl PrepareBatchTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for PrepareBatchTask {
    fn id(&self) -> &'static str {
        "prepare_batch"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        let step = self.env.step()?;
        let action_type = self.env.primary_action_type(&step);
        let submitted = step
            .execution
            .as_ref()
            .and_then(|e| e.action(action_type))
            .map(|a| a.task_id.is_some() || a.status == ExecutionStatus::Done)
            .unwrap_or(false);
        Ok(!submitted)
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let mut step = env.step()?;
        let action_type = env.primary_action_type(&step);

        if step.transaction_request.is_none() {
            let refreshed = env.deps.quotes.refresh_step_transaction(&step).await?;
            env.deps.quotes.compare_steps(&step, &refreshed)?;
            step = env.status.replace_step(refreshed)?;
        }

        env.status.find_or_create_action(&env.step_id, action_type)?;
        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::default().with_tx_type(TxType::Batched),
        )?;

        let mut patch = ContextPatch::new();
        if !env.flags.is_from_native && step.approval_address.is_some() {
            let spender = step.approval_address.clone().unwrap_or_default();
            let endpoints = env.endpoints(step.from_chain_id)?;
            let chain_id = step.from_chain_id;
            let token = step.from_token.address.clone();
            let owner = step.from_address.clone();
            let allowance = race_first_success(&endpoints, |endpoint| {
                let token = token.clone();
                let owner = owner.clone();
                let spender = spender.clone();
                async move {
                    endpoint
                        .get_allowance(chain_id, &token, &owner, &spender)
                        .await
                }
            })
            .await?;
            patch = patch
                .set(keys::ALLOWANCE_OK, allowance >= step.from_amount)
                .set(keys::CURRENT_ALLOWANCE, allowance.to_string());
        } else {
            patch = patch.set(keys::ALLOWANCE_OK, true);
        }

        Ok(TaskOutcome::completed_with(patch))
    }
}

/// Submit the approval (when needed) and the main call as one atomic batch.
/// The wallet returns a bundle id, recorded as the action's task id.
pub struct SendBatchTask {
    env: Arc<TaskEnv>,
}

impl SendBatchTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for SendBatchTask {
    fn id(&self) -> &'static str {
        "send_batch"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(!primary_action_done(&self.env)?)
    }

    async fn run(&self, context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let action_type = env.primary_action_type(&step);

        let (_, action) = env.status.find_or_create_action(&env.step_id, action_type)?;
        if let Some(batch_id) = action.task_id {
            return Ok(TaskOutcome::completed_with(
                ContextPatch::new().set(keys::BATCH_ID, batch_id),
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

        let mut calls: Vec<TransactionRequest> = Vec::new();
        let allowance_ok = context.get::<bool>(keys::ALLOWANCE_OK).unwrap_or(true);
        if !allowance_ok {
            if let Some(spender) = &step.approval_address {
                calls.push(env.deps.tx_builder.build_approval(
                    &step.from_token,
                    &step.from_address,
                    spender,
                    step.from_amount,
                )?);
            }
        }
        calls.push(request);

        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::status(ExecutionStatus::ActionRequired),
        )?;
        let batch_id = env.deps.wallet.send_batch(&calls).await?;
        info!(step_id = %env.step_id, batch_id = %batch_id, calls = calls.len(), "atomic batch sent");
        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::status(ExecutionStatus::Pending)
                .with_task_id(&batch_id)
                .with_tx_type(TxType::Batched),
        )?;

        Ok(TaskOutcome::completed_with(
            ContextPatch::new().set(keys::BATCH_ID, batch_id),
        ))
    }
}

/// Poll the bundle status across endpoints until it lands in a block, then
/// backfill the real transaction hash onto the action.
pub struct WaitBatchTask {
    env: Arc<TaskEnv>,
}

impl WaitBatchTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for WaitBatchTask {
    fn id(&self) -> &'static str {
        "wait_for_batch"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(!primary_action_done(&self.env)?)
    }

    async fn run(&self, context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let action_type = env.primary_action_type(&step);

        let (_, action) = env.status.find_or_create_action(&env.step_id, action_type)?;
        let batch_id = action
            .task_id
            .or_else(|| context.get::<String>(keys::BATCH_ID))
            .ok_or_else(|| EngineError::Validation("no batch id to wait on".to_string()))?;

        let mut update = ExecutionUpdate::status(ExecutionStatus::Pending);
        if env.flags.is_bridge_execution {
            update = update.with_substatus(Substatus::WaitSourceConfirmations);
        }
        env.status.update_execution(&env.step_id, update)?;

        let endpoints = env.endpoints(step.from_chain_id)?;
        let chain_id = step.from_chain_id;
        let id = batch_id.clone();
        let tx_hash = race(&endpoints, &env.config.race, |endpoint| {
            let id = id.clone();
            async move {
                match endpoint.get_batch_status(chain_id, &id).await? {
                    BatchStatus::Pending => Ok(None),
                    BatchStatus::Confirmed { tx_hash } => Ok(Some(tx_hash)),
                    BatchStatus::Failed(reason) => Err(EngineError::TransactionFailed(reason)),
                }
            }
        })
        .await?;

        info!(step_id = %env.step_id, batch_id = %batch_id, tx_hash = %tx_hash, "batch confirmed");
        let mut done = ActionUpdate::status(ExecutionStatus::Done).with_tx_hash(&tx_hash);
        if let Some(link) = env.tx_link(chain_id, &tx_hash) {
            done = done.with_tx_link(link);
        }
        env.status.update_action(&env.step_id, action_type, done)?;

        Ok(TaskOutcome::completed_with(
            ContextPatch::new().set(keys::TX_HASH, tx_hash),
        ))
    }
}
