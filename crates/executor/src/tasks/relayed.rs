use crate::context::TaskEnv;
use crate::interfaces::{RelayedTaskStatus, RelayerService};
use crate::tasks::{ensure_ready, keys, pause_for_interaction};
use async_trait::async_trait;
use crossflow_pipeline::{ContextPatch, PipelineContext, Task, TaskOutcome};
use crossflow_status::{ActionUpdate, ExecutionUpdate};
use crossflow_types::{
    ActionType, EngineError, ExecutionStatus, SignedTypedData, Substatus, TxType,
};
use std::sync::Arc;
use tracing::{info, warn};

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

fn relayer(env: &TaskEnv) -> Result<Arc<dyn RelayerService>, EngineError> {
    env.deps
        .relayer
        .clone()
        .ok_or_else(|| EngineError::Validation("no relayer service configured".to_string()))
}

/// Sign the step's order so a relayer can execute it gaslessly. The
/// signature is kept on the action and reused on resume.
pub struct PrepareRelayedTask {
    env: Arc<TaskEnv>,
}

impl PrepareRelayedTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for PrepareRelayedTask {
    fn id(&self) -> &'static str {
        "prepare_relayed"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        let step = self.env.step()?;
        let action_type = self.env.primary_action_type(&step);
        let prepared = step
            .execution
            .as_ref()
            .and_then(|e| e.action(action_type))
            .map(|a| a.signed_typed_data.is_some() || a.status == ExecutionStatus::Done)
            .unwrap_or(false);
        Ok(!prepared)
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let action_type = env.primary_action_type(&step);

        env.status.find_or_create_action(&env.step_id, action_type)?;
        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::default().with_tx_type(TxType::Relayed),
        )?;

        let envelope = step.typed_data.first().cloned().ok_or_else(|| {
            EngineError::TransactionUnprepared(
                "relayed execution requires typed data to sign".to_string(),
            )
        })?;

        if let Some(pause) =
            pause_for_interaction(env, action_type, ExecutionStatus::MessageRequired)?
        {
            return Ok(pause);
        }
        if let Some(pause) = ensure_ready(env, &step, action_type).await? {
            return Ok(pause);
        }

        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::status(ExecutionStatus::MessageRequired),
        )?;
        let signature = env.collect_signature(&envelope).await?;
        info!(step_id = %env.step_id, "relayed order signed");

        let signed = SignedTypedData {
            envelope,
            signature,
            spender: step
                .approval_address
                .clone()
                .unwrap_or_else(|| step.to_address.clone()),
            amount: step.from_amount,
            chain_id: step.from_chain_id,
            valid_until: None,
        };
        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::default().with_signed_typed_data(signed),
        )?;

        Ok(TaskOutcome::completed())
    }
}

/// Hand the signed order to the relayer; its task id stands in for a hash
/// until execution.
pub struct SendRelayedTask {
    env: Arc<TaskEnv>,
}

impl SendRelayedTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for SendRelayedTask {
    fn id(&self) -> &'static str {
        "submit_relayed"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(!primary_action_done(&self.env)?)
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let action_type = env.primary_action_type(&step);

        let (_, action) = env.status.find_or_create_action(&env.step_id, action_type)?;
        if let Some(task_id) = action.task_id {
            return Ok(TaskOutcome::completed_with(
                ContextPatch::new().set(keys::RELAYER_TASK_ID, task_id),
            ));
        }

        let signed = action.signed_typed_data.ok_or_else(|| {
            EngineError::TransactionUnprepared(
                "relayed execution requires a signed order".to_string(),
            )
        })?;

        let task_id = relayer(env)?.submit(step.from_chain_id, &signed).await?;
        info!(step_id = %env.step_id, task_id = %task_id, "order submitted to relayer");
        env.status.update_action(
            &env.step_id,
            action_type,
            ActionUpdate::status(ExecutionStatus::Pending).with_task_id(&task_id),
        )?;

        Ok(TaskOutcome::completed_with(
            ContextPatch::new().set(keys::RELAYER_TASK_ID, task_id),
        ))
    }
}

/// Poll the relayer task until it executes, fails or is cancelled.
pub struct WaitRelayedTask {
    env: Arc<TaskEnv>,
}

impl WaitRelayedTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for WaitRelayedTask {
    fn id(&self) -> &'static str {
        "wait_for_relayed"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(!primary_action_done(&self.env)?)
    }

    async fn run(&self, context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let action_type = env.primary_action_type(&step);

        let (_, action) = env.status.find_or_create_action(&env.step_id, action_type)?;
        let task_id = action
            .task_id
            .or_else(|| context.get::<String>(keys::RELAYER_TASK_ID))
            .ok_or_else(|| EngineError::Validation("no relayer task to wait on".to_string()))?;

        let mut update = ExecutionUpdate::status(ExecutionStatus::Pending);
        if env.flags.is_bridge_execution {
            update = update.with_substatus(Substatus::WaitSourceConfirmations);
        }
        env.status.update_execution(&env.step_id, update)?;

        let relayer = relayer(env)?;
        let started = tokio::time::Instant::now();
        loop {
            if started.elapsed() >= env.config.relayed_timeout {
                return Err(EngineError::TransactionExpired(format!(
                    "relayer task {task_id} not executed within {:?}",
                    env.config.relayed_timeout
                )));
            }

            match relayer.task_status(&task_id).await {
                Ok(RelayedTaskStatus::Executed { tx_hash }) => {
                    info!(step_id = %env.step_id, tx_hash = %tx_hash, "relayed order executed");
                    let mut done =
                        ActionUpdate::status(ExecutionStatus::Done).with_tx_hash(&tx_hash);
                    if let Some(link) = env.tx_link(step.from_chain_id, &tx_hash) {
                        done = done.with_tx_link(link);
                    }
                    env.status.update_action(&env.step_id, action_type, done)?;
                    return Ok(TaskOutcome::completed_with(
                        ContextPatch::new().set(keys::TX_HASH, tx_hash),
                    ));
                }
                Ok(RelayedTaskStatus::Failed(reason)) => {
                    return Err(EngineError::TransactionFailed(reason));
                }
                Ok(RelayedTaskStatus::Cancelled(reason)) => {
                    return Err(EngineError::TransactionCanceled(reason));
                }
                Ok(RelayedTaskStatus::Pending) => {}
                Err(e) if !e.is_definitive() => {
                    warn!(step_id = %env.step_id, error = %e, "relayer status poll failed, retrying");
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(env.config.relayed_poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{harness, make_step};
    use crossflow_pipeline::TaskStatus;
    use crossflow_types::TypedDataEnvelope;

    fn relayed_step() -> crossflow_types::Step {
        let mut step = make_step("step-1", 1, 1);
        step.estimate.gasless = true;
        step.typed_data = vec![TypedDataEnvelope {
            domain: serde_json::json!({"name": "Order"}),
            types: serde_json::json!({}),
            primary_type: "Order".to_string(),
            message: serde_json::json!({}),
        }];
        step
    }

    #[tokio::test(start_paused = true)]
    async fn test_relayed_path_signs_submits_and_confirms() {
        let h = harness(relayed_step());
        h.relayer.set_execute_after(2);

        let mut ctx = PipelineContext::default();
        for task in [
            Box::new(PrepareRelayedTask::new(h.env.clone())) as Box<dyn Task>,
            Box::new(SendRelayedTask::new(h.env.clone())),
            Box::new(WaitRelayedTask::new(h.env.clone())),
        ] {
            let outcome = task.run(&ctx).await.unwrap();
            assert_eq!(outcome.status, TaskStatus::Completed);
            ctx.merge(&outcome.patch);
        }

        let step = h.env.step().unwrap();
        let action = step
            .execution
            .unwrap()
            .action(ActionType::Swap)
            .cloned()
            .unwrap();
        assert_eq!(action.status, ExecutionStatus::Done);
        assert_eq!(action.tx_type, TxType::Relayed);
        assert!(action.task_id.is_some());
        assert!(action.tx_hash.is_some());
        assert_eq!(h.wallet.signature_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_relayer_task_is_definitive() {
        let h = harness(relayed_step());
        h.relayer.set_cancelled(true);

        let mut ctx = PipelineContext::default();
        ctx.merge(
            &PrepareRelayedTask::new(h.env.clone())
                .run(&ctx)
                .await
                .unwrap()
                .patch,
        );
        ctx.merge(
            &SendRelayedTask::new(h.env.clone())
                .run(&ctx)
                .await
                .unwrap()
                .patch,
        );

        let result = WaitRelayedTask::new(h.env.clone()).run(&ctx).await;
        assert!(matches!(result, Err(EngineError::TransactionCanceled(_))));
    }

    #[tokio::test]
    async fn test_prepare_pauses_when_signing_disallowed() {
        let mut h = harness(relayed_step());
        h.set_interaction(false);

        let outcome = PrepareRelayedTask::new(h.env.clone())
            .run(&PipelineContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.status, TaskStatus::Paused);
        assert_eq!(h.wallet.signature_count(), 0);
    }
}
