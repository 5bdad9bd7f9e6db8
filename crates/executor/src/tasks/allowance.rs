use crate::context::TaskEnv;
use crate::tasks::{ensure_ready, keys, pause_for_interaction, pending_with_hash};
use async_trait::async_trait;
use crossflow_confirm::race_first_success;
use crossflow_pipeline::{ContextPatch, PipelineContext, Task, TaskOutcome};
use crossflow_status::ActionUpdate;
use crossflow_types::{ActionType, EngineError, ExecutionStatus, Step};
use std::sync::Arc;
use tracing::{debug, info};

async fn read_allowance(env: &TaskEnv, step: &Step, spender: &str) -> Result<u128, EngineError> {
    let endpoints = env.endpoints(step.from_chain_id)?;
    let chain_id = step.from_chain_id;
    let token = step.from_token.address.clone();
    let owner = step.from_address.clone();
    let spender = spender.to_string();
    race_first_success(&endpoints, |endpoint| {
        let token = token.clone();
        let owner = owner.clone();
        let spender = spender.clone();
        async move {
            endpoint
                .get_allowance(chain_id, &token, &owner, &spender)
                .await
        }
    })
    .await
}

/// Read the current allowance and decide whether an approval (and a prior
/// reset to zero) is needed. A sufficient allowance finishes the
/// `TokenAllowance` action with no transaction at all.
pub struct CheckAllowanceTask {
    env: Arc<TaskEnv>,
}

impl CheckAllowanceTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for CheckAllowanceTask {
    fn id(&self) -> &'static str {
        "check_allowance"
    }

    async fn should_run(&self, context: &PipelineContext) -> Result<bool, EngineError> {
        if self.env.flags.is_from_native
            || context.contains(keys::ALLOWANCE_OK)
            || context.contains(keys::PERMIT_SIGNATURE)
        {
            return Ok(false);
        }
        Ok(self.env.step()?.approval_address.is_some())
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let spender = step.approval_address.clone().ok_or_else(|| {
            EngineError::Validation("allowance check requires an approval address".to_string())
        })?;

        let (_, action) = env
            .status
            .find_or_create_action(&env.step_id, ActionType::TokenAllowance)?;
        if action.status == ExecutionStatus::Done {
            return Ok(TaskOutcome::completed_with(
                ContextPatch::new().set(keys::ALLOWANCE_OK, true),
            ));
        }

        let allowance = read_allowance(env, &step, &spender).await?;
        if allowance >= step.from_amount {
            info!(step_id = %env.step_id, allowance, "sufficient allowance, skipping approval");
            env.status.update_action(
                &env.step_id,
                ActionType::TokenAllowance,
                ActionUpdate::status(ExecutionStatus::Done).with_message("sufficient allowance"),
            )?;
            return Ok(TaskOutcome::completed_with(
                ContextPatch::new().set(keys::ALLOWANCE_OK, true),
            ));
        }

        let needs_reset = step.estimate.approval_reset && allowance > 0;
        debug!(step_id = %env.step_id, allowance, needs_reset, "approval required");
        Ok(TaskOutcome::completed_with(
            ContextPatch::new()
                .set(keys::ALLOWANCE_OK, false)
                .set(keys::NEEDS_RESET, needs_reset)
                .set(keys::CURRENT_ALLOWANCE, allowance.to_string()),
        ))
    }
}

/// Drop a nonzero allowance to zero for tokens that reject raising it
/// directly. Runs only when the quote flagged the token and the current
/// allowance is nonzero.
pub struct ResetAllowanceTask {
    env: Arc<TaskEnv>,
}

impl ResetAllowanceTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for ResetAllowanceTask {
    fn id(&self) -> &'static str {
        "reset_allowance"
    }

    async fn should_run(&self, context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(context.get::<bool>(keys::NEEDS_RESET).unwrap_or(false)
            && !context.contains(keys::RESET_TX_HASH))
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let spender = step.approval_address.clone().ok_or_else(|| {
            EngineError::Validation("allowance reset requires an approval address".to_string())
        })?;

        let (_, action) = env
            .status
            .find_or_create_action(&env.step_id, ActionType::ResetAllowance)?;
        if action.status == ExecutionStatus::Done {
            return Ok(TaskOutcome::completed_with(
                ContextPatch::new().set(keys::RESET_TX_HASH, action.tx_hash.unwrap_or_default()),
            ));
        }

        // The allowance must reach zero before it can be raised.
        env.status.update_action(
            &env.step_id,
            ActionType::TokenAllowance,
            ActionUpdate::status(ExecutionStatus::ResetRequired),
        )?;

        let tx_hash = match action.tx_hash {
            Some(hash) => hash,
            None => {
                if let Some(pause) = pause_for_interaction(
                    env,
                    ActionType::ResetAllowance,
                    ExecutionStatus::ResetRequired,
                )? {
                    return Ok(pause);
                }
                if let Some(pause) = ensure_ready(env, &step, ActionType::ResetAllowance).await? {
                    return Ok(pause);
                }

                let request =
                    env.deps
                        .tx_builder
                        .build_approval(&step.from_token, &step.from_address, &spender, 0)?;
                env.status.update_action(
                    &env.step_id,
                    ActionType::ResetAllowance,
                    ActionUpdate::status(ExecutionStatus::ActionRequired),
                )?;
                let hash = env.deps.wallet.send_transaction(&request).await?;
                info!(step_id = %env.step_id, tx_hash = %hash, "allowance reset sent");
                env.status.update_action(
                    &env.step_id,
                    ActionType::ResetAllowance,
                    pending_with_hash(env, step.from_chain_id, &hash),
                )?;
                hash
            }
        };

        env.wait_for_receipt(step.from_chain_id, &tx_hash).await?;
        env.status.update_action(
            &env.step_id,
            ActionType::ResetAllowance,
            ActionUpdate::status(ExecutionStatus::Done),
        )?;

        Ok(TaskOutcome::completed_with(
            ContextPatch::new().set(keys::RESET_TX_HASH, tx_hash),
        ))
    }
}

/// Approve the spender for the step amount and wait for the approval to
/// confirm. The hash lands on the `TokenAllowance` action.
pub struct ApproveAllowanceTask {
    env: Arc<TaskEnv>,
}

impl ApproveAllowanceTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for ApproveAllowanceTask {
    fn id(&self) -> &'static str {
        "approve_allowance"
    }

    async fn should_run(&self, context: &PipelineContext) -> Result<bool, EngineError> {
        Ok(matches!(
            context.get::<bool>(keys::ALLOWANCE_OK),
            Some(false)
        ))
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let spender = step.approval_address.clone().ok_or_else(|| {
            EngineError::Validation("approval requires an approval address".to_string())
        })?;

        let (_, action) = env
            .status
            .find_or_create_action(&env.step_id, ActionType::TokenAllowance)?;
        if action.status == ExecutionStatus::Done {
            return Ok(TaskOutcome::completed_with(
                ContextPatch::new().set(keys::ALLOWANCE_OK, true),
            ));
        }

        let tx_hash = match action.tx_hash {
            Some(hash) => hash,
            None => {
                if let Some(pause) = pause_for_interaction(
                    env,
                    ActionType::TokenAllowance,
                    ExecutionStatus::ActionRequired,
                )? {
                    return Ok(pause);
                }
                if let Some(pause) = ensure_ready(env, &step, ActionType::TokenAllowance).await? {
                    return Ok(pause);
                }

                let request = env.deps.tx_builder.build_approval(
                    &step.from_token,
                    &step.from_address,
                    &spender,
                    step.from_amount,
                )?;
                env.status.update_action(
                    &env.step_id,
                    ActionType::TokenAllowance,
                    ActionUpdate::status(ExecutionStatus::ActionRequired),
                )?;
                let hash = env.deps.wallet.send_transaction(&request).await?;
                info!(step_id = %env.step_id, tx_hash = %hash, "approval sent");
                env.status.update_action(
                    &env.step_id,
                    ActionType::TokenAllowance,
                    pending_with_hash(env, step.from_chain_id, &hash),
                )?;
                hash
            }
        };

        env.wait_for_receipt(step.from_chain_id, &tx_hash).await?;
        env.status.update_action(
            &env.step_id,
            ActionType::TokenAllowance,
            ActionUpdate::status(ExecutionStatus::Done),
        )?;

        Ok(TaskOutcome::completed_with(
            ContextPatch::new()
                .set(keys::ALLOWANCE_OK, true)
                .set(keys::APPROVAL_TX_HASH, tx_hash),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{harness, make_step};
    use crossflow_pipeline::TaskStatus;

    #[tokio::test]
    async fn test_sufficient_allowance_completes_without_transaction() {
        let h = harness(make_step("step-1", 1, 1));
        h.endpoint.set_allowance(2_000_000);

        let task = CheckAllowanceTask::new(h.env.clone());
        let outcome = task.run(&PipelineContext::default()).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Completed);

        let step = h.env.step().unwrap();
        let action = step
            .execution
            .unwrap()
            .action(ActionType::TokenAllowance)
            .cloned()
            .unwrap();
        assert_eq!(action.status, ExecutionStatus::Done);
        assert_eq!(action.tx_hash, None, "no approval transaction");
        assert_eq!(action.message.as_deref(), Some("sufficient allowance"));
        assert!(h.wallet.sent_transactions().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_allowance_flags_approval_need() {
        let h = harness(make_step("step-1", 1, 1));
        h.endpoint.set_allowance(10);

        let task = CheckAllowanceTask::new(h.env.clone());
        let outcome = task.run(&PipelineContext::default()).await.unwrap();

        let mut ctx = PipelineContext::default();
        ctx.merge(&outcome.patch);
        assert_eq!(ctx.get::<bool>(keys::ALLOWANCE_OK), Some(false));
        assert_eq!(ctx.get::<bool>(keys::NEEDS_RESET), Some(false));
        assert_eq!(
            ctx.get::<String>(keys::CURRENT_ALLOWANCE).as_deref(),
            Some("10")
        );
    }

    #[tokio::test]
    async fn test_reset_flagged_only_with_nonzero_allowance() {
        let mut step = make_step("step-1", 1, 1);
        step.estimate.approval_reset = true;
        let h = harness(step);
        h.endpoint.set_allowance(0);

        let task = CheckAllowanceTask::new(h.env.clone());
        let outcome = task.run(&PipelineContext::default()).await.unwrap();
        let mut ctx = PipelineContext::default();
        ctx.merge(&outcome.patch);
        assert_eq!(ctx.get::<bool>(keys::NEEDS_RESET), Some(false));
    }

    #[tokio::test]
    async fn test_native_token_skips_allowance() {
        let h = harness(make_step("step-1", 1, 1));
        let mut env = (*h.env).clone();
        env.flags.is_from_native = true;
        let task = CheckAllowanceTask::new(Arc::new(env));
        assert!(!task.should_run(&PipelineContext::default()).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_approve_sends_and_confirms() {
        let h = harness(make_step("step-1", 1, 1));
        let task = ApproveAllowanceTask::new(h.env.clone());

        let mut ctx = PipelineContext::default();
        ctx.merge(&ContextPatch::new().set(keys::ALLOWANCE_OK, false));
        assert!(task.should_run(&ctx).await.unwrap());

        let outcome = task.run(&ctx).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Completed);

        let step = h.env.step().unwrap();
        let action = step
            .execution
            .unwrap()
            .action(ActionType::TokenAllowance)
            .cloned()
            .unwrap();
        assert_eq!(action.status, ExecutionStatus::Done);
        assert!(action.tx_hash.is_some());

        let sent = h.wallet.sent_transactions();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].data.contains("approve"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_sends_zero_approval_first() {
        let mut step = make_step("step-1", 1, 1);
        step.estimate.approval_reset = true;
        let h = harness(step);
        h.endpoint.set_allowance(10);

        let mut ctx = PipelineContext::default();
        let check = CheckAllowanceTask::new(h.env.clone());
        ctx.merge(&check.run(&ctx).await.unwrap().patch);
        assert_eq!(ctx.get::<bool>(keys::NEEDS_RESET), Some(true));

        let reset = ResetAllowanceTask::new(h.env.clone());
        assert!(reset.should_run(&ctx).await.unwrap());
        ctx.merge(&reset.run(&ctx).await.unwrap().patch);

        let approve = ApproveAllowanceTask::new(h.env.clone());
        ctx.merge(&approve.run(&ctx).await.unwrap().patch);

        let sent = h.wallet.sent_transactions();
        assert_eq!(sent.len(), 2, "reset then approval");
        assert!(sent[0].data.ends_with(":0"), "first approval is for zero");

        let step = h.env.step().unwrap();
        let execution = step.execution.unwrap();
        let reset_action = execution.action(ActionType::ResetAllowance).unwrap();
        let allowance_action = execution.action(ActionType::TokenAllowance).unwrap();
        assert_eq!(reset_action.status, ExecutionStatus::Done);
        assert_eq!(allowance_action.status, ExecutionStatus::Done);
        assert_ne!(reset_action.tx_hash, allowance_action.tx_hash);
    }

    #[tokio::test]
    async fn test_approve_pauses_when_interaction_disallowed() {
        let mut h = harness(make_step("step-1", 1, 1));
        h.set_interaction(false);

        let task = ApproveAllowanceTask::new(h.env.clone());
        let mut ctx = PipelineContext::default();
        ctx.merge(&ContextPatch::new().set(keys::ALLOWANCE_OK, false));

        let outcome = task.run(&ctx).await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Paused);
        assert!(h.wallet.sent_transactions().is_empty());
    }
}
