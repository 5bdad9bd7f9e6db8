use crate::context::TaskEnv;
use crate::tasks::{ensure_ready, keys, pause_for_interaction};
use async_trait::async_trait;
use crossflow_pipeline::{ContextPatch, PipelineContext, Task, TaskOutcome};
use crossflow_status::ActionUpdate;
use crossflow_types::{ActionType, EngineError, ExecutionStatus, SignedTypedData};
use std::sync::Arc;
use tracing::{debug, info};

/// Obtain a permit signature for the step's spender, reusing a prior
/// signature while it still covers the chain, spender and amount.
pub struct SignPermitTask {
    env: Arc<TaskEnv>,
}

impl SignPermitTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for SignPermitTask {
    fn id(&self) -> &'static str {
        "sign_permit"
    }

    async fn should_run(&self, context: &PipelineContext) -> Result<bool, EngineError> {
        if context.contains(keys::PERMIT_SIGNATURE) {
            return Ok(false);
        }
        let step = self.env.step()?;
        Ok(!step.typed_data.is_empty() && step.approval_address.is_some())
    }

    async fn run(&self, _context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;
        let spender = step.approval_address.clone().ok_or_else(|| {
            EngineError::Validation("permit signing requires an approval address".to_string())
        })?;

        let (_, action) = env
            .status
            .find_or_create_action(&env.step_id, ActionType::Permit)?;

        let now_secs = chrono::Utc::now().timestamp().max(0) as u64;
        if let Some(signed) = &action.signed_typed_data {
            if signed.covers(step.from_chain_id, &spender, step.from_amount, now_secs) {
                debug!(step_id = %env.step_id, "reusing valid permit signature");
                env.status.update_action(
                    &env.step_id,
                    ActionType::Permit,
                    ActionUpdate::status(ExecutionStatus::Done)
                        .with_message("reusing valid signature"),
                )?;
                return Ok(TaskOutcome::completed_with(
                    ContextPatch::new().set(keys::PERMIT_SIGNATURE, signed.signature.clone()),
                ));
            }
        }

        if let Some(pause) =
            pause_for_interaction(env, ActionType::Permit, ExecutionStatus::MessageRequired)?
        {
            return Ok(pause);
        }
        if let Some(pause) = ensure_ready(env, &step, ActionType::Permit).await? {
            return Ok(pause);
        }

        env.status.update_action(
            &env.step_id,
            ActionType::Permit,
            ActionUpdate::status(ExecutionStatus::MessageRequired),
        )?;

        let envelope = step.typed_data.first().cloned().ok_or_else(|| {
            EngineError::TransactionUnprepared("step carries no typed data to sign".to_string())
        })?;
        let signature = env.collect_signature(&envelope).await?;
        info!(step_id = %env.step_id, "permit signed");

        let signed = SignedTypedData {
            envelope,
            signature: signature.clone(),
            spender,
            amount: step.from_amount,
            chain_id: step.from_chain_id,
            valid_until: None,
        };
        env.status.update_action(
            &env.step_id,
            ActionType::Permit,
            ActionUpdate::status(ExecutionStatus::Done).with_signed_typed_data(signed),
        )?;

        Ok(TaskOutcome::completed_with(
            ContextPatch::new().set(keys::PERMIT_SIGNATURE, signature),
        ))
    }
}
