use crate::context::TaskEnv;
use crate::interfaces::ReceivingStatus;
use crate::tasks::keys;
use async_trait::async_trait;
use crossflow_pipeline::{ContextPatch, PipelineContext, Task, TaskOutcome};
use crossflow_status::{ActionUpdate, ExecutionUpdate};
use crossflow_types::{ActionType, EngineError, ExecutionStatus, Substatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watch the destination chain of a bridge step until the receiving
/// transaction lands. Independent of the source action: once the source
/// hash exists, this task owns the rest of the step's lifetime.
pub struct ReceivingChainTask {
    env: Arc<TaskEnv>,
}

impl ReceivingChainTask {
    pub fn new(env: Arc<TaskEnv>) -> Self {
        Self { env }
    }
}

#[async_trait]
impl Task for ReceivingChainTask {
    fn id(&self) -> &'static str {
        "wait_receiving_chain"
    }

    async fn should_run(&self, _context: &PipelineContext) -> Result<bool, EngineError> {
        if !self.env.flags.is_bridge_execution {
            return Ok(false);
        }
        let step = self.env.step()?;
        let done = step
            .execution
            .as_ref()
            .and_then(|e| e.action(ActionType::ReceivingChain))
            .map(|a| a.status == ExecutionStatus::Done)
            .unwrap_or(false);
        Ok(!done)
    }

    async fn run(&self, context: &PipelineContext) -> Result<TaskOutcome, EngineError> {
        let env = &self.env;
        let step = env.step()?;

        let (_, action) = env
            .status
            .find_or_create_action(&env.step_id, ActionType::ReceivingChain)?;
        if action.status == ExecutionStatus::Done {
            return Ok(TaskOutcome::completed_with(
                ContextPatch::new()
                    .set(keys::RECEIVING_TX_HASH, action.tx_hash.unwrap_or_default()),
            ));
        }

        let source_tx_hash = context
            .get::<String>(keys::TX_HASH)
            .or_else(|| {
                step.execution
                    .as_ref()
                    .and_then(|e| e.action(env.primary_action_type(&step)))
                    .and_then(|a| a.tx_hash.clone())
            })
            .ok_or_else(|| {
                EngineError::Validation(
                    "receiving-chain wait requires a source transaction hash".to_string(),
                )
            })?;

        let service = env.deps.bridge_status.clone().ok_or_else(|| {
            EngineError::Validation("no bridge status service configured".to_string())
        })?;

        env.status.update_execution(
            &env.step_id,
            ExecutionUpdate::status(ExecutionStatus::Pending)
                .with_substatus(Substatus::WaitDestinationTransaction),
        )?;

        let mut backoff = env.config.receiving_backoff.clone();
        let started = tokio::time::Instant::now();
        loop {
            if started.elapsed() >= env.config.receiving_timeout {
                return Err(EngineError::TransactionExpired(format!(
                    "no receiving transaction within {:?}",
                    env.config.receiving_timeout
                )));
            }

            match service.receiving_status(&step, &source_tx_hash).await {
                Ok(ReceivingStatus::Done { tx_hash, tx_link }) => {
                    info!(step_id = %env.step_id, tx_hash = %tx_hash, "receiving transaction found");
                    let link = tx_link.or_else(|| env.tx_link(step.to_chain_id, &tx_hash));
                    let mut done =
                        ActionUpdate::status(ExecutionStatus::Done).with_tx_hash(&tx_hash);
                    if let Some(link) = link {
                        done = done.with_tx_link(link);
                    }
                    env.status
                        .update_action(&env.step_id, ActionType::ReceivingChain, done)?;
                    return Ok(TaskOutcome::completed_with(
                        ContextPatch::new().set(keys::RECEIVING_TX_HASH, tx_hash),
                    ));
                }
                Ok(ReceivingStatus::Failed(reason)) => {
                    return Err(EngineError::TransactionFailed(reason));
                }
                Ok(ReceivingStatus::Pending) => {
                    debug!(step_id = %env.step_id, "destination transaction not yet visible");
                }
                Err(e) => {
                    warn!(step_id = %env.step_id, error = %e, "receiving status poll failed, retrying");
                }
            }

            tokio::time::sleep(backoff.next_delay()).await;
        }
    }
}
