//! Action tasks assembled into a step pipeline by the ecosystem adapter.
//!
//! Every task is idempotent: `should_run` and the run body inspect action
//! state and context keys, so a resumed pipeline skips straight past work
//! already on chain.

pub mod allowance;
pub mod batched;
pub mod permit;
pub mod receiving;
pub mod relayed;
pub mod standard;

pub use allowance::{ApproveAllowanceTask, CheckAllowanceTask, ResetAllowanceTask};
pub use batched::{PrepareBatchTask, SendBatchTask, WaitBatchTask};
pub use permit::SignPermitTask;
pub use receiving::ReceivingChainTask;
pub use relayed::{PrepareRelayedTask, SendRelayedTask, WaitRelayedTask};
pub use standard::{PrepareStandardTask, SendStandardTask, WaitStandardTask};

use crate::context::{ClientCheck, TaskEnv};
use crossflow_pipeline::TaskOutcome;
use crossflow_status::ActionUpdate;
use crossflow_types::{ActionType, EngineError, ExecutionStatus, Step};
use tracing::debug;

/// Context keys shared between tasks. Amounts are stored as decimal strings
/// so the context stays plain JSON.
pub mod keys {
    pub const PERMIT_SIGNATURE: &str = "permit_signature";
    pub const ALLOWANCE_OK: &str = "allowance_ok";
    pub const CURRENT_ALLOWANCE: &str = "current_allowance";
    pub const NEEDS_RESET: &str = "needs_reset";
    pub const RESET_TX_HASH: &str = "reset_tx_hash";
    pub const APPROVAL_TX_HASH: &str = "approval_tx_hash";
    pub const TX_HASH: &str = "tx_hash";
    pub const BATCH_ID: &str = "batch_id";
    pub const RELAYER_TASK_ID: &str = "relayer_task_id";
    pub const RECEIVING_TX_HASH: &str = "receiving_tx_hash";
}

/// Gate on user interaction: when disallowed, surface the given status on
/// the action and pause the pipeline instead of prompting.
pub(crate) fn pause_for_interaction(
    env: &TaskEnv,
    action_type: ActionType,
    gate: ExecutionStatus,
) -> Result<Option<TaskOutcome>, EngineError> {
    if env.flags.allow_user_interaction {
        return Ok(None);
    }
    env.status
        .update_action(&env.step_id, action_type, ActionUpdate::status(gate))?;
    debug!(step_id = %env.step_id, action = ?action_type, "interaction disallowed, pausing");
    Ok(Some(TaskOutcome::paused()))
}

/// Verify wallet identity and chain before sending. A needed-but-disallowed
/// chain switch pauses; a changed wallet propagates as a fatal error.
pub(crate) async fn ensure_ready(
    env: &TaskEnv,
    step: &Step,
    action_type: ActionType,
) -> Result<Option<TaskOutcome>, EngineError> {
    match env.check_client(step).await? {
        ClientCheck::Ready => Ok(None),
        ClientCheck::InteractionRequired => {
            env.status.update_action(
                &env.step_id,
                action_type,
                ActionUpdate::status(ExecutionStatus::ActionRequired)
                    .with_message("chain switch required"),
            )?;
            Ok(Some(TaskOutcome::paused()))
        }
    }
}

/// Attach a hash (and explorer link when known) to an action moving into
/// `Pending`.
pub(crate) fn pending_with_hash(
    env: &TaskEnv,
    chain_id: crossflow_types::ChainId,
    tx_hash: &str,
) -> ActionUpdate {
    let mut update = ActionUpdate::status(ExecutionStatus::Pending).with_tx_hash(tx_hash);
    if let Some(link) = env.tx_link(chain_id, tx_hash) {
        update = update.with_tx_link(link);
    }
    update
}
