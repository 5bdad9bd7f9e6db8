use crate::chain::ChainId;
use crate::transaction::SignedTypedData;
use serde::{Deserialize, Serialize};

/// Status vocabulary shared by executions and actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Started,
    Pending,
    ActionRequired,
    MessageRequired,
    ResetRequired,
    Done,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal states stay put until a fresh execution attempt is
    /// explicitly initialized.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// States that gate on user interaction
    pub fn requires_interaction(&self) -> bool {
        matches!(
            self,
            Self::ActionRequired | Self::MessageRequired | Self::ResetRequired
        )
    }
}

/// Finer-grained qualifier on an execution status. Cleared automatically
/// whenever the status changes without an explicit new substatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Substatus {
    WaitSourceConfirmations,
    WaitDestinationTransaction,
    Partial,
    Refunded,
    Completed,
}

/// Typed sub-operations within a step's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    TokenAllowance,
    Permit,
    NativePermit,
    ResetAllowance,
    Swap,
    CrossChain,
    ReceivingChain,
}

/// How a transaction reaches the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    #[default]
    Standard,
    Relayed,
    Batched,
}

/// Serializable record of a taxonomy error attached to an execution or action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Stable error code (see `EngineError::code`)
    pub code: String,
    pub message: String,
}

/// One typed sub-operation within a step's execution. At most one action
/// per type exists per execution; created via find-or-create and mutated
/// only through the status manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub status: ExecutionStatus,
    pub chain_id: ChainId,
    pub tx_hash: Option<String>,

    /// Identifier for relayed or batched submissions that have no hash yet
    pub task_id: Option<String>,

    pub tx_link: Option<String>,

    #[serde(default)]
    pub tx_type: TxType,

    pub signed_typed_data: Option<SignedTypedData>,

    /// Human-readable note (e.g., "sufficient allowance")
    pub message: Option<String>,

    pub error: Option<ErrorRecord>,
}

impl Action {
    pub fn new(action_type: ActionType, chain_id: ChainId) -> Self {
        Self {
            action_type,
            status: ExecutionStatus::Started,
            chain_id,
            tx_hash: None,
            task_id: None,
            tx_link: None,
            tx_type: TxType::Standard,
            signed_typed_data: None,
            message: None,
            error: None,
        }
    }
}

/// Durable snapshot letting a paused pipeline resume after a restart.
/// Callers treat this as opaque and pass it back unmodified.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineSavedState {
    pub paused_at_task: String,
    pub pipeline_context: serde_json::Map<String, serde_json::Value>,
}

/// Runtime record for a step. Created when the step begins executing and
/// reset only by starting a fresh attempt after a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub status: ExecutionStatus,
    pub substatus: Option<Substatus>,
    pub actions: Vec<Action>,

    /// Unix millis
    pub started_at: u64,
    pub pending_at: Option<u64>,
    pub done_at: Option<u64>,
    pub action_required_at: Option<u64>,

    pub error: Option<ErrorRecord>,

    pub pipeline_saved_state: Option<PipelineSavedState>,
}

impl Execution {
    pub fn new(started_at: u64) -> Self {
        Self {
            status: ExecutionStatus::Started,
            substatus: None,
            actions: Vec::new(),
            started_at,
            pending_at: None,
            done_at: None,
            action_required_at: None,
            error: None,
            pipeline_saved_state: None,
        }
    }

    pub fn action(&self, action_type: ActionType) -> Option<&Action> {
        self.actions.iter().find(|a| a.action_type == action_type)
    }

    pub fn action_mut(&mut self, action_type: ActionType) -> Option<&mut Action> {
        self.actions
            .iter_mut()
            .find(|a| a.action_type == action_type)
    }

    /// The most recently active action: the last one not yet done, falling
    /// back to the last action touched. Used to attribute failures.
    pub fn last_active_action(&self) -> Option<&Action> {
        self.actions
            .iter()
            .rev()
            .find(|a| a.status != ExecutionStatus::Done)
            .or_else(|| self.actions.last())
    }
}
