use crossflow_types::{
    ErrorRecord, ExecutionStatus, SignedTypedData, Substatus, TxType,
};

/// Partial update to an execution. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ExecutionUpdate {
    pub status: Option<ExecutionStatus>,
    pub substatus: Option<Substatus>,
    pub error: Option<ErrorRecord>,
}

impl ExecutionUpdate {
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_substatus(mut self, substatus: Substatus) -> Self {
        self.substatus = Some(substatus);
        self
    }

    pub fn with_error(mut self, error: ErrorRecord) -> Self {
        self.error = Some(error);
        self
    }
}

/// Partial update to an action. Unset fields are left untouched.
/// `reset` allows moving a terminal action back to `Started`, used only when
/// a fresh execution attempt deliberately discards prior work.
#[derive(Debug, Clone, Default)]
pub struct ActionUpdate {
    pub status: Option<ExecutionStatus>,
    pub tx_hash: Option<String>,
    pub task_id: Option<String>,
    pub tx_link: Option<String>,
    pub tx_type: Option<TxType>,
    pub signed_typed_data: Option<SignedTypedData>,
    pub message: Option<String>,
    pub error: Option<ErrorRecord>,
    pub reset: bool,
}

impl ActionUpdate {
    pub fn status(status: ExecutionStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn reset() -> Self {
        Self {
            status: Some(ExecutionStatus::Started),
            reset: true,
            ..Default::default()
        }
    }

    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_tx_link(mut self, tx_link: impl Into<String>) -> Self {
        self.tx_link = Some(tx_link.into());
        self
    }

    pub fn with_tx_type(mut self, tx_type: TxType) -> Self {
        self.tx_type = Some(tx_type);
        self
    }

    pub fn with_signed_typed_data(mut self, data: SignedTypedData) -> Self {
        self.signed_typed_data = Some(data);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_error(mut self, error: ErrorRecord) -> Self {
        self.error = Some(error);
        self
    }
}
