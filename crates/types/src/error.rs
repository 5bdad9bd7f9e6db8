use crate::chain::ChainId;
use crate::execution::ErrorRecord;
use thiserror::Error;

/// Error taxonomy for route execution. Raw RPC and wallet errors are parsed
/// into these kinds at the executor boundary by ecosystem-specific parsers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transaction not prepared: {0}")]
    TransactionUnprepared(String),

    #[error("transaction expired: {0}")]
    TransactionExpired(String),

    #[error("transaction simulation failed: {0}")]
    TransactionSimulationFailed(String),

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("transaction canceled: {0}")]
    TransactionCanceled(String),

    #[error("signature rejected: {0}")]
    SignatureRejected(String),

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("insufficient gas: {0}")]
    InsufficientGas(String),

    #[error("gas limit too low: {0}")]
    GasLimitError(String),

    #[error("chain switch failed: {0}")]
    ChainSwitch(String),

    #[error("wallet changed during execution: quote requested by {expected}, wallet is {connected}")]
    WalletChangedDuringExecution { expected: String, connected: String },

    #[error("atomic batch upgrade rejected by wallet")]
    BatchUpgradeRejected,

    #[error("chain not found: {0}")]
    ChainNotFound(ChainId),

    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("rpc error: {0}")]
    Rpc(String),
}

impl EngineError {
    /// Stable code for persisted error records
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::TransactionUnprepared(_) => "TRANSACTION_UNPREPARED",
            Self::TransactionExpired(_) => "TRANSACTION_EXPIRED",
            Self::TransactionSimulationFailed(_) => "TRANSACTION_SIMULATION_FAILED",
            Self::TransactionFailed(_) => "TRANSACTION_FAILED",
            Self::TransactionCanceled(_) => "TRANSACTION_CANCELED",
            Self::SignatureRejected(_) => "SIGNATURE_REJECTED",
            Self::TransactionRejected(_) => "TRANSACTION_REJECTED",
            Self::InsufficientGas(_) => "INSUFFICIENT_GAS",
            Self::GasLimitError(_) => "GAS_LIMIT_ERROR",
            Self::ChainSwitch(_) => "CHAIN_SWITCH",
            Self::WalletChangedDuringExecution { .. } => "WALLET_CHANGED",
            Self::BatchUpgradeRejected => "BATCH_UPGRADE_REJECTED",
            Self::ChainNotFound(_) => "CHAIN_NOT_FOUND",
            Self::StepNotFound(_) => "STEP_NOT_FOUND",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::Rpc(_) => "RPC",
        }
    }

    /// Errors that end a confirmation race immediately: the result is known
    /// on-chain and no other endpoint can change it.
    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            Self::TransactionFailed(_)
                | Self::TransactionCanceled(_)
                | Self::TransactionExpired(_)
        )
    }

    pub fn record(&self) -> ErrorRecord {
        ErrorRecord {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}
