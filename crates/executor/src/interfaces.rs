//! External collaborator traits. The executor consumes these; integrators
//! implement them against their wallet, RPC, quote and relayer backends.

use async_trait::async_trait;
use crossflow_types::{
    ChainId, EngineError, SignedTypedData, Step, Token, TransactionReceipt, TransactionRequest,
    TypedDataEnvelope,
};
use std::sync::Arc;

/// The connected wallet. Every signature and every submission goes through
/// this seam so the engine never touches key material.
#[async_trait]
pub trait WalletClient: Send + Sync {
    /// Currently connected account address
    async fn address(&self) -> Result<String, EngineError>;

    /// Chain the wallet is currently on
    async fn chain_id(&self) -> Result<ChainId, EngineError>;

    async fn switch_chain(&self, chain_id: ChainId) -> Result<(), EngineError>;

    async fn sign_typed_data(&self, envelope: &TypedDataEnvelope) -> Result<String, EngineError>;

    /// Submit a transaction; returns the transaction hash
    async fn send_transaction(&self, request: &TransactionRequest) -> Result<String, EngineError>;

    /// Submit several calls as one atomic batch; returns a bundle identifier
    /// that is not a transaction hash.
    async fn send_batch(&self, calls: &[TransactionRequest]) -> Result<String, EngineError>;

    /// Whether the wallet can execute atomic batches on the given chain
    async fn supports_atomic_batch(&self, chain_id: ChainId) -> Result<bool, EngineError>;
}

/// Quote backend that produced the route. Used to refresh stale transaction
/// requests before submission.
#[async_trait]
pub trait QuoteService: Send + Sync {
    /// Re-quote the step and return it with a fresh `transaction_request`.
    /// The caller merges the result through the status manager so the
    /// execution record survives.
    async fn refresh_step_transaction(&self, step: &Step) -> Result<Step, EngineError>;

    /// Guard against rate drift between the original quote and a refresh.
    fn compare_steps(&self, current: &Step, refreshed: &Step) -> Result<(), EngineError> {
        if refreshed.estimate.to_amount_min < current.estimate.to_amount_min {
            return Err(EngineError::TransactionCanceled(format!(
                "exchange rate dropped: minimum output {} -> {}",
                current.estimate.to_amount_min, refreshed.estimate.to_amount_min
            )));
        }
        Ok(())
    }
}

/// A single RPC endpoint. Confirmation and read races run one worker per
/// endpoint, so implementations should be cheap to clone behind an `Arc`.
#[async_trait]
pub trait RpcEndpoint: Send + Sync {
    fn url(&self) -> &str;

    async fn get_allowance(
        &self,
        chain_id: ChainId,
        token: &str,
        owner: &str,
        spender: &str,
    ) -> Result<u128, EngineError>;

    async fn get_balance(
        &self,
        chain_id: ChainId,
        token: &str,
        owner: &str,
    ) -> Result<u128, EngineError>;

    /// `None` while the transaction is not yet included
    async fn get_transaction_receipt(
        &self,
        chain_id: ChainId,
        tx_hash: &str,
    ) -> Result<Option<TransactionReceipt>, EngineError>;

    async fn get_batch_status(
        &self,
        chain_id: ChainId,
        batch_id: &str,
    ) -> Result<BatchStatus, EngineError>;
}

/// Maps a chain to its redundant endpoints. Implementations own endpoint
/// caching; the executor treats the returned set as disposable.
pub trait RpcProvider: Send + Sync {
    fn endpoints(&self, chain_id: ChainId) -> Result<Vec<Arc<dyn RpcEndpoint>>, EngineError>;
}

/// Status of an atomic batch submission
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    Pending,
    Confirmed { tx_hash: String },
    Failed(String),
}

/// Gasless execution backend: takes a signed order, submits it on the
/// user's behalf and reports progress by task id.
#[async_trait]
pub trait RelayerService: Send + Sync {
    async fn submit(
        &self,
        chain_id: ChainId,
        order: &SignedTypedData,
    ) -> Result<String, EngineError>;

    async fn task_status(&self, task_id: &str) -> Result<RelayedTaskStatus, EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayedTaskStatus {
    Pending,
    Executed { tx_hash: String },
    Failed(String),
    Cancelled(String),
}

/// Destination-chain observer for bridge steps, keyed by the source
/// transaction hash.
#[async_trait]
pub trait BridgeStatusService: Send + Sync {
    async fn receiving_status(
        &self,
        step: &Step,
        source_tx_hash: &str,
    ) -> Result<ReceivingStatus, EngineError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReceivingStatus {
    Pending,
    Done {
        tx_hash: String,
        tx_link: Option<String>,
    },
    Failed(String),
}

/// Pure calldata encoder for approval transactions
pub trait TransactionBuilder: Send + Sync {
    fn build_approval(
        &self,
        token: &Token,
        owner: &str,
        spender: &str,
        amount: u128,
    ) -> Result<TransactionRequest, EngineError>;
}
