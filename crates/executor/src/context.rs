//! Shared per-step environment handed to every action task

use crate::interfaces::{
    BridgeStatusService, QuoteService, RelayerService, RpcEndpoint, RpcProvider,
    TransactionBuilder, WalletClient,
};
use crossflow_config::ExecutionSettings;
use crossflow_confirm::{race, PollingBackoff, RaceConfig};
use crossflow_status::StatusManager;
use crossflow_types::{
    ActionType, Chain, ChainId, EngineError, ReceiptStatus, Step, TransactionReceipt,
    TypedDataEnvelope,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Collaborator bundle, cheap to clone into each step environment
#[derive(Clone)]
pub struct ExecutorDeps {
    pub wallet: Arc<dyn WalletClient>,
    pub quotes: Arc<dyn QuoteService>,
    pub rpc: Arc<dyn RpcProvider>,
    pub tx_builder: Arc<dyn TransactionBuilder>,

    /// Required only for gasless execution
    pub relayer: Option<Arc<dyn RelayerService>>,

    /// Required only for bridge steps
    pub bridge_status: Option<Arc<dyn BridgeStatusService>>,
}

/// Timing knobs for the executor's wait loops
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Confirmation race tuning (receipts, batch status)
    pub race: RaceConfig,

    /// Backoff template for the receiving-chain poll loop
    pub receiving_backoff: PollingBackoff,

    /// Ceiling on a receiving-chain wait
    pub receiving_timeout: Duration,

    pub relayed_poll_interval: Duration,
    pub relayed_timeout: Duration,

    /// Bounded wait for a wallet signature
    pub signature_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            race: RaceConfig::default(),
            receiving_backoff: PollingBackoff::default(),
            receiving_timeout: Duration::from_secs(3600),
            relayed_poll_interval: Duration::from_secs(3),
            relayed_timeout: Duration::from_secs(600),
            signature_timeout: Duration::from_secs(300),
        }
    }
}

impl From<&ExecutionSettings> for ExecutorConfig {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            race: RaceConfig::from(settings),
            receiving_backoff: PollingBackoff::default(),
            receiving_timeout: Duration::from_secs(settings.receiving_chain_timeout_secs),
            relayed_poll_interval: Duration::from_millis(settings.confirmation_poll_ms),
            relayed_timeout: Duration::from_secs(settings.confirmation_timeout_secs),
            signature_timeout: Duration::from_secs(settings.signature_timeout_secs),
        }
    }
}

/// Per-run capability and policy flags. The executor fills the base fields;
/// the ecosystem adapter fills the rest in `create_context`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepFlags {
    pub is_bridge_execution: bool,
    pub is_from_native: bool,
    pub message_signing_disabled: bool,
    pub permit2_supported: bool,
    pub atomic_batch_supported: bool,
    pub allow_user_interaction: bool,
    pub allow_chain_switch: bool,

    /// Set on the retry after a rejected batch upgrade
    pub force_standard: bool,
}

/// Result of verifying the connected client against the step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCheck {
    Ready,

    /// The wallet is on the wrong chain and switching requires the user
    InteractionRequired,
}

/// Everything a task needs: status manager, collaborators, config, chain
/// registry and the resolved flags. Tasks hold this behind an `Arc` and
/// fetch the step fresh from the status manager on every run.
#[derive(Clone)]
pub struct TaskEnv {
    pub status: Arc<StatusManager>,
    pub deps: ExecutorDeps,
    pub config: ExecutorConfig,
    pub chains: HashMap<ChainId, Chain>,
    pub step_id: String,
    pub flags: StepFlags,
}

impl TaskEnv {
    pub fn step(&self) -> Result<Step, EngineError> {
        self.status.step(&self.step_id)
    }

    pub fn endpoints(&self, chain_id: ChainId) -> Result<Vec<Arc<dyn RpcEndpoint>>, EngineError> {
        let endpoints = self.deps.rpc.endpoints(chain_id)?;
        if endpoints.is_empty() {
            return Err(EngineError::ChainNotFound(chain_id));
        }
        Ok(endpoints)
    }

    pub fn tx_link(&self, chain_id: ChainId, tx_hash: &str) -> Option<String> {
        self.chains.get(&chain_id).and_then(|c| c.tx_link(tx_hash))
    }

    /// The main on-chain action of the step
    pub fn primary_action_type(&self, step: &Step) -> ActionType {
        if step.is_bridge() {
            ActionType::CrossChain
        } else {
            ActionType::Swap
        }
    }

    /// Verify the connected wallet before any signature or submission.
    ///
    /// A different account than the quote requester is fatal: signatures
    /// from the wrong key would burn funds. A wrong chain is recoverable by
    /// switching, which happens here when policy allows it.
    pub async fn check_client(&self, step: &Step) -> Result<ClientCheck, EngineError> {
        let connected = self.deps.wallet.address().await?;
        if !connected.eq_ignore_ascii_case(&step.from_address) {
            return Err(EngineError::WalletChangedDuringExecution {
                expected: step.from_address.clone(),
                connected,
            });
        }

        let current = self.deps.wallet.chain_id().await?;
        if current != step.from_chain_id {
            if !(self.flags.allow_chain_switch && self.flags.allow_user_interaction) {
                return Ok(ClientCheck::InteractionRequired);
            }
            info!(step_id = %self.step_id, from = current, to = step.from_chain_id, "switching chain");
            self.deps.wallet.switch_chain(step.from_chain_id).await?;
            let now = self.deps.wallet.chain_id().await?;
            if now != step.from_chain_id {
                return Err(EngineError::ChainSwitch(format!(
                    "wallet stayed on chain {now}"
                )));
            }
        }
        Ok(ClientCheck::Ready)
    }

    /// Request a signature from the wallet, bounded by the configured
    /// signature timeout. A wallet that never answers must not wedge the
    /// pipeline forever.
    pub async fn collect_signature(
        &self,
        envelope: &TypedDataEnvelope,
    ) -> Result<String, EngineError> {
        let wait = self.config.signature_timeout;
        tokio::time::timeout(wait, self.deps.wallet.sign_typed_data(envelope))
            .await
            .map_err(|_| {
                EngineError::TransactionExpired(format!("no signature collected within {wait:?}"))
            })?
    }

    /// Race a receipt poll across every endpoint of the chain. A reverted
    /// receipt is definitive and ends the race as `TransactionFailed`.
    pub async fn wait_for_receipt(
        &self,
        chain_id: ChainId,
        tx_hash: &str,
    ) -> Result<TransactionReceipt, EngineError> {
        let endpoints = self.endpoints(chain_id)?;
        let hash = tx_hash.to_string();
        race(&endpoints, &self.config.race, |endpoint| {
            let hash = hash.clone();
            async move {
                match endpoint.get_transaction_receipt(chain_id, &hash).await? {
                    Some(receipt) if receipt.status == ReceiptStatus::Reverted => Err(
                        EngineError::TransactionFailed(format!("transaction {hash} reverted")),
                    ),
                    other => Ok(other),
                }
            }
        })
        .await
    }
}
