use crate::backoff::PollingBackoff;
use async_trait::async_trait;
use crossflow_types::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A transaction as reported by a multisig transaction service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultisigTransaction {
    pub id: String,
    pub nonce: u64,
    pub tx_hash: Option<String>,
    pub executed: bool,
}

/// External multisig transaction-status service (e.g., a Safe service).
/// Consumed, never implemented, by the engine.
#[async_trait]
pub trait MultisigService: Send + Sync {
    /// Pending and executed transactions for a multisig address
    async fn transactions(&self, safe_address: &str) -> Result<Vec<MultisigTransaction>, EngineError>;

    async fn transaction_by_id(&self, id: &str) -> Result<Option<MultisigTransaction>, EngineError>;
}

#[derive(Debug, Clone)]
pub struct MultisigWaitConfig {
    pub backoff: PollingBackoff,

    /// Hard ceiling on the whole wait
    pub timeout: Duration,

    /// Run replacement detection on every Nth poll
    pub replacement_check_every: u32,
}

impl Default for MultisigWaitConfig {
    fn default() -> Self {
        Self {
            backoff: PollingBackoff::default(),
            timeout: Duration::from_secs(24 * 60 * 60),
            replacement_check_every: 3,
        }
    }
}

/// Poll a multisig service until the transaction executes.
///
/// The interval grows per poll and is capped (see `PollingBackoff`). Every
/// Nth poll the safe's transaction list is compared by nonce to catch the
/// transaction being superseded by another one at the same nonce, which
/// surfaces as `TransactionCanceled`. Individual service errors are
/// swallowed and retried; the call fails with `TransactionExpired` once the
/// ceiling elapses with no execution observed.
pub async fn wait_for_multisig_execution(
    service: &dyn MultisigService,
    safe_address: &str,
    tx_id: &str,
    config: MultisigWaitConfig,
) -> Result<MultisigTransaction, EngineError> {
    let started = tokio::time::Instant::now();
    let mut backoff = config.backoff;
    let mut target_nonce: Option<u64> = None;

    loop {
        if started.elapsed() >= config.timeout {
            return Err(EngineError::TransactionExpired(format!(
                "multisig transaction {tx_id} not executed within {:?}",
                config.timeout
            )));
        }

        let poll = backoff.current_attempt();

        match service.transaction_by_id(tx_id).await {
            Ok(Some(tx)) => {
                target_nonce = Some(tx.nonce);
                if tx.executed {
                    info!(tx_id = %tx_id, tx_hash = ?tx.tx_hash, "multisig transaction executed");
                    return Ok(tx);
                }
                debug!(tx_id = %tx_id, nonce = tx.nonce, poll, "multisig transaction still pending");
            }
            Ok(None) => {
                debug!(tx_id = %tx_id, poll, "multisig transaction not yet visible");
            }
            Err(e) => {
                warn!(tx_id = %tx_id, error = %e, "multisig status poll failed, retrying");
            }
        }

        // Replacement detection: another executed transaction at the same
        // nonce means ours was superseded and will never execute.
        if config.replacement_check_every > 0
            && (poll + 1) % config.replacement_check_every == 0
        {
            if let Some(nonce) = target_nonce {
                match service.transactions(safe_address).await {
                    Ok(transactions) => {
                        let replaced = transactions
                            .iter()
                            .any(|t| t.nonce == nonce && t.id != tx_id && t.executed);
                        if replaced {
                            return Err(EngineError::TransactionCanceled(format!(
                                "multisig transaction {tx_id} superseded at nonce {nonce}"
                            )));
                        }
                    }
                    Err(e) => {
                        warn!(safe_address = %safe_address, error = %e, "replacement check failed");
                    }
                }
            }
        }

        tokio::time::sleep(backoff.next_delay()).await;
    }
}
