//! Core configuration structures for the Crossflow route execution engine

use crate::{ConfigError, Result};
use crossflow_confirm::{MultisigWaitConfig, PollingBackoff, RaceConfig};
use crossflow_types::{Chain, ChainId, ChainType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Execution tuning
    #[serde(default)]
    pub execution: ExecutionSettings,

    /// Chain configurations by chain ID
    #[serde(default)]
    pub chains: HashMap<ChainId, ChainSettings>,
}

impl EngineConfig {
    /// Static chain descriptions for the executor's chain lookups
    pub fn chain_registry(&self) -> HashMap<ChainId, Chain> {
        self.chains
            .iter()
            .map(|(id, settings)| {
                let mut chain = Chain::new(*id, settings.key.clone(), settings.name.clone())
                    .with_chain_type(settings.chain_type);
                if let Some(url) = &settings.explorer_url {
                    chain = chain.with_explorer_url(url.clone());
                }
                (*id, chain)
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for (id, chain) in &self.chains {
            if chain.rpc_urls.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "chain {id} has no RPC URLs"
                )));
            }
        }
        self.execution.validate()
    }
}

/// Configuration for a supported blockchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSettings {
    /// Short key (e.g., "eth")
    pub key: String,

    /// Display name
    pub name: String,

    #[serde(default = "default_chain_type")]
    pub chain_type: ChainType,

    /// Redundant RPC endpoints, raced during confirmation
    pub rpc_urls: Vec<String>,

    /// Block explorer base URL
    pub explorer_url: Option<String>,
}

/// Execution engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Bounded wait for signature collection (seconds)
    #[serde(default = "default_signature_timeout_secs")]
    pub signature_timeout_secs: u64,

    /// Shared deadline for confirmation racing (seconds)
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,

    /// Receipt poll interval per endpoint (milliseconds)
    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,

    /// Ceiling on a receiving-chain wait (seconds)
    #[serde(default = "default_receiving_chain_timeout_secs")]
    pub receiving_chain_timeout_secs: u64,

    /// Multisig polling: initial interval (seconds)
    #[serde(default = "default_multisig_poll_initial_secs")]
    pub multisig_poll_initial_secs: u64,

    /// Multisig polling: growth per poll (seconds)
    #[serde(default = "default_multisig_poll_increment_secs")]
    pub multisig_poll_increment_secs: u64,

    /// Multisig polling: interval cap (seconds)
    #[serde(default = "default_multisig_poll_max_secs")]
    pub multisig_poll_max_secs: u64,

    /// Multisig polling: hard ceiling (seconds)
    #[serde(default = "default_multisig_timeout_secs")]
    pub multisig_timeout_secs: u64,

    /// Routes executed concurrently; steps within a route stay sequential
    #[serde(default = "default_route_concurrency")]
    pub route_concurrency: usize,
}

impl ExecutionSettings {
    pub fn validate(&self) -> Result<()> {
        if self.signature_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "signature_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.confirmation_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "confirmation_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.multisig_poll_max_secs < self.multisig_poll_initial_secs {
            return Err(ConfigError::Validation(
                "multisig poll cap must be at least the initial interval".to_string(),
            ));
        }
        if self.route_concurrency == 0 {
            return Err(ConfigError::Validation(
                "route_concurrency must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            signature_timeout_secs: default_signature_timeout_secs(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmation_poll_ms: default_confirmation_poll_ms(),
            receiving_chain_timeout_secs: default_receiving_chain_timeout_secs(),
            multisig_poll_initial_secs: default_multisig_poll_initial_secs(),
            multisig_poll_increment_secs: default_multisig_poll_increment_secs(),
            multisig_poll_max_secs: default_multisig_poll_max_secs(),
            multisig_timeout_secs: default_multisig_timeout_secs(),
            route_concurrency: default_route_concurrency(),
        }
    }
}

impl From<&ExecutionSettings> for RaceConfig {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            poll_interval: Duration::from_millis(settings.confirmation_poll_ms),
            timeout: Duration::from_secs(settings.confirmation_timeout_secs),
            ..Self::default()
        }
    }
}

impl From<&ExecutionSettings> for MultisigWaitConfig {
    fn from(settings: &ExecutionSettings) -> Self {
        Self {
            backoff: PollingBackoff::new(
                Duration::from_secs(settings.multisig_poll_initial_secs),
                Duration::from_secs(settings.multisig_poll_increment_secs),
                Duration::from_secs(settings.multisig_poll_max_secs),
            ),
            timeout: Duration::from_secs(settings.multisig_timeout_secs),
            ..Self::default()
        }
    }
}

fn default_chain_type() -> ChainType {
    ChainType::Evm
}

fn default_signature_timeout_secs() -> u64 {
    300
}

fn default_confirmation_timeout_secs() -> u64 {
    600
}

fn default_confirmation_poll_ms() -> u64 {
    3000
}

fn default_receiving_chain_timeout_secs() -> u64 {
    3600
}

fn default_multisig_poll_initial_secs() -> u64 {
    10
}

fn default_multisig_poll_increment_secs() -> u64 {
    2
}

fn default_multisig_poll_max_secs() -> u64 {
    30
}

fn default_multisig_timeout_secs() -> u64 {
    24 * 60 * 60
}

fn default_route_concurrency() -> usize {
    4
}
