use serde::{Deserialize, Serialize};

/// Numeric chain identifier as used by quote services and wallets
pub type ChainId = u64;

/// Execution ecosystem a chain belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Account-based EVM chains
    Evm,
    /// UTXO chains (Bitcoin-like)
    Utxo,
    /// Solana virtual machine chains
    Svm,
}

/// Static description of a supported chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: ChainId,

    /// Short key (e.g., "eth", "arb")
    pub key: String,

    /// Display name
    pub name: String,

    pub chain_type: ChainType,

    /// Block explorer base URL, used to build transaction links
    pub explorer_url: Option<String>,
}

impl Chain {
    pub fn new(id: ChainId, key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            name: name.into(),
            chain_type: ChainType::Evm,
            explorer_url: None,
        }
    }

    pub fn with_chain_type(mut self, chain_type: ChainType) -> Self {
        self.chain_type = chain_type;
        self
    }

    pub fn with_explorer_url(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }

    /// Explorer link for a transaction hash, if an explorer is configured
    pub fn tx_link(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base.trim_end_matches('/'), tx_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_link_with_explorer() {
        let chain = Chain::new(1, "eth", "Ethereum").with_explorer_url("https://etherscan.io/");
        assert_eq!(
            chain.tx_link("0xabc"),
            Some("https://etherscan.io/tx/0xabc".to_string())
        );
    }

    #[test]
    fn test_tx_link_without_explorer() {
        let chain = Chain::new(1, "eth", "Ethereum");
        assert_eq!(chain.tx_link("0xabc"), None);
    }
}
