use crate::chain::ChainId;
use serde::{Deserialize, Serialize};

/// Sentinel address denoting the chain's native asset
pub const NATIVE_TOKEN_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// A token on a specific chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub chain_id: ChainId,
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

impl Token {
    pub fn new(
        chain_id: ChainId,
        address: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            chain_id,
            address: address.into(),
            symbol: symbol.into(),
            decimals,
        }
    }

    /// Native token for a chain (zero-address sentinel)
    pub fn native(chain_id: ChainId, symbol: impl Into<String>, decimals: u8) -> Self {
        Self::new(chain_id, NATIVE_TOKEN_ADDRESS, symbol, decimals)
    }

    /// Whether this token is the chain's native asset. Native transfers
    /// never require an allowance.
    pub fn is_native(&self) -> bool {
        self.address.is_empty() || self.address.eq_ignore_ascii_case(NATIVE_TOKEN_ADDRESS)
    }
}
