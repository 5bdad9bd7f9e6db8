use crate::chain::ChainId;
use serde::{Deserialize, Serialize};

/// Transaction request as produced by the quote service or an encoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub chain_id: ChainId,

    /// Recipient contract or account
    pub to: String,

    /// Calldata, hex encoded
    pub data: String,

    /// Native value attached to the call
    #[serde(default)]
    pub value: u128,

    pub gas_limit: Option<u64>,

    pub gas_price: Option<u128>,
}

/// EIP-712 style typed data to be signed by the wallet. Domain, types and
/// message are opaque to the engine; only the wallet interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedDataEnvelope {
    pub domain: serde_json::Value,
    pub types: serde_json::Value,
    pub primary_type: String,
    pub message: serde_json::Value,
}

/// A typed-data signature held for reuse across quote refreshes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTypedData {
    pub envelope: TypedDataEnvelope,
    pub signature: String,

    /// Spender the permit was granted to
    pub spender: String,

    /// Amount the permit covers
    pub amount: u128,

    pub chain_id: ChainId,

    /// Unix seconds after which the signature is no longer valid
    pub valid_until: Option<u64>,
}

impl SignedTypedData {
    /// Whether this signature can be reused for the given chain, spender and
    /// amount at the given time.
    pub fn covers(&self, chain_id: ChainId, spender: &str, amount: u128, now_secs: u64) -> bool {
        self.chain_id == chain_id
            && self.spender.eq_ignore_ascii_case(spender)
            && self.amount >= amount
            && self.valid_until.map(|t| now_secs < t).unwrap_or(true)
    }
}

/// Result of an on-chain transaction once included in a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub status: ReceiptStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}
