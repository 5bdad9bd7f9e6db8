use crate::chain::ChainId;
use crate::execution::Execution;
use crate::token::Token;
use crate::transaction::{TransactionRequest, TypedDataEnvelope};
use serde::{Deserialize, Serialize};

/// Quote-service estimate for a step. `approval_reset` is an opaque input
/// flag; whether a token needs a reset-to-zero before raising its allowance
/// is never inferred locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub from_amount: u128,
    pub to_amount: u128,
    pub to_amount_min: u128,

    #[serde(default)]
    pub approval_reset: bool,

    /// Step is eligible for gasless execution through a relayer
    #[serde(default)]
    pub gasless: bool,
}

/// One atomic unit of a route (e.g., "swap USDC to DAI on chain X").
/// Owns at most one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,

    pub from_chain_id: ChainId,
    pub to_chain_id: ChainId,

    pub from_token: Token,
    pub to_token: Token,

    pub from_amount: u128,

    /// Address that requested the quote and must sign
    pub from_address: String,

    pub to_address: String,

    /// Contract to approve, if the step spends an ERC-20
    pub approval_address: Option<String>,

    pub estimate: Estimate,

    /// Prepared transaction, refreshed through the quote service when stale
    pub transaction_request: Option<TransactionRequest>,

    /// Typed data the step requires signatures for (permits, relayed orders)
    #[serde(default)]
    pub typed_data: Vec<TypedDataEnvelope>,

    pub execution: Option<Execution>,
}

impl Step {
    pub fn is_bridge(&self) -> bool {
        self.from_chain_id != self.to_chain_id
    }
}

/// A multi-step transfer/swap route produced by the quote service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub from_address: String,
    pub to_address: String,
    pub steps: Vec<Step>,
}

impl Route {
    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }
}
