//! Step execution engine: drives one route step through its action task
//! pipeline, racing confirmations across redundant endpoints and pausing
//! cleanly whenever user interaction is required.

pub mod adapter;
pub mod context;
pub mod error;
pub mod executor;
pub mod interfaces;
pub mod strategy;
pub mod tasks;

#[cfg(test)]
pub(crate) mod testutil;

pub use adapter::{EcosystemAdapter, EvmAdapter};
pub use context::{ClientCheck, ExecutorConfig, ExecutorDeps, StepFlags, TaskEnv};
pub use error::StepExecutionError;
pub use executor::{ExecutionOptions, StepExecutor, StepOutcome};
pub use interfaces::{
    BatchStatus, BridgeStatusService, QuoteService, ReceivingStatus, RelayedTaskStatus,
    RelayerService, RpcEndpoint, RpcProvider, TransactionBuilder, WalletClient,
};
pub use strategy::{select_strategy, ExecutionStrategy};
