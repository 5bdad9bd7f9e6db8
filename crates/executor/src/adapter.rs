//! Ecosystem adapter seam. One generic executor drives every ecosystem;
//! the adapter contributes capability detection, the ordered task list and
//! error parsing for its chain family.

use crate::context::TaskEnv;
use crate::strategy::{select_strategy, ExecutionStrategy};
use crate::tasks::{
    ApproveAllowanceTask, CheckAllowanceTask, PrepareBatchTask, PrepareRelayedTask,
    PrepareStandardTask, ReceivingChainTask, ResetAllowanceTask, SendBatchTask, SendRelayedTask,
    SendStandardTask, SignPermitTask, WaitBatchTask, WaitRelayedTask, WaitStandardTask,
};
use async_trait::async_trait;
use crossflow_confirm::or_default;
use crossflow_pipeline::Task;
use crossflow_types::{ChainId, EngineError, Step};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait EcosystemAdapter: Send + Sync {
    fn key(&self) -> &'static str;

    /// Resolve ecosystem capabilities into the step environment: native
    /// token detection, permit support, atomic batch support.
    async fn create_context(&self, base: TaskEnv) -> Result<TaskEnv, EngineError>;

    /// Assemble the ordered task list for one run. Exactly one strategy
    /// triple appears; allowance and permit tasks fold into the batch on the
    /// batched path.
    fn build_tasks(&self, env: &Arc<TaskEnv>, step: &Step) -> Vec<Arc<dyn Task>>;

    /// Map raw RPC/wallet errors into the engine taxonomy. Already-typed
    /// errors pass through unchanged.
    fn parse_error(&self, error: EngineError) -> EngineError;
}

/// Adapter for EVM chains
#[derive(Debug, Default)]
pub struct EvmAdapter {
    permit2_chains: HashSet<ChainId>,
    message_signing_disabled: bool,
}

impl EvmAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_permit2_chains(mut self, chains: impl IntoIterator<Item = ChainId>) -> Self {
        self.permit2_chains = chains.into_iter().collect();
        self
    }

    pub fn with_message_signing_disabled(mut self, disabled: bool) -> Self {
        self.message_signing_disabled = disabled;
        self
    }
}

#[async_trait]
impl EcosystemAdapter for EvmAdapter {
    fn key(&self) -> &'static str {
        "evm"
    }

    async fn create_context(&self, mut base: TaskEnv) -> Result<TaskEnv, EngineError> {
        let step = base.step()?;

        base.flags.is_from_native = step.from_token.is_native();
        base.flags.message_signing_disabled = self.message_signing_disabled;
        base.flags.permit2_supported =
            self.permit2_chains.contains(&step.from_chain_id) && !step.typed_data.is_empty();

        // A wallet that cannot answer the capability probe is treated as
        // batch-incapable rather than failing the whole run.
        base.flags.atomic_batch_supported = !base.flags.force_standard
            && or_default(
                base.deps.wallet.supports_atomic_batch(step.from_chain_id),
                false,
            )
            .await;

        Ok(base)
    }

    fn build_tasks(&self, env: &Arc<TaskEnv>, step: &Step) -> Vec<Arc<dyn Task>> {
        let strategy = select_strategy(&env.flags, step, env.deps.relayer.is_some());
        debug!(step_id = %env.step_id, ?strategy, "building task pipeline");

        let mut tasks: Vec<Arc<dyn Task>> = Vec::new();

        if strategy != ExecutionStrategy::Batched {
            if env.flags.permit2_supported
                && !env.flags.is_from_native
                && !env.flags.message_signing_disabled
            {
                tasks.push(Arc::new(SignPermitTask::new(env.clone())));
            }
            tasks.push(Arc::new(CheckAllowanceTask::new(env.clone())));
            tasks.push(Arc::new(ResetAllowanceTask::new(env.clone())));
            tasks.push(Arc::new(ApproveAllowanceTask::new(env.clone())));
        }

        match strategy {
            ExecutionStrategy::Batched => {
                tasks.push(Arc::new(PrepareBatchTask::new(env.clone())));
                tasks.push(Arc::new(SendBatchTask::new(env.clone())));
                tasks.push(Arc::new(WaitBatchTask::new(env.clone())));
            }
            ExecutionStrategy::Relayed => {
                tasks.push(Arc::new(PrepareRelayedTask::new(env.clone())));
                tasks.push(Arc::new(SendRelayedTask::new(env.clone())));
                tasks.push(Arc::new(WaitRelayedTask::new(env.clone())));
            }
            ExecutionStrategy::Standard => {
                tasks.push(Arc::new(PrepareStandardTask::new(env.clone())));
                tasks.push(Arc::new(SendStandardTask::new(env.clone())));
                tasks.push(Arc::new(WaitStandardTask::new(env.clone())));
            }
        }

        if env.flags.is_bridge_execution {
            tasks.push(Arc::new(ReceivingChainTask::new(env.clone())));
        }

        tasks
    }

    fn parse_error(&self, error: EngineError) -> EngineError {
        let EngineError::Rpc(raw) = &error else {
            return error;
        };
        let msg = raw.to_lowercase();

        let rejected = msg.contains("user rejected")
            || msg.contains("user denied")
            || msg.contains("rejected by user");

        if rejected && (msg.contains("wallet_sendcalls") || msg.contains("batch")) {
            return EngineError::BatchUpgradeRejected;
        }
        if rejected && (msg.contains("message") || msg.contains("signature") || msg.contains("typed data")) {
            return EngineError::SignatureRejected(raw.clone());
        }
        if rejected {
            return EngineError::TransactionRejected(raw.clone());
        }
        if msg.contains("insufficient funds") {
            return EngineError::InsufficientGas(raw.clone());
        }
        if msg.contains("gas required exceeds") || msg.contains("out of gas") {
            return EngineError::GasLimitError(raw.clone());
        }
        if msg.contains("execution reverted") {
            return EngineError::TransactionFailed(raw.clone());
        }
        error
    }
}
