use crate::context::StepFlags;
use crossflow_types::Step;

/// How the step's main transaction reaches the chain. Exactly one strategy
/// drives a given run; the task list never mixes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Wallet sends a plain transaction and the engine waits for a receipt
    Standard,

    /// A signed order is submitted through a relayer, no gas from the user
    Relayed,

    /// Approval and main call execute as one atomic batch
    Batched,
}

/// Preference order: batched beats relayed beats standard. `force_standard`
/// short-circuits everything after a rejected batch upgrade.
pub fn select_strategy(flags: &StepFlags, step: &Step, relayer_available: bool) -> ExecutionStrategy {
    if flags.force_standard {
        return ExecutionStrategy::Standard;
    }
    if flags.atomic_batch_supported {
        return ExecutionStrategy::Batched;
    }
    if step.estimate.gasless && relayer_available && !flags.message_signing_disabled {
        return ExecutionStrategy::Relayed;
    }
    ExecutionStrategy::Standard
}
