use crate::patch::{ActionUpdate, ExecutionUpdate};
use crossflow_types::{
    Action, ActionType, EngineError, Execution, ExecutionStatus, PipelineSavedState, Route, Step,
};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Caller-supplied callback invoked with the full updated route on every
/// state mutation. Drives UI and logging; never required for correctness.
pub type RouteUpdateHook = Arc<dyn Fn(&Route) + Send + Sync>;

/// The only code path permitted to change execution and action state.
///
/// Holds the route behind a mutex so writes to a given step are serialized,
/// guarantees monotonic timestamps, and emits exactly one update notification
/// per mutation. Every mutating call returns the updated step so callers
/// always observe the freshest reference.
pub struct StatusManager {
    route: Mutex<Route>,
    on_update: Option<RouteUpdateHook>,
}

impl StatusManager {
    pub fn new(route: Route) -> Self {
        Self {
            route: Mutex::new(route),
            on_update: None,
        }
    }

    pub fn with_update_hook(mut self, hook: RouteUpdateHook) -> Self {
        self.on_update = Some(hook);
        self
    }

    /// Snapshot of the externally visible route
    pub fn route(&self) -> Route {
        self.route.lock().expect("route lock poisoned").clone()
    }

    pub fn step(&self, step_id: &str) -> Result<Step, EngineError> {
        let route = self.route.lock().expect("route lock poisoned");
        route
            .step(step_id)
            .cloned()
            .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))
    }

    /// Create a fresh execution for the step, or reuse the current one.
    /// A failed execution is replaced by a new attempt; any other existing
    /// execution is left untouched.
    pub fn init_execution(&self, step_id: &str) -> Result<Step, EngineError> {
        self.mutate(step_id, |step| {
            let now = now_millis();
            match &step.execution {
                Some(execution) if execution.status != ExecutionStatus::Failed => {}
                _ => {
                    info!(step_id = %step.id, "initializing execution");
                    step.execution = Some(Execution::new(now));
                }
            }
            Ok(())
        })
    }

    /// Apply a partial update to the step's execution, enforcing the
    /// transition rule and timestamp stamping.
    pub fn update_execution(
        &self,
        step_id: &str,
        update: ExecutionUpdate,
    ) -> Result<Step, EngineError> {
        self.mutate(step_id, |step| {
            let execution = execution_mut(step)?;
            if let Some(status) = update.status {
                check_transition(execution.status, status, false)?;
                apply_execution_status(execution, status, update.substatus.is_some());
            }
            if let Some(substatus) = update.substatus {
                execution.substatus = Some(substatus);
            }
            if let Some(error) = update.error {
                execution.error = Some(error);
            }
            debug!(step_id = %step.id, status = ?step.execution.as_ref().map(|e| e.status), "execution updated");
            Ok(())
        })
    }

    /// Return the existing action of the given type, creating it in
    /// `Started` if missing. Idempotent: at most one action per type exists
    /// per execution.
    pub fn find_or_create_action(
        &self,
        step_id: &str,
        action_type: ActionType,
    ) -> Result<(Step, Action), EngineError> {
        let step = self.mutate(step_id, |step| {
            let chain_id = match action_type {
                ActionType::ReceivingChain => step.to_chain_id,
                _ => step.from_chain_id,
            };
            let step_id = step.id.clone();
            let execution = execution_mut(step)?;
            if execution.action(action_type).is_none() {
                debug!(step_id = %step_id, action = ?action_type, "creating action");
                execution.actions.push(Action::new(action_type, chain_id));
            }
            Ok(())
        })?;

        let action = step
            .execution
            .as_ref()
            .and_then(|e| e.action(action_type))
            .cloned()
            .expect("action exists after find-or-create");
        Ok((step, action))
    }

    /// Merge a partial patch into the action and re-apply the transition
    /// rule. A `Done` action is never moved backwards without an explicit
    /// reset.
    pub fn update_action(
        &self,
        step_id: &str,
        action_type: ActionType,
        update: ActionUpdate,
    ) -> Result<Step, EngineError> {
        self.mutate(step_id, |step| {
            let step_id = step.id.clone();
            let execution = execution_mut(step)?;
            let action = execution.action_mut(action_type).ok_or_else(|| {
                EngineError::Validation(format!(
                    "no {action_type:?} action on step {step_id}"
                ))
            })?;

            if let Some(status) = update.status {
                check_transition(action.status, status, update.reset)?;
                action.status = status;
            }
            if update.reset {
                action.tx_hash = None;
                action.task_id = None;
                action.tx_link = None;
                action.error = None;
            }
            if let Some(tx_hash) = update.tx_hash {
                action.tx_hash = Some(tx_hash);
            }
            if let Some(task_id) = update.task_id {
                action.task_id = Some(task_id);
            }
            if let Some(tx_link) = update.tx_link {
                action.tx_link = Some(tx_link);
            }
            if let Some(tx_type) = update.tx_type {
                action.tx_type = tx_type;
            }
            if let Some(data) = update.signed_typed_data {
                action.signed_typed_data = Some(data);
            }
            if let Some(message) = update.message {
                action.message = Some(message);
            }
            if let Some(error) = update.error {
                action.error = Some(error);
            }

            // Action-level *Required states surface on the execution too,
            // so callers watching only the execution see the gate.
            if let Some(status) = update.status {
                if status.requires_interaction() || status == ExecutionStatus::Pending {
                    let execution = execution_mut(step)?;
                    if !execution.status.is_terminal() {
                        apply_execution_status(execution, status, false);
                    }
                }
            }

            debug!(step_id = %step_id, action = ?action_type, "action updated");
            Ok(())
        })
    }

    pub fn save_pipeline_state(
        &self,
        step_id: &str,
        state: PipelineSavedState,
    ) -> Result<Step, EngineError> {
        self.mutate(step_id, |step| {
            info!(step_id = %step.id, paused_at = %state.paused_at_task, "saving pipeline state");
            let execution = execution_mut(step)?;
            execution.pipeline_saved_state = Some(state);
            Ok(())
        })
    }

    pub fn clear_pipeline_state(&self, step_id: &str) -> Result<Step, EngineError> {
        self.mutate(step_id, |step| {
            let execution = execution_mut(step)?;
            execution.pipeline_saved_state = None;
            Ok(())
        })
    }

    /// Terminal success for the step's execution
    pub fn complete_execution(&self, step_id: &str) -> Result<Step, EngineError> {
        self.mutate(step_id, |step| {
            let execution = execution_mut(step)?;
            check_transition(execution.status, ExecutionStatus::Done, false)?;
            apply_execution_status(execution, ExecutionStatus::Done, false);
            execution.pipeline_saved_state = None;
            info!(step_id = %step.id, "execution done");
            Ok(())
        })
    }

    /// Terminal failure: records the taxonomy error on the execution and,
    /// when known, on the most recently active action.
    pub fn fail_execution(
        &self,
        step_id: &str,
        error: &EngineError,
        action_type: Option<ActionType>,
    ) -> Result<Step, EngineError> {
        self.mutate(step_id, |step| {
            let execution = execution_mut(step)?;
            let record = error.record();
            if let Some(action_type) = action_type {
                if let Some(action) = execution.action_mut(action_type) {
                    action.status = ExecutionStatus::Failed;
                    action.error = Some(record.clone());
                }
            }
            execution.error = Some(record);
            apply_execution_status(execution, ExecutionStatus::Failed, false);
            info!(step_id = %step.id, error = %error, "execution failed");
            Ok(())
        })
    }

    /// Replace quote-owned step fields after a refresh, preserving the
    /// execution record.
    pub fn replace_step(&self, refreshed: Step) -> Result<Step, EngineError> {
        self.mutate(&refreshed.id.clone(), |step| {
            let execution = step.execution.take();
            *step = refreshed.clone();
            step.execution = execution;
            Ok(())
        })
    }

    fn mutate<F>(&self, step_id: &str, f: F) -> Result<Step, EngineError>
    where
        F: FnOnce(&mut Step) -> Result<(), EngineError>,
    {
        let updated_route;
        let updated_step;
        {
            let mut route = self.route.lock().expect("route lock poisoned");
            let step = route
                .step_mut(step_id)
                .ok_or_else(|| EngineError::StepNotFound(step_id.to_string()))?;
            f(step)?;
            updated_step = step.clone();
            updated_route = route.clone();
        }
        if let Some(hook) = &self.on_update {
            hook(&updated_route);
        }
        Ok(updated_step)
    }
}

fn execution_mut(step: &mut Step) -> Result<&mut Execution, EngineError> {
    step.execution
        .as_mut()
        .ok_or_else(|| EngineError::Validation(format!("step {} has no execution", step.id)))
}

/// Stamp timestamps for a status entry and clear a stale substatus when the
/// status changes without an explicit new one. Timestamps are set once and
/// never moved backwards.
fn apply_execution_status(execution: &mut Execution, status: ExecutionStatus, keeps_substatus: bool) {
    let now = now_millis();
    if status != execution.status && !keeps_substatus {
        execution.substatus = None;
    }
    execution.status = status;
    match status {
        ExecutionStatus::Pending => {
            execution.pending_at.get_or_insert(now);
        }
        ExecutionStatus::ActionRequired
        | ExecutionStatus::MessageRequired
        | ExecutionStatus::ResetRequired => {
            execution.action_required_at.get_or_insert(now);
        }
        ExecutionStatus::Done | ExecutionStatus::Failed | ExecutionStatus::Cancelled => {
            execution.done_at.get_or_insert(now);
        }
        ExecutionStatus::Started => {}
    }
}

fn check_transition(
    current: ExecutionStatus,
    next: ExecutionStatus,
    reset: bool,
) -> Result<(), EngineError> {
    if current.is_terminal() && next != current && !reset {
        return Err(EngineError::InvalidTransition(format!(
            "{current:?} is terminal, cannot move to {next:?}"
        )));
    }
    Ok(())
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
