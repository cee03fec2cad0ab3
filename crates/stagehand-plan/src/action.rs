//! Action contract — one unit of work against one target.

use std::fmt;
use std::sync::Arc;

use stagehand_core::{ManagedSystem, Operation, TargetId};
use tracing::debug;

use crate::callback::{BestEffortCallback, Callback};
use crate::error::PlanResult;

/// Result of running an action: pass/fail plus an optional diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub ok: bool,
    pub message: Option<String>,
}

impl ActionOutcome {
    pub fn success() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }

    /// Map a client result onto an outcome, keeping the error text.
    pub fn from_result<E: fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(e) => Self::failure(e.to_string()),
        }
    }

    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("no diagnostic")
    }
}

/// The operation and target a profile can constrain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LifecycleKey {
    pub operation: Operation,
    pub target: TargetId,
}

/// A single operation applied to the managed system.
///
/// `Display` renders the human-readable description used in dry runs and
/// diagnostics. Implementations must be safe to run exactly once and must
/// not spawn background work of their own.
pub trait Action: Send + Sync + fmt::Display {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome;

    /// Lifecycle actions report the operation and target they perform so
    /// the plan can attach the profile's constraints to them.
    fn lifecycle(&self) -> Option<LifecycleKey> {
        None
    }
}

/// An action together with the callbacks that consume its outcome.
pub struct ScheduledAction {
    action: Box<dyn Action>,
    callbacks: Vec<Arc<dyn Callback>>,
}

impl ScheduledAction {
    pub fn new(action: impl Action + 'static) -> Self {
        Self::from_boxed(Box::new(action))
    }

    pub fn from_boxed(action: Box<dyn Action>) -> Self {
        Self {
            action,
            callbacks: Vec::new(),
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn add_callback(&mut self, callback: Arc<dyn Callback>) {
        self.callbacks.push(callback);
    }

    pub fn action(&self) -> &dyn Action {
        self.action.as_ref()
    }

    pub fn callbacks(&self) -> &[Arc<dyn Callback>] {
        &self.callbacks
    }

    /// Run the action and hand its outcome to every callback in
    /// attachment order.
    ///
    /// When no attached callback reports outcomes, a best-effort callback
    /// is used so failures still surface. All callbacks see the outcome;
    /// the first callback error is returned.
    pub fn invoke(&self, system: &dyn ManagedSystem) -> PlanResult<ActionOutcome> {
        let description = self.action.to_string();
        debug!(action = %description, "running action");
        let outcome = self.action.run(system);

        if !self.callbacks.iter().any(|cb| cb.reports_outcome()) {
            BestEffortCallback.on_outcome(&description, &outcome)?;
        }

        let mut first_error = None;
        for callback in &self.callbacks {
            if let Err(e) = callback.on_outcome(&description, &outcome) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }
}

impl fmt::Display for ScheduledAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.action)
    }
}

impl fmt::Debug for ScheduledAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledAction")
            .field("action", &self.action.to_string())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
