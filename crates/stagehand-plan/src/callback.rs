//! Outcome callbacks — what happens after an action has run.

use std::sync::Mutex;

use tokio::sync::watch;
use tracing::warn;

use crate::action::ActionOutcome;
use crate::error::{PlanError, PlanResult};

/// Consumer of an action outcome.
pub trait Callback: Send + Sync {
    /// Handle the outcome of the named action. An error aborts the plan.
    fn on_outcome(&self, action: &str, outcome: &ActionOutcome) -> PlanResult<()>;

    /// Whether this callback surfaces failures. Actions whose callbacks
    /// all return `false` also get a best-effort report.
    fn reports_outcome(&self) -> bool {
        true
    }
}

/// Logs failures and carries on.
#[derive(Debug, Default, Clone, Copy)]
pub struct BestEffortCallback;

impl Callback for BestEffortCallback {
    fn on_outcome(&self, action: &str, outcome: &ActionOutcome) -> PlanResult<()> {
        if !outcome.ok {
            warn!(%action, message = outcome.message_or_default(), "action failed");
        }
        Ok(())
    }
}

/// Fails the plan when its action fails.
///
/// One instance may be shared by a batch of actions; it remembers every
/// failure it saw so the batch can be inspected afterwards.
#[derive(Debug, Default)]
pub struct RequiredCallback {
    failures: Mutex<Vec<String>>,
}

impl RequiredCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_failed(&self) -> bool {
        !self.failures.lock().expect("failures lock").is_empty()
    }

    /// Diagnostics of every failed action, in the order they were seen.
    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().expect("failures lock").clone()
    }
}

impl Callback for RequiredCallback {
    fn on_outcome(&self, action: &str, outcome: &ActionOutcome) -> PlanResult<()> {
        if outcome.ok {
            return Ok(());
        }
        let message = outcome.message_or_default().to_string();
        self.failures
            .lock()
            .expect("failures lock")
            .push(format!("{action}: {message}"));
        Err(PlanError::RequiredActionFailed {
            action: action.to_string(),
            message,
        })
    }
}

/// Announces that an action has been invoked, whatever its outcome.
///
/// Attached by the plan to every action that another action waits on
/// "on occurrence"; event-wait conditions hold the receiving side.
#[derive(Debug)]
pub struct OccurrenceCallback {
    signal: watch::Sender<bool>,
}

impl OccurrenceCallback {
    pub fn new(signal: watch::Sender<bool>) -> Self {
        Self { signal }
    }
}

impl Callback for OccurrenceCallback {
    fn on_outcome(&self, _action: &str, _outcome: &ActionOutcome) -> PlanResult<()> {
        self.signal.send_replace(true);
        Ok(())
    }

    fn reports_outcome(&self) -> bool {
        false
    }
}
