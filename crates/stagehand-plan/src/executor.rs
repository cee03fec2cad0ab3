//! Action executor — binds one action to the conditions that gate it.
//!
//! An executor is *immediate* when it has no conditions or any of them is
//! already satisfied; it then runs on the caller's task. Otherwise it is
//! deferred: it starts a worker per condition and reduces the set as
//! conditions settle, running the action once every one of them is
//! satisfied.

use std::fmt;
use std::sync::Arc;

use stagehand_core::SharedSystem;
use tokio::sync::{Notify, watch};
use tracing::{debug, info};

use crate::action::{ActionOutcome, LifecycleKey, ScheduledAction};
use crate::callback::OccurrenceCallback;
use crate::condition::{Condition, ConditionState};
use crate::error::PlanResult;

/// How a deferred executor finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorStatus {
    Executed(ActionOutcome),
    Cancelled,
}

pub struct ActionExecutor {
    action: ScheduledAction,
    conditions: Vec<Condition>,
    changed: Arc<Notify>,
    occurrence: Option<watch::Sender<bool>>,
    completed: bool,
}

impl ActionExecutor {
    pub fn new(action: ScheduledAction) -> Self {
        Self {
            action,
            conditions: Vec::new(),
            changed: Arc::new(Notify::new()),
            occurrence: None,
            completed: false,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn action(&self) -> &ScheduledAction {
        &self.action
    }

    pub fn lifecycle(&self) -> Option<LifecycleKey> {
        self.action.action().lifecycle()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// True when there is nothing to wait for, or when any condition is
    /// already satisfied.
    pub fn is_immediate(&self) -> bool {
        self.conditions.is_empty() || self.conditions.iter().any(Condition::is_satisfied)
    }

    /// Smallest sequence number across the conditions. `None` means
    /// unsequenced and orders before every explicit number.
    pub fn sort_order(&self) -> Option<u32> {
        self.conditions.iter().filter_map(Condition::sequence).min()
    }

    /// Subscribe to the moment this executor's action is invoked.
    ///
    /// The first subscription attaches the callback that fires the signal.
    pub fn occurrence_signal(&mut self) -> watch::Receiver<bool> {
        if let Some(tx) = &self.occurrence {
            return tx.subscribe();
        }
        let (tx, rx) = watch::channel(false);
        self.action
            .add_callback(Arc::new(OccurrenceCallback::new(tx.clone())));
        self.occurrence = Some(tx);
        rx
    }

    /// Run the action now, bypassing conditions.
    pub fn run_now(&mut self, system: &SharedSystem) -> PlanResult<ActionOutcome> {
        let outcome = self.action.invoke(system.as_ref())?;
        self.completed = true;
        Ok(outcome)
    }

    /// Run the executor to completion.
    ///
    /// Immediate executors invoke their action straight away. Deferred
    /// executors wait until every condition is satisfied, a condition
    /// fails (its error is returned), or `cancel` turns true.
    pub async fn run(
        mut self,
        system: SharedSystem,
        mut cancel: watch::Receiver<bool>,
    ) -> PlanResult<ExecutorStatus> {
        if self.is_immediate() {
            return self.run_now(&system).map(ExecutorStatus::Executed);
        }

        let owner = self.action.to_string();
        let mut active = std::mem::take(&mut self.conditions);
        for condition in &mut active {
            condition.start(&owner, self.changed.clone());
        }
        debug!(action = %owner, conditions = active.len(), "waiting on conditions");

        loop {
            tokio::select! {
                _ = self.changed.notified() => {}
                _ = cancelled(&mut cancel) => {}
            }

            if *cancel.borrow() {
                info!(action = %owner, "executor cancelled");
                halt_all(&mut active).await;
                return Ok(ExecutorStatus::Cancelled);
            }

            let mut index = 0;
            while index < active.len() {
                match active[index].state() {
                    ConditionState::Satisfied => {
                        let mut condition = active.remove(index);
                        condition.wait().await;
                        debug!(action = %owner, %condition, "condition satisfied");
                    }
                    ConditionState::Failed(err) => {
                        halt_all(&mut active).await;
                        return Err(err);
                    }
                    ConditionState::Pending => index += 1,
                }
            }

            if active.is_empty() {
                let outcome = self.run_now(&system)?;
                return Ok(ExecutorStatus::Executed(outcome));
            }
        }
    }
}

/// Resolve once `rx` reads true. A closed channel never resolves.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn halt_all(conditions: &mut [Condition]) {
    for condition in conditions.iter() {
        condition.cancel();
    }
    for condition in conditions.iter_mut() {
        condition.wait().await;
    }
}

impl fmt::Display for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return write!(f, "{}", self.action);
        }
        let conditions: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}] {}", conditions.join(", "), self.action)
    }
}

impl fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("action", &self.action)
            .field("conditions", &self.conditions)
            .field("completed", &self.completed)
            .finish()
    }
}
