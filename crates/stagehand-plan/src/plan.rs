//! Plan — builds executors from a profile and drives their execution.
//!
//! `Plan::build` wires each lifecycle action to the constraints the
//! profile declares for it and splits the executors into an immediate
//! group and a deferred group. `Plan::execute` runs the immediate group
//! in sequence order on the caller's task, then spawns every deferred
//! executor into a join set and drains it. Only the task running
//! `execute` touches the join set; a panicking executor aborts the plan
//! like a failed one.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use stagehand_core::{ConstraintKind, Operation, Profile, SharedSystem, Timing};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::action::{ActionOutcome, LifecycleKey, ScheduledAction};
use crate::condition::Condition;
use crate::error::{PlanError, PlanResult};
use crate::executor::{ActionExecutor, ExecutorStatus};

/// Outcome of every action that ran, in completion order.
#[derive(Debug, Clone, Default)]
pub struct PlanReport {
    pub outcomes: Vec<(String, ActionOutcome)>,
}

impl PlanReport {
    pub fn executed(&self) -> usize {
        self.outcomes.len()
    }

    /// Actions that ran and reported failure without aborting the plan.
    pub fn failures(&self) -> impl Iterator<Item = &(String, ActionOutcome)> {
        self.outcomes.iter().filter(|(_, outcome)| !outcome.ok)
    }
}

/// Cancels a plan from outside the task executing it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    signal: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if !self.signal.send_replace(true) {
            info!("plan cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.borrow()
    }
}

/// The system a plan runs against, bound once `execute` starts.
type SystemSlot = Arc<OnceLock<SharedSystem>>;

struct Completion {
    action: String,
    result: PlanResult<ExecutorStatus>,
}

pub struct Plan {
    immediate: Vec<ActionExecutor>,
    deferred: Vec<ActionExecutor>,
    system: SystemSlot,
    cancel: CancelHandle,
}

impl Plan {
    /// Build a plan for `actions` using the constraints in `profile`.
    ///
    /// Every constraint of an operation the actions perform must target
    /// one of the actions, and so must every dependency.
    pub fn build(profile: &Profile, actions: Vec<ScheduledAction>) -> PlanResult<Self> {
        let mut executors: Vec<ActionExecutor> =
            actions.into_iter().map(ActionExecutor::new).collect();

        let mut index: HashMap<LifecycleKey, usize> = HashMap::new();
        for (i, executor) in executors.iter().enumerate() {
            if let Some(key) = executor.lifecycle() {
                if index.contains_key(&key) {
                    return Err(PlanError::DuplicateTarget {
                        operation: key.operation.to_string(),
                        target: key.target.to_string(),
                    });
                }
                index.insert(key, i);
            }
        }

        let operations: BTreeSet<Operation> = index.keys().map(|k| k.operation).collect();
        for operation in operations {
            for constraint in profile.section(operation) {
                let key = LifecycleKey {
                    operation,
                    target: constraint.target(),
                };
                if !index.contains_key(&key) {
                    return Err(PlanError::UnknownTarget {
                        operation: operation.to_string(),
                        target: key.target.to_string(),
                    });
                }
            }
        }

        let system: SystemSlot = Arc::new(OnceLock::new());
        let settings = &profile.settings;
        for i in 0..executors.len() {
            let Some(key) = executors[i].lifecycle() else {
                continue;
            };
            let owner = executors[i].action().to_string();

            for constraint in profile.constraints_for(key.operation, &key.target) {
                let sequence = constraint.sequence;
                match constraint.kind() {
                    ConstraintKind::Sequence => {
                        executors[i].add_condition(Condition::immediate(sequence));
                    }
                    ConstraintKind::WaitTime(delay) => {
                        executors[i].add_condition(Condition::timer(sequence, delay));
                    }
                    ConstraintKind::Preceding(preceding) => {
                        let timeout = preceding.timeout(settings);
                        for dep in &preceding.targets {
                            let dep_key = LifecycleKey {
                                operation: key.operation,
                                target: dep.clone(),
                            };
                            let Some(&j) = index.get(&dep_key) else {
                                return Err(PlanError::UnknownDependency {
                                    action: owner,
                                    dependency: dep.to_string(),
                                });
                            };
                            if !profile.is_required(&dep.component) {
                                warn!(
                                    action = %owner,
                                    dependency = %dep,
                                    "depends on an optional component; if it is absent this wait can only time out"
                                );
                            }

                            let condition = match preceding.timing {
                                Timing::OnOccurrence => {
                                    let signal = executors[j].occurrence_signal();
                                    Condition::event_wait(sequence, dep.to_string(), signal, timeout)
                                }
                                Timing::OnCompletion => {
                                    let expected = key.operation.transition().expected_state();
                                    let probe_system = system.clone();
                                    let probe_target = dep.clone();
                                    Condition::state_poll(
                                        sequence,
                                        format!("{dep} to become {expected}"),
                                        move || {
                                            probe_system
                                                .get()
                                                .and_then(|s| s.component_state(&probe_target).ok())
                                        },
                                        Some(expected),
                                        timeout,
                                        settings.poll_interval(),
                                    )
                                }
                            };
                            executors[i].add_condition(condition);
                        }
                    }
                }
            }
        }

        let (mut immediate, mut deferred): (Vec<_>, Vec<_>) =
            executors.into_iter().partition(ActionExecutor::is_immediate);
        immediate.sort_by_key(ActionExecutor::sort_order);
        deferred.sort_by_key(ActionExecutor::sort_order);

        let (signal, _) = watch::channel(false);
        debug!(
            profile = %profile.profile.id,
            immediate = immediate.len(),
            deferred = deferred.len(),
            "plan built"
        );
        Ok(Self {
            immediate,
            deferred,
            system,
            cancel: CancelHandle {
                signal: Arc::new(signal),
            },
        })
    }

    /// Executors that run on the caller's task, in execution order.
    pub fn immediate(&self) -> &[ActionExecutor] {
        &self.immediate
    }

    /// Executors that wait on conditions.
    pub fn deferred(&self) -> &[ActionExecutor] {
        &self.deferred
    }

    pub fn len(&self) -> usize {
        self.immediate.len() + self.deferred.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Stop every deferred executor at its next wake. Their actions do not
    /// run and `execute` returns `PlanError::Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run the plan against `system`.
    ///
    /// Actions and state probes both use `system`. Returns the first
    /// required-action failure or condition timeout; actions that already
    /// ran stay applied.
    pub async fn execute(self, system: SharedSystem) -> PlanResult<PlanReport> {
        let Plan {
            immediate,
            deferred,
            system: slot,
            cancel,
        } = self;
        // `execute` consumes the plan, so the slot is always empty here.
        let _ = slot.set(system.clone());
        debug!(
            immediate = immediate.len(),
            deferred = deferred.len(),
            "executing plan"
        );

        let mut report = PlanReport::default();
        for mut executor in immediate {
            if cancel.is_cancelled() {
                return Err(PlanError::Cancelled);
            }
            let outcome = executor.run_now(&system)?;
            report.outcomes.push((executor.action().to_string(), outcome));
        }

        let mut tasks = JoinSet::new();
        for executor in deferred {
            let action = executor.action().to_string();
            let system = system.clone();
            let rx = cancel.signal.subscribe();
            tasks.spawn(async move {
                let result = executor.run(system, rx).await;
                Completion {
                    action,
                    result,
                }
            });
        }

        let mut first_error: Option<PlanError> = None;
        let mut cancelled = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let done = match joined {
                Ok(done) => done,
                Err(e) => {
                    if first_error.is_none() {
                        error!(error = %e, "executor task failed, aborting plan");
                        cancel.signal.send_replace(true);
                        first_error = Some(PlanError::Worker(e.to_string()));
                    }
                    continue;
                }
            };
            match done.result {
                Ok(ExecutorStatus::Executed(outcome)) => {
                    report.outcomes.push((done.action, outcome));
                }
                Ok(ExecutorStatus::Cancelled) => cancelled += 1,
                Err(e) => {
                    if first_error.is_none() {
                        error!(action = %done.action, error = %e, "aborting plan");
                        cancel.signal.send_replace(true);
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancelled > 0 {
            return Err(PlanError::Cancelled);
        }
        debug!(executed = report.executed(), "plan complete");
        Ok(report)
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("immediate", &self.immediate)
            .field("deferred", &self.deferred)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl fmt::Display for Plan {
    /// Dry-run rendering: every executor in execution order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut step = 1;
        for executor in &self.immediate {
            writeln!(f, "{step:>3}. {executor}")?;
            step += 1;
        }
        if !self.deferred.is_empty() {
            writeln!(f, "  -- concurrently, once their conditions hold --")?;
            for executor in &self.deferred {
                writeln!(f, "{step:>3}. {executor}")?;
                step += 1;
            }
        }
        Ok(())
    }
}
