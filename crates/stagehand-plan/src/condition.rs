//! Conditions — gates that must be satisfied before an action may run.
//!
//! Every condition moves `Pending → Satisfied` or `Pending → Failed`; both
//! end states are terminal. Immediate conditions are born satisfied. The
//! other kinds run on their own tokio task once started, write their end
//! state into a shared cell, and wake the owning executor through its
//! `Notify`.
//!
//! Cancelling a condition stops its worker without a transition: the cell
//! stays `Pending` and the gated action never runs.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::PlanError;

/// Predicate evaluated by a state-poll condition.
pub type Probe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Observable state of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionState {
    Pending,
    Satisfied,
    Failed(PlanError),
}

enum ConditionKind {
    Immediate,
    Timer {
        delay: Duration,
    },
    EventWait {
        dependency: String,
        signal: watch::Receiver<bool>,
        timeout: Duration,
    },
    StatePoll {
        dependency: String,
        probe: Probe,
        timeout: Duration,
        interval: Duration,
    },
}

/// A gate on one action.
pub struct Condition {
    sequence: Option<u32>,
    kind: ConditionKind,
    state: Arc<Mutex<ConditionState>>,
    halt: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl Condition {
    fn with_kind(sequence: Option<u32>, kind: ConditionKind, state: ConditionState) -> Self {
        let (halt, _) = watch::channel(false);
        Self {
            sequence,
            kind,
            state: Arc::new(Mutex::new(state)),
            halt,
            worker: None,
        }
    }

    /// A sequence-only condition; satisfied from the start.
    pub fn immediate(sequence: Option<u32>) -> Self {
        Self::with_kind(sequence, ConditionKind::Immediate, ConditionState::Satisfied)
    }

    /// Satisfied once `delay` has elapsed after the condition is started.
    pub fn timer(sequence: Option<u32>, delay: Duration) -> Self {
        Self::with_kind(
            sequence,
            ConditionKind::Timer { delay },
            ConditionState::Pending,
        )
    }

    /// Satisfied when `signal` turns true; fails if that does not happen
    /// within `timeout`.
    pub fn event_wait(
        sequence: Option<u32>,
        dependency: impl Into<String>,
        signal: watch::Receiver<bool>,
        timeout: Duration,
    ) -> Self {
        Self::with_kind(
            sequence,
            ConditionKind::EventWait {
                dependency: dependency.into(),
                signal,
                timeout,
            },
            ConditionState::Pending,
        )
    }

    /// Satisfied when `probe()` returns `target`, checked every `interval`;
    /// fails if that does not happen within `timeout`.
    pub fn state_poll<T, F>(
        sequence: Option<u32>,
        dependency: impl Into<String>,
        probe: F,
        target: T,
        timeout: Duration,
        interval: Duration,
    ) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        let probe: Probe = Arc::new(move || probe() == target);
        Self::with_kind(
            sequence,
            ConditionKind::StatePoll {
                dependency: dependency.into(),
                probe,
                timeout,
                interval,
            },
            ConditionState::Pending,
        )
    }

    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    pub fn state(&self) -> ConditionState {
        self.state.lock().expect("condition lock").clone()
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self.state(), ConditionState::Satisfied)
    }

    /// The error captured when the condition failed.
    pub fn error(&self) -> Option<PlanError> {
        match self.state() {
            ConditionState::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether `start` will spawn a worker for this condition.
    pub fn needs_worker(&self) -> bool {
        !matches!(self.kind, ConditionKind::Immediate)
    }

    /// Launch the background worker. `owner` names the gated action in
    /// timeout errors; `changed` is signalled on every transition.
    pub fn start(&mut self, owner: &str, changed: Arc<Notify>) {
        if self.worker.is_some() || !matches!(self.state(), ConditionState::Pending) {
            return;
        }
        let cell = Cell {
            state: self.state.clone(),
            changed,
        };
        let halt = self.halt.subscribe();
        let owner = owner.to_string();

        let handle = match &self.kind {
            ConditionKind::Immediate => return,
            ConditionKind::Timer { delay } => tokio::spawn(run_timer(*delay, cell, halt)),
            ConditionKind::EventWait {
                dependency,
                signal,
                timeout,
            } => tokio::spawn(run_event_wait(
                Budget::new(owner, dependency.clone(), *timeout),
                signal.clone(),
                cell,
                halt,
            )),
            ConditionKind::StatePoll {
                dependency,
                probe,
                timeout,
                interval,
            } => tokio::spawn(run_state_poll(
                Budget::new(owner, dependency.clone(), *timeout),
                probe.clone(),
                *interval,
                cell,
                halt,
            )),
        };
        self.worker = Some(handle);
    }

    /// Ask the worker to stop at its next wake without transitioning.
    pub fn cancel(&self) {
        self.halt.send_replace(true);
    }

    /// Wait for the worker to finish. Immediate and timer conditions have
    /// nothing to join.
    pub async fn wait(&mut self) {
        match self.kind {
            ConditionKind::Immediate | ConditionKind::Timer { .. } => {}
            ConditionKind::EventWait { .. } | ConditionKind::StatePoll { .. } => {
                if let Some(handle) = self.worker.take() {
                    if let Err(e) = handle.await {
                        warn!(error = %e, "condition worker did not finish cleanly");
                    }
                }
            }
        }
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        self.halt.send_replace(true);
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConditionKind::Immediate => match self.sequence {
                Some(seq) => write!(f, "sequence {seq}"),
                None => f.write_str("immediately"),
            },
            ConditionKind::Timer { delay } => write!(f, "wait {delay:?}"),
            ConditionKind::EventWait {
                dependency,
                timeout,
                ..
            } => write!(f, "after {dependency} occurs (timeout {timeout:?})"),
            ConditionKind::StatePoll {
                dependency,
                timeout,
                interval,
                ..
            } => write!(
                f,
                "after {dependency} (timeout {timeout:?}, every {interval:?})"
            ),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("kind", &self.to_string())
            .field("sequence", &self.sequence)
            .field("state", &self.state())
            .finish()
    }
}

/// Shared state cell plus the owning executor's wake-up signal.
struct Cell {
    state: Arc<Mutex<ConditionState>>,
    changed: Arc<Notify>,
}

impl Cell {
    fn settle(&self, state: ConditionState) {
        {
            let mut current = self.state.lock().expect("condition lock");
            if *current != ConditionState::Pending {
                return;
            }
            *current = state;
        }
        self.changed.notify_one();
    }
}

/// Timeout budget of a waiting condition, measured from a fixed deadline.
struct Budget {
    owner: String,
    dependency: String,
    timeout: Duration,
    deadline: Instant,
}

impl Budget {
    fn new(owner: String, dependency: String, timeout: Duration) -> Self {
        Self {
            owner,
            dependency,
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    fn expired(&self) -> ConditionState {
        ConditionState::Failed(PlanError::PrecedingTimeout {
            action: self.owner.clone(),
            dependency: self.dependency.clone(),
            timeout: self.timeout,
        })
    }
}

async fn run_timer(delay: Duration, cell: Cell, mut halt: watch::Receiver<bool>) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => cell.settle(ConditionState::Satisfied),
        _ = halt.wait_for(|h| *h) => debug!(?delay, "timer cancelled"),
    }
}

async fn run_event_wait(
    budget: Budget,
    mut signal: watch::Receiver<bool>,
    cell: Cell,
    mut halt: watch::Receiver<bool>,
) {
    let mut signal_open = true;
    loop {
        if *halt.borrow() {
            debug!(dependency = %budget.dependency, "event wait cancelled");
            return;
        }
        if *signal.borrow_and_update() {
            debug!(dependency = %budget.dependency, "event observed");
            cell.settle(ConditionState::Satisfied);
            return;
        }
        let remaining = budget.remaining();
        if remaining.is_zero() {
            warn!(action = %budget.owner, dependency = %budget.dependency, "event wait timed out");
            cell.settle(budget.expired());
            return;
        }
        tokio::select! {
            changed = signal.changed(), if signal_open => {
                // A dropped sender can never fire; keep waiting out the budget.
                if changed.is_err() {
                    signal_open = false;
                }
            }
            _ = tokio::time::sleep(remaining) => {}
            changed = halt.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

async fn run_state_poll(
    budget: Budget,
    probe: Probe,
    interval: Duration,
    cell: Cell,
    mut halt: watch::Receiver<bool>,
) {
    loop {
        if *halt.borrow() {
            debug!(dependency = %budget.dependency, "state poll cancelled");
            return;
        }
        if probe() {
            debug!(dependency = %budget.dependency, "state reached");
            cell.settle(ConditionState::Satisfied);
            return;
        }
        let remaining = budget.remaining();
        if remaining.is_zero() {
            warn!(action = %budget.owner, dependency = %budget.dependency, "state poll timed out");
            cell.settle(budget.expired());
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval.min(remaining)) => {}
            changed = halt.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    const MS: Duration = Duration::from_millis(1);

    async fn settle_within(changed: &Notify, limit: Duration) -> bool {
        tokio::time::timeout(limit, changed.notified()).await.is_ok()
    }

    #[test]
    fn immediate_is_born_satisfied() {
        let c = Condition::immediate(Some(4));
        assert!(c.is_satisfied());
        assert_eq!(c.sequence(), Some(4));
        assert!(!c.needs_worker());
        assert_eq!(c.to_string(), "sequence 4");
        assert_eq!(Condition::immediate(None).to_string(), "immediately");
    }

    #[tokio::test]
    async fn timer_satisfies_after_delay() {
        let changed = Arc::new(Notify::new());
        let mut c = Condition::timer(None, 20 * MS);
        assert_eq!(c.state(), ConditionState::Pending);

        c.start("act", changed.clone());
        assert!(settle_within(&changed, Duration::from_secs(1)).await);
        assert!(c.is_satisfied());
        c.wait().await;
    }

    #[tokio::test]
    async fn timer_cancel_leaves_pending() {
        let changed = Arc::new(Notify::new());
        let mut c = Condition::timer(None, 50 * MS);
        c.start("act", changed.clone());
        c.cancel();

        assert!(!settle_within(&changed, 100 * MS).await);
        assert_eq!(c.state(), ConditionState::Pending);
    }

    #[tokio::test]
    async fn event_wait_satisfied_by_signal() {
        let changed = Arc::new(Notify::new());
        let (tx, rx) = watch::channel(false);
        let mut c = Condition::event_wait(None, "camera:0", rx, Duration::from_secs(5));
        c.start("act", changed.clone());

        tokio::time::sleep(10 * MS).await;
        assert_eq!(c.state(), ConditionState::Pending);
        tx.send_replace(true);

        assert!(settle_within(&changed, Duration::from_secs(1)).await);
        c.wait().await;
        assert!(c.is_satisfied());
        assert!(c.error().is_none());
    }

    #[tokio::test]
    async fn event_wait_sees_signal_fired_before_start() {
        let changed = Arc::new(Notify::new());
        let (tx, rx) = watch::channel(false);
        tx.send_replace(true);
        let mut c = Condition::event_wait(None, "camera:0", rx, Duration::from_secs(5));
        c.start("act", changed.clone());
        c.wait().await;
        assert!(c.is_satisfied());
    }

    #[tokio::test]
    async fn event_wait_times_out() {
        let changed = Arc::new(Notify::new());
        let (_tx, rx) = watch::channel(false);
        let mut c = Condition::event_wait(None, "camera:0", rx, 30 * MS);
        c.start("activate viewer", changed.clone());
        c.wait().await;

        assert_eq!(
            c.error(),
            Some(PlanError::PrecedingTimeout {
                action: "activate viewer".to_string(),
                dependency: "camera:0".to_string(),
                timeout: 30 * MS,
            })
        );
    }

    #[tokio::test]
    async fn event_wait_with_dropped_sender_still_times_out() {
        let changed = Arc::new(Notify::new());
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let mut c = Condition::event_wait(None, "camera:0", rx, 30 * MS);
        c.start("act", changed);
        c.wait().await;
        assert!(matches!(c.error(), Some(PlanError::PrecedingTimeout { .. })));
    }

    #[tokio::test]
    async fn state_poll_satisfied_when_probe_matches() {
        let changed = Arc::new(Notify::new());
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut c = Condition::state_poll(
            Some(2),
            "camera:0",
            move || counter.fetch_add(1, Ordering::SeqCst) + 1,
            3,
            Duration::from_secs(5),
            5 * MS,
        );
        c.start("act", changed.clone());
        c.wait().await;

        assert!(c.is_satisfied());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn state_poll_times_out() {
        let changed = Arc::new(Notify::new());
        let mut c = Condition::state_poll(None, "camera:0", || "inactive", "active", 25 * MS, 5 * MS);
        c.start("act", changed.clone());
        assert!(settle_within(&changed, Duration::from_secs(1)).await);
        assert!(matches!(c.error(), Some(PlanError::PrecedingTimeout { .. })));
        c.wait().await;
    }

    #[tokio::test]
    async fn state_poll_cancel_exits_within_interval() {
        let changed = Arc::new(Notify::new());
        let probed = Arc::new(AtomicBool::new(false));
        let flag = probed.clone();
        let mut c = Condition::state_poll(
            None,
            "camera:0",
            move || {
                flag.store(true, Ordering::SeqCst);
                false
            },
            true,
            Duration::from_secs(30),
            20 * MS,
        );
        c.start("act", changed.clone());
        tokio::time::sleep(5 * MS).await;
        c.cancel();

        tokio::time::timeout(40 * MS, c.wait())
            .await
            .expect("worker should exit promptly");
        assert!(probed.load(Ordering::SeqCst));
        assert_eq!(c.state(), ConditionState::Pending);
    }

    #[test]
    fn display_describes_condition() {
        let (_tx, rx) = watch::channel(false);
        let c = Condition::event_wait(None, "camera:0", rx, Duration::from_secs(2));
        assert_eq!(c.to_string(), "after camera:0 occurs (timeout 2s)");
        let t = Condition::timer(Some(1), 250 * MS);
        assert_eq!(t.to_string(), "wait 250ms");
    }
}
