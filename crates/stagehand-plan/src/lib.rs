//! stagehand-plan — the action scheduler.
//!
//! Turns a flat list of actions plus a profile's ordering constraints into
//! an ordered, partly concurrent execution with fail-fast semantics for
//! required actions and bounded waiting for dependencies.
//!
//! # Architecture
//!
//! ```text
//! Plan
//!   ├── immediate executors (run in sequence order on the caller's task)
//!   └── deferred executors (one task each)
//!       └── conditions (one worker task each: timer, event wait, state poll)
//!            └── signal the executor's Notify on every transition
//! ```
//!
//! An executor is immediate when any of its conditions is satisfied up
//! front; a deferred executor runs only once all of its conditions are.

pub mod action;
pub mod callback;
pub mod condition;
pub mod error;
pub mod executor;
pub mod plan;

pub use action::{Action, ActionOutcome, LifecycleKey, ScheduledAction};
pub use callback::{BestEffortCallback, Callback, OccurrenceCallback, RequiredCallback};
pub use condition::{Condition, ConditionState, Probe};
pub use error::{PlanError, PlanResult};
pub use executor::{ActionExecutor, ExecutorStatus};
pub use plan::{CancelHandle, Plan, PlanReport};
