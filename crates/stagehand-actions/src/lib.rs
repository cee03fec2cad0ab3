//! stagehand-actions — what the front ends actually do.
//!
//! # Components
//!
//! - **catalog**: concrete [`Action`](stagehand_plan::Action)s against a
//!   [`ManagedSystem`](stagehand_core::ManagedSystem): presence checks,
//!   configuration, connections and lifecycle transitions.
//! - **phase**: builders that turn a profile into the action list of one
//!   front-end command.

pub mod catalog;
pub mod phase;

pub use catalog::{
    ActivateConfigSet, CheckComponent, CheckPort, ConnectPorts, DisconnectPorts, SetConfigValue,
    TransitionComponent,
};
pub use phase::{Phase, check, lifecycle, resurrect, teardown};
