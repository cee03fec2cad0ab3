//! stagehand-core — profile parsing and the managed-system client.
//!
//! A profile describes the components of a managed system, how their
//! ports are wired, which configuration they run with, and the ordering
//! constraints for the lifecycle operations applied to them. The
//! `ManagedSystem` trait is the seam through which actions reach the
//! live system.
//!
//! # Components
//!
//! - **`profile`** — TOML profile model, constraint lookup, validation
//! - **`system`** — target identities, lifecycle states, the client trait
//!   and an in-memory implementation
//! - **`error`** — profile and client error types

pub mod error;
pub mod profile;
pub mod system;

pub use error::{ProfileError, ProfileResult, SystemError, SystemResult};
pub use profile::{
    Component, ConfigurationSet, Connection, Constraint, ConstraintKind, PortRef, Preceding,
    Profile, ProfileMeta, Settings, Timing,
};
pub use system::{
    ComponentState, InMemorySystem, ManagedSystem, Operation, SharedSystem, SystemOverrides,
    TargetId, Transition,
};
