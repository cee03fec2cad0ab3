//! Concrete actions against a managed system.
//!
//! Every action here is a thin call into [`ManagedSystem`]; client errors
//! become failed outcomes carrying the error text.

use std::fmt;

use stagehand_core::{Connection, ManagedSystem, Operation, TargetId};
use stagehand_plan::{Action, ActionOutcome, LifecycleKey};

/// Verify that a component is reachable.
#[derive(Debug, Clone)]
pub struct CheckComponent {
    pub component: String,
}

impl CheckComponent {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }
}

impl Action for CheckComponent {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome {
        if system.has_component(&self.component) {
            ActionOutcome::success()
        } else {
            ActionOutcome::failure(format!("component {} is not present", self.component))
        }
    }
}

impl fmt::Display for CheckComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check {} is present", self.component)
    }
}

/// Verify that a component exposes a port.
#[derive(Debug, Clone)]
pub struct CheckPort {
    pub component: String,
    pub port: String,
}

impl CheckPort {
    pub fn new(component: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            port: port.into(),
        }
    }
}

impl Action for CheckPort {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome {
        if system.has_port(&self.component, &self.port) {
            ActionOutcome::success()
        } else {
            ActionOutcome::failure(format!(
                "port {}.{} is not present",
                self.component, self.port
            ))
        }
    }
}

impl fmt::Display for CheckPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check port {}.{} is present", self.component, self.port)
    }
}

/// Make a configuration set the active one.
#[derive(Debug, Clone)]
pub struct ActivateConfigSet {
    pub component: String,
    pub set: String,
}

impl ActivateConfigSet {
    pub fn new(component: impl Into<String>, set: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            set: set.into(),
        }
    }
}

impl Action for ActivateConfigSet {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome {
        ActionOutcome::from_result(system.activate_config_set(&self.component, &self.set))
    }
}

impl fmt::Display for ActivateConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "activate configuration set {} on {}",
            self.set, self.component
        )
    }
}

/// Write one configuration value.
#[derive(Debug, Clone)]
pub struct SetConfigValue {
    pub component: String,
    pub set: String,
    pub key: String,
    pub value: String,
}

impl SetConfigValue {
    pub fn new(
        component: impl Into<String>,
        set: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            component: component.into(),
            set: set.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

impl Action for SetConfigValue {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome {
        ActionOutcome::from_result(system.set_config_value(
            &self.component,
            &self.set,
            &self.key,
            &self.value,
        ))
    }
}

impl fmt::Display for SetConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "set {}/{}.{} to {:?}",
            self.component, self.set, self.key, self.value
        )
    }
}

/// Connect two ports as described by a profile connection.
#[derive(Debug, Clone)]
pub struct ConnectPorts {
    pub connection: Connection,
}

impl ConnectPorts {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

impl Action for ConnectPorts {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome {
        ActionOutcome::from_result(system.connect(&self.connection))
    }
}

impl fmt::Display for ConnectPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.connection;
        write!(
            f,
            "connect {}.{} -> {}.{} ({})",
            c.source.component, c.source.port, c.target.component, c.target.port, c.id
        )
    }
}

/// Remove a connection.
#[derive(Debug, Clone)]
pub struct DisconnectPorts {
    pub connection: Connection,
}

impl DisconnectPorts {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

impl Action for DisconnectPorts {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome {
        ActionOutcome::from_result(system.disconnect(&self.connection))
    }
}

impl fmt::Display for DisconnectPorts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.connection;
        write!(
            f,
            "disconnect {}.{} -> {}.{} ({})",
            c.source.component, c.source.port, c.target.component, c.target.port, c.id
        )
    }
}

/// Drive one execution context through the transition of an operation.
///
/// The only catalog action that reports a lifecycle key, so profile
/// constraints attach to it.
#[derive(Debug, Clone)]
pub struct TransitionComponent {
    pub target: TargetId,
    pub operation: Operation,
}

impl TransitionComponent {
    pub fn new(target: TargetId, operation: Operation) -> Self {
        Self { target, operation }
    }
}

impl Action for TransitionComponent {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome {
        ActionOutcome::from_result(system.transition(&self.target, self.operation.transition()))
    }

    fn lifecycle(&self) -> Option<LifecycleKey> {
        Some(LifecycleKey {
            operation: self.operation,
            target: self.target.clone(),
        })
    }
}

impl fmt::Display for TransitionComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation.transition(), self.target)
    }
}
