//! Managed-system client — the live handle actions operate against.
//!
//! The `ManagedSystem` trait is deliberately synchronous: every call is a
//! short request against the system's control surface. `InMemorySystem`
//! keeps the whole system model behind a single `RwLock` and is used by
//! the CLI and by tests.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProfileResult, SystemError, SystemResult};
use crate::profile::{Connection, Profile};

/// Shared handle to a managed system.
pub type SharedSystem = Arc<dyn ManagedSystem>;

/// A component together with one of its execution contexts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId {
    pub component: String,
    #[serde(default)]
    pub ec: u32,
}

impl TargetId {
    pub fn new(component: impl Into<String>, ec: u32) -> Self {
        Self {
            component: component.into(),
            ec,
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component, self.ec)
    }
}

/// Lifecycle state of a component in one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    Created,
    Inactive,
    Active,
    Error,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComponentState::Created => "created",
            ComponentState::Inactive => "inactive",
            ComponentState::Active => "active",
            ComponentState::Error => "error",
        };
        f.write_str(s)
    }
}

/// A lifecycle transition requested in an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Activate,
    Deactivate,
    Reset,
}

impl Transition {
    /// The state a component settles in once this transition completes.
    pub fn expected_state(self) -> ComponentState {
        match self {
            Transition::Activate => ComponentState::Active,
            Transition::Deactivate | Transition::Reset => ComponentState::Inactive,
        }
    }

    /// The state a component must be in for this transition to apply.
    fn required_state(self) -> ComponentState {
        match self {
            Transition::Activate => ComponentState::Inactive,
            Transition::Deactivate => ComponentState::Active,
            Transition::Reset => ComponentState::Error,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transition::Activate => "activate",
            Transition::Deactivate => "deactivate",
            Transition::Reset => "reset",
        };
        f.write_str(s)
    }
}

/// A profile section that carries ordering constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Activation,
    Deactivation,
    Resetting,
}

impl Operation {
    pub fn transition(self) -> Transition {
        match self {
            Operation::Activation => Transition::Activate,
            Operation::Deactivation => Transition::Deactivate,
            Operation::Resetting => Transition::Reset,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operation::Activation => "activation",
            Operation::Deactivation => "deactivation",
            Operation::Resetting => "resetting",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Client interface to the managed system.
pub trait ManagedSystem: Send + Sync {
    /// Whether a component with this id is reachable.
    fn has_component(&self, component: &str) -> bool;

    /// Whether the component exposes the named port.
    fn has_port(&self, component: &str, port: &str) -> bool;

    /// Current lifecycle state of a component in an execution context.
    fn component_state(&self, target: &TargetId) -> SystemResult<ComponentState>;

    /// Request a lifecycle transition.
    fn transition(&self, target: &TargetId, transition: Transition) -> SystemResult<()>;

    fn activate_config_set(&self, component: &str, set: &str) -> SystemResult<()>;

    fn set_config_value(&self, component: &str, set: &str, key: &str, value: &str)
    -> SystemResult<()>;

    fn connect(&self, connection: &Connection) -> SystemResult<()>;

    fn disconnect(&self, connection: &Connection) -> SystemResult<()>;

    fn is_connected(&self, connection_id: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
struct ComponentModel {
    ports: BTreeSet<String>,
    contexts: BTreeMap<u32, ComponentState>,
    config_sets: BTreeMap<String, BTreeMap<String, String>>,
    active_set: Option<String>,
}

#[derive(Debug, Default)]
struct SystemModel {
    components: BTreeMap<String, ComponentModel>,
    connections: BTreeMap<String, Connection>,
    history: Vec<String>,
}

/// Thread-safe in-memory managed system.
#[derive(Debug, Default)]
pub struct InMemorySystem {
    model: RwLock<SystemModel>,
}

impl InMemorySystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a system with every component of the profile present and
    /// inactive in each of its execution contexts.
    pub fn from_profile(profile: &Profile) -> Self {
        let system = Self::new();
        {
            let mut model = system.model.write().expect("system lock");
            for component in &profile.components {
                let mut entry = ComponentModel {
                    ports: component.ports.iter().cloned().collect(),
                    ..Default::default()
                };
                for ec in component.context_ids() {
                    entry.contexts.insert(ec, ComponentState::Inactive);
                }
                for set in &component.configuration_sets {
                    entry
                        .config_sets
                        .insert(set.id.clone(), set.values.clone().into_iter().collect());
                }
                model.components.insert(component.id.clone(), entry);
            }
        }
        debug!(components = profile.components.len(), "seeded in-memory system");
        system
    }

    /// Register a component with the given ports and execution contexts.
    pub fn add_component(&self, id: &str, ports: &[&str], contexts: &[u32]) {
        let mut model = self.model.write().expect("system lock");
        let entry = model.components.entry(id.to_string()).or_default();
        entry.ports.extend(ports.iter().map(|p| p.to_string()));
        for ec in contexts {
            entry.contexts.insert(*ec, ComponentState::Inactive);
        }
    }

    /// Add a configuration set to a registered component.
    pub fn add_config_set(&self, component: &str, set: &str) {
        let mut model = self.model.write().expect("system lock");
        if let Some(entry) = model.components.get_mut(component) {
            entry.config_sets.entry(set.to_string()).or_default();
        }
    }

    pub fn remove_component(&self, id: &str) {
        let mut model = self.model.write().expect("system lock");
        model.components.remove(id);
    }

    /// Force a component into a state, bypassing transition rules.
    pub fn set_state(&self, target: &TargetId, state: ComponentState) {
        let mut model = self.model.write().expect("system lock");
        if let Some(entry) = model.components.get_mut(&target.component) {
            entry.contexts.insert(target.ec, state);
        }
    }

    /// Set every execution context of a component to a state.
    pub fn set_component_state(&self, component: &str, state: ComponentState) {
        let mut model = self.model.write().expect("system lock");
        if let Some(entry) = model.components.get_mut(component) {
            for s in entry.contexts.values_mut() {
                *s = state;
            }
        }
    }

    pub fn active_config_set(&self, component: &str) -> Option<String> {
        let model = self.model.read().expect("system lock");
        model.components.get(component)?.active_set.clone()
    }

    pub fn config_value(&self, component: &str, set: &str, key: &str) -> Option<String> {
        let model = self.model.read().expect("system lock");
        model
            .components
            .get(component)?
            .config_sets
            .get(set)?
            .get(key)
            .cloned()
    }

    /// Every mutating request applied so far, oldest first.
    pub fn history(&self) -> Vec<String> {
        let model = self.model.read().expect("system lock");
        model.history.clone()
    }
}

impl ManagedSystem for InMemorySystem {
    fn has_component(&self, component: &str) -> bool {
        let model = self.model.read().expect("system lock");
        model.components.contains_key(component)
    }

    fn has_port(&self, component: &str, port: &str) -> bool {
        let model = self.model.read().expect("system lock");
        model
            .components
            .get(component)
            .is_some_and(|c| c.ports.contains(port))
    }

    fn component_state(&self, target: &TargetId) -> SystemResult<ComponentState> {
        let model = self.model.read().expect("system lock");
        let component = model
            .components
            .get(&target.component)
            .ok_or_else(|| SystemError::ComponentNotFound(target.component.clone()))?;
        component
            .contexts
            .get(&target.ec)
            .copied()
            .ok_or_else(|| SystemError::ContextNotFound {
                component: target.component.clone(),
                ec: target.ec,
            })
    }

    fn transition(&self, target: &TargetId, transition: Transition) -> SystemResult<()> {
        let mut model = self.model.write().expect("system lock");
        let component = model
            .components
            .get_mut(&target.component)
            .ok_or_else(|| SystemError::ComponentNotFound(target.component.clone()))?;
        let state = component
            .contexts
            .get_mut(&target.ec)
            .ok_or_else(|| SystemError::ContextNotFound {
                component: target.component.clone(),
                ec: target.ec,
            })?;
        if *state != transition.required_state() {
            return Err(SystemError::InvalidTransition {
                target: target.to_string(),
                transition: transition.to_string(),
                state: state.to_string(),
            });
        }
        *state = transition.expected_state();
        model.history.push(format!("{transition} {target}"));
        Ok(())
    }

    fn activate_config_set(&self, component: &str, set: &str) -> SystemResult<()> {
        let mut model = self.model.write().expect("system lock");
        let entry = model
            .components
            .get_mut(component)
            .ok_or_else(|| SystemError::ComponentNotFound(component.to_string()))?;
        if !entry.config_sets.contains_key(set) {
            return Err(SystemError::ConfigSetNotFound {
                component: component.to_string(),
                set: set.to_string(),
            });
        }
        entry.active_set = Some(set.to_string());
        model.history.push(format!("activate-config {component}/{set}"));
        Ok(())
    }

    fn set_config_value(
        &self,
        component: &str,
        set: &str,
        key: &str,
        value: &str,
    ) -> SystemResult<()> {
        let mut model = self.model.write().expect("system lock");
        let entry = model
            .components
            .get_mut(component)
            .ok_or_else(|| SystemError::ComponentNotFound(component.to_string()))?;
        let values = entry
            .config_sets
            .get_mut(set)
            .ok_or_else(|| SystemError::ConfigSetNotFound {
                component: component.to_string(),
                set: set.to_string(),
            })?;
        values.insert(key.to_string(), value.to_string());
        model
            .history
            .push(format!("set-config {component}/{set}.{key}={value}"));
        Ok(())
    }

    fn connect(&self, connection: &Connection) -> SystemResult<()> {
        let mut model = self.model.write().expect("system lock");
        for end in [&connection.source, &connection.target] {
            let component = model
                .components
                .get(&end.component)
                .ok_or_else(|| SystemError::ComponentNotFound(end.component.clone()))?;
            if !component.ports.contains(&end.port) {
                return Err(SystemError::PortNotFound {
                    component: end.component.clone(),
                    port: end.port.clone(),
                });
            }
        }
        if model.connections.contains_key(&connection.id) {
            return Err(SystemError::AlreadyConnected(connection.id.clone()));
        }
        model
            .connections
            .insert(connection.id.clone(), connection.clone());
        model.history.push(format!("connect {}", connection.id));
        Ok(())
    }

    fn disconnect(&self, connection: &Connection) -> SystemResult<()> {
        let mut model = self.model.write().expect("system lock");
        if model.connections.remove(&connection.id).is_none() {
            return Err(SystemError::NotConnected(connection.id.clone()));
        }
        model.history.push(format!("disconnect {}", connection.id));
        Ok(())
    }

    fn is_connected(&self, connection_id: &str) -> bool {
        let model = self.model.read().expect("system lock");
        model.connections.contains_key(connection_id)
    }
}

/// Deviations from a profile-seeded system, loaded from a TOML file.
///
/// ```toml
/// absent = ["camera"]
///
/// [states]
/// motor = "active"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemOverrides {
    #[serde(default)]
    pub absent: Vec<String>,
    #[serde(default)]
    pub states: BTreeMap<String, ComponentState>,
}

impl SystemOverrides {
    pub fn from_file(path: &Path) -> ProfileResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn apply(&self, system: &InMemorySystem) {
        for id in &self.absent {
            system.remove_component(id);
        }
        for (id, state) in &self.states {
            system.set_component_state(id, *state);
        }
    }
}
