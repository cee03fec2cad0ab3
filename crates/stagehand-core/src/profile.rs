//! Profile parser — the declarative description of a managed system.
//!
//! A profile lists components, the connections between their ports, and
//! per lifecycle operation (`[[activation]]`, `[[deactivation]]`,
//! `[[resetting]]`) the ordering constraints for each target:
//!
//! ```toml
//! [profile]
//! id = "camera-pipeline"
//!
//! [[components]]
//! id = "camera"
//! ports = ["frames"]
//!
//! [[activation]]
//! component = "viewer"
//! sequence = 2
//!
//! [activation.preceding]
//! timing = "on_completion"
//! timeout_ms = 2000
//! targets = [{ component = "camera" }]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProfileError, ProfileResult};
use crate::system::{Operation, TargetId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub profile: ProfileMeta,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub components: Vec<Component>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub activation: Vec<Constraint>,
    #[serde(default)]
    pub deactivation: Vec<Constraint>,
    #[serde(default)]
    pub resetting: Vec<Constraint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMeta {
    pub id: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Scheduler tuning carried by the profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Interval between state probes for "on completion" dependencies.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Budget for a preceding constraint that does not set `timeout_ms`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,
    /// Address of the component in the managed system's naming service.
    pub path: Option<String>,
    /// Optional components may be absent without failing a plan.
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub execution_contexts: Vec<u32>,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub configuration_sets: Vec<ConfigurationSet>,
    pub active_configuration_set: Option<String>,
}

impl Component {
    /// Execution contexts of this component; a component that declares
    /// none runs in context 0.
    pub fn context_ids(&self) -> Vec<u32> {
        if self.execution_contexts.is_empty() {
            vec![0]
        } else {
            self.execution_contexts.clone()
        }
    }

    pub fn configuration_set(&self, id: &str) -> Option<&ConfigurationSet> {
        self.configuration_sets.iter().find(|s| s.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationSet {
    pub id: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Connection {
    pub id: String,
    pub source: PortRef,
    pub target: PortRef,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PortRef {
    pub component: String,
    pub port: String,
}

/// One ordering constraint on a target for one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub component: String,
    #[serde(default)]
    pub ec: u32,
    pub sequence: Option<u32>,
    pub wait_time_ms: Option<u64>,
    pub preceding: Option<Preceding>,
}

impl Constraint {
    pub fn target(&self) -> TargetId {
        TargetId::new(self.component.clone(), self.ec)
    }

    pub fn kind(&self) -> ConstraintKind<'_> {
        if let Some(preceding) = &self.preceding {
            ConstraintKind::Preceding(preceding)
        } else if let Some(ms) = self.wait_time_ms {
            ConstraintKind::WaitTime(Duration::from_millis(ms))
        } else {
            ConstraintKind::Sequence
        }
    }
}

/// Dependency of a target on other targets of the same operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preceding {
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub targets: Vec<TargetId>,
}

impl Preceding {
    pub fn timeout(&self, settings: &Settings) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| settings.default_timeout())
    }
}

/// When a preceding dependency counts as met.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// As soon as the depended-on action has been invoked.
    OnOccurrence,
    /// Once the depended-on target reaches its expected state.
    #[default]
    OnCompletion,
}

/// Classification of a constraint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstraintKind<'a> {
    Sequence,
    WaitTime(Duration),
    Preceding(&'a Preceding),
}

impl Profile {
    /// Read and validate a profile file.
    pub fn load(path: &Path) -> ProfileResult<Self> {
        let profile = Self::from_file(path)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_file(path: &Path) -> ProfileResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ProfileResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ProfileResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn component(&self, id: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.id == id)
    }

    /// Whether a component is required. Unknown components count as required.
    pub fn is_required(&self, id: &str) -> bool {
        self.component(id).is_none_or(|c| c.required)
    }

    /// All constraints declared for an operation.
    pub fn section(&self, operation: Operation) -> &[Constraint] {
        match operation {
            Operation::Activation => &self.activation,
            Operation::Deactivation => &self.deactivation,
            Operation::Resetting => &self.resetting,
        }
    }

    /// Constraints on one target for an operation, in declaration order.
    pub fn constraints_for(&self, operation: Operation, target: &TargetId) -> Vec<&Constraint> {
        self.section(operation)
            .iter()
            .filter(|c| c.component == target.component && c.ec == target.ec)
            .collect()
    }

    /// Check every cross reference in the profile.
    pub fn validate(&self) -> ProfileResult<()> {
        if self.settings.poll_interval_ms == 0 {
            return Err(ProfileError::InvalidSetting {
                name: "poll_interval_ms".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for component in &self.components {
            if !seen.insert(component.id.as_str()) {
                return Err(ProfileError::DuplicateComponent(component.id.clone()));
            }
            if let Some(set) = &component.active_configuration_set {
                if component.configuration_set(set).is_none() {
                    return Err(ProfileError::UnknownConfigurationSet {
                        component: component.id.clone(),
                        set: set.clone(),
                    });
                }
            }
        }

        for connection in &self.connections {
            for end in [&connection.source, &connection.target] {
                let component = self.require_component(&end.component)?;
                if !component.ports.contains(&end.port) {
                    return Err(ProfileError::UnknownPort {
                        component: end.component.clone(),
                        port: end.port.clone(),
                    });
                }
            }
        }

        for operation in [
            Operation::Activation,
            Operation::Deactivation,
            Operation::Resetting,
        ] {
            for constraint in self.section(operation) {
                self.require_target(&constraint.target())?;
                if constraint.wait_time_ms.is_some() && constraint.preceding.is_some() {
                    return Err(ProfileError::ConflictingConstraint(
                        constraint.target().to_string(),
                    ));
                }
                if let Some(preceding) = &constraint.preceding {
                    for dep in &preceding.targets {
                        self.require_target(dep)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn require_component(&self, id: &str) -> ProfileResult<&Component> {
        self.component(id)
            .ok_or_else(|| ProfileError::UnknownComponent(id.to_string()))
    }

    fn require_target(&self, target: &TargetId) -> ProfileResult<()> {
        let component = self.require_component(&target.component)?;
        if !component.context_ids().contains(&target.ec) {
            return Err(ProfileError::UnknownExecutionContext {
                component: target.component.clone(),
                ec: target.ec,
            });
        }
        Ok(())
    }
}
