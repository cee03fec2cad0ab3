//! Phase builders — the action lists behind each front-end command.
//!
//! Every builder walks the profile in declaration order and returns
//! actions ready for [`Plan::build`](stagehand_plan::Plan::build). Actions
//! on required components share one [`RequiredCallback`]; everything else
//! is best effort.

use std::fmt;
use std::sync::Arc;

use stagehand_core::{Operation, Profile, TargetId};
use stagehand_plan::{BestEffortCallback, Callback, RequiredCallback, ScheduledAction};
use tracing::debug;

use crate::catalog::{
    ActivateConfigSet, CheckComponent, CheckPort, ConnectPorts, DisconnectPorts, SetConfigValue,
    TransitionComponent,
};

/// A front-end command, mapped to the actions it performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Check,
    Resurrect,
    Teardown,
    Lifecycle(Operation),
}

impl Phase {
    pub fn build(self, profile: &Profile) -> Vec<ScheduledAction> {
        let actions = match self {
            Phase::Check => check(profile),
            Phase::Resurrect => resurrect(profile),
            Phase::Teardown => teardown(profile),
            Phase::Lifecycle(operation) => lifecycle(profile, operation),
        };
        debug!(phase = ?self, actions = actions.len(), "built actions");
        actions
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Check => f.write_str("check"),
            Phase::Resurrect => f.write_str("resurrect"),
            Phase::Teardown => f.write_str("teardown"),
            Phase::Lifecycle(operation) => write!(f, "{operation}"),
        }
    }
}

/// Picks the callback for an action on a component.
struct Policy<'a> {
    profile: &'a Profile,
    required: Arc<RequiredCallback>,
}

impl<'a> Policy<'a> {
    fn new(profile: &'a Profile) -> Self {
        Self {
            profile,
            required: Arc::new(RequiredCallback::new()),
        }
    }

    fn callback_for(&self, component: &str) -> Arc<dyn Callback> {
        if self.profile.is_required(component) {
            self.required.clone()
        } else {
            Arc::new(BestEffortCallback)
        }
    }

    fn schedule(&self, component: &str, action: ScheduledAction) -> ScheduledAction {
        action.with_callback(self.callback_for(component))
    }
}

/// Presence of every component and every declared port.
pub fn check(profile: &Profile) -> Vec<ScheduledAction> {
    let policy = Policy::new(profile);
    let mut actions = Vec::new();
    for component in &profile.components {
        actions.push(policy.schedule(
            &component.id,
            ScheduledAction::new(CheckComponent::new(&component.id)),
        ));
        for port in &component.ports {
            actions.push(policy.schedule(
                &component.id,
                ScheduledAction::new(CheckPort::new(&component.id, port)),
            ));
        }
    }
    actions
}

/// Recreate the system described by the profile: required components must
/// be present, then connections, configuration set activation and values
/// are applied best effort.
pub fn resurrect(profile: &Profile) -> Vec<ScheduledAction> {
    let policy = Policy::new(profile);
    let mut actions: Vec<ScheduledAction> = profile
        .components
        .iter()
        .filter(|c| c.required)
        .map(|c| policy.schedule(&c.id, ScheduledAction::new(CheckComponent::new(&c.id))))
        .collect();

    for connection in &profile.connections {
        actions.push(ScheduledAction::new(ConnectPorts::new(connection.clone())));
    }
    for component in &profile.components {
        if let Some(set) = &component.active_configuration_set {
            actions.push(ScheduledAction::new(ActivateConfigSet::new(
                &component.id,
                set,
            )));
        }
    }
    for component in &profile.components {
        for set in &component.configuration_sets {
            for (key, value) in &set.values {
                actions.push(ScheduledAction::new(SetConfigValue::new(
                    &component.id,
                    &set.id,
                    key,
                    value,
                )));
            }
        }
    }
    actions
}

/// Remove every connection the profile declares.
pub fn teardown(profile: &Profile) -> Vec<ScheduledAction> {
    profile
        .connections
        .iter()
        .map(|c| ScheduledAction::new(DisconnectPorts::new(c.clone())))
        .collect()
}

/// One transition per component and execution context.
pub fn lifecycle(profile: &Profile, operation: Operation) -> Vec<ScheduledAction> {
    let policy = Policy::new(profile);
    let mut actions = Vec::new();
    for component in &profile.components {
        for ec in component.context_ids() {
            let target = TargetId::new(component.id.clone(), ec);
            actions.push(policy.schedule(
                &component.id,
                ScheduledAction::new(TransitionComponent::new(target, operation)),
            ));
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"
[profile]
id = "rig"

[[components]]
id = "camera"
ports = ["out"]
active_configuration_set = "default"

[[components.configuration_sets]]
id = "default"
values = { fps = "30", exposure = "auto" }

[[components]]
id = "recorder"
required = false
execution_contexts = [0, 1]
ports = ["in"]

[[connections]]
id = "feed"
source = { component = "camera", port = "out" }
target = { component = "recorder", port = "in" }
"#;

    fn profile() -> Profile {
        Profile::from_toml_str(PROFILE).unwrap()
    }

    fn descriptions(actions: &[ScheduledAction]) -> Vec<String> {
        actions.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn check_covers_components_and_ports() {
        let actions = check(&profile());
        assert_eq!(
            descriptions(&actions),
            vec![
                "check camera is present",
                "check port camera.out is present",
                "check recorder is present",
                "check port recorder.in is present",
            ]
        );
        assert!(actions.iter().all(|a| a.callbacks().len() == 1));
        assert!(Arc::ptr_eq(&actions[0].callbacks()[0], &actions[1].callbacks()[0]));
        assert!(!Arc::ptr_eq(&actions[0].callbacks()[0], &actions[2].callbacks()[0]));
    }

    #[test]
    fn resurrect_checks_required_first() {
        let actions = resurrect(&profile());
        assert_eq!(
            descriptions(&actions),
            vec![
                "check camera is present",
                "connect camera.out -> recorder.in (feed)",
                "activate configuration set default on camera",
                "set camera/default.exposure to \"auto\"",
                "set camera/default.fps to \"30\"",
            ]
        );
        assert!(actions[1..].iter().all(|a| a.callbacks().is_empty()));
    }

    #[test]
    fn teardown_disconnects_everything() {
        let actions = Phase::Teardown.build(&profile());
        assert_eq!(
            descriptions(&actions),
            vec!["disconnect camera.out -> recorder.in (feed)"]
        );
    }

    #[test]
    fn lifecycle_expands_execution_contexts() {
        let actions = lifecycle(&profile(), Operation::Deactivation);
        assert_eq!(
            descriptions(&actions),
            vec![
                "deactivate camera:0",
                "deactivate recorder:0",
                "deactivate recorder:1",
            ]
        );
        assert!(actions.iter().all(|a| a.action().lifecycle().is_some()));
    }
}
