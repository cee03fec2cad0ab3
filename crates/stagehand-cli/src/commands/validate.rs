use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use stagehand_core::{Operation, Profile};

#[derive(Debug, Serialize)]
struct Summary {
    id: String,
    version: Option<String>,
    components: usize,
    optional: usize,
    targets: usize,
    connections: usize,
    activation: usize,
    deactivation: usize,
    resetting: usize,
}

impl Summary {
    fn of(profile: &Profile) -> Self {
        let constraints = |op| profile.section(op).len();
        Self {
            id: profile.profile.id.clone(),
            version: profile.profile.version.clone(),
            components: profile.components.len(),
            optional: profile.components.iter().filter(|c| !c.required).count(),
            targets: profile
                .components
                .iter()
                .map(|c| c.context_ids().len())
                .sum(),
            connections: profile.connections.len(),
            activation: constraints(Operation::Activation),
            deactivation: constraints(Operation::Deactivation),
            resetting: constraints(Operation::Resetting),
        }
    }
}

pub fn validate(path: &Path, format: &str) -> anyhow::Result<()> {
    let profile = Profile::load(path)
        .with_context(|| format!("validating profile {}", path.display()))?;
    let summary = Summary::of(&profile);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        _ => {
            println!(
                "✓ {} {}",
                summary.id,
                summary.version.as_deref().unwrap_or("(unversioned)")
            );
            println!(
                "  {} components ({} optional), {} execution contexts, {} connections",
                summary.components, summary.optional, summary.targets, summary.connections
            );
            println!(
                "  constraints: {} activation, {} deactivation, {} resetting",
                summary.activation, summary.deactivation, summary.resetting
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_targets_and_constraints() {
        let profile = Profile::from_toml_str(
            r#"
[profile]
id = "rig"
version = "2"

[[components]]
id = "arm"
execution_contexts = [0, 1, 2]

[[components]]
id = "gripper"
required = false

[[activation]]
component = "gripper"
sequence = 1
"#,
        )
        .unwrap();

        let summary = Summary::of(&profile);
        assert_eq!(summary.components, 2);
        assert_eq!(summary.optional, 1);
        assert_eq!(summary.targets, 4);
        assert_eq!(summary.activation, 1);
        assert_eq!(summary.deactivation, 0);
    }

    #[test]
    fn validate_reports_broken_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rig.toml");
        std::fs::write(
            &path,
            "[profile]\nid = \"rig\"\n\n[[deactivation]]\ncomponent = \"ghost\"\n",
        )
        .unwrap();

        let err = validate(&path, "text").unwrap_err();
        assert!(format!("{err:#}").contains("unknown component: ghost"));
    }
}
