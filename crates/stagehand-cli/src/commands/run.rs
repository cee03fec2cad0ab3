use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use stagehand_actions::Phase;
use stagehand_core::{InMemorySystem, Profile, SystemOverrides};
use stagehand_plan::Plan;
use tracing::{debug, error, warn};

/// Build the plan for `phase` and either print it or execute it against an
/// in-memory system seeded from the profile.
pub async fn run(
    phase: Phase,
    profile_path: &Path,
    system_state: Option<&Path>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    run_with_output(phase, profile_path, system_state, dry_run, &mut out).await
}

/// Only a dry run writes to `out`. A live run reports through the exit
/// status and the callbacks' log lines.
async fn run_with_output<W: Write>(
    phase: Phase,
    profile_path: &Path,
    system_state: Option<&Path>,
    dry_run: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let profile = Profile::load(profile_path)
        .with_context(|| format!("loading profile {}", profile_path.display()))?;

    let system = Arc::new(InMemorySystem::from_profile(&profile));
    if let Some(path) = system_state {
        let overrides = SystemOverrides::from_file(path)
            .with_context(|| format!("loading system state {}", path.display()))?;
        overrides.apply(&system);
        debug!(
            absent = overrides.absent.len(),
            states = overrides.states.len(),
            "applied system state"
        );
    }

    let actions = phase.build(&profile);
    let plan = Plan::build(&profile, actions)
        .with_context(|| format!("building {phase} plan for {}", profile.profile.id))?;

    if dry_run {
        writeln!(out, "{phase} plan for {} ({} actions):", profile.profile.id, plan.len())?;
        write!(out, "{plan}")?;
        return Ok(());
    }

    let cancel = plan.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling plan");
            cancel.cancel();
        }
    });

    let result = plan.execute(system.clone()).await;
    interrupt.abort();
    for change in system.history() {
        debug!(%change, "system changed");
    }

    match result {
        Ok(report) => {
            debug!(
                executed = report.executed(),
                failed = report.failures().count(),
                "{phase} complete"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "{phase} aborted");
            Err(e).with_context(|| format!("{phase} failed for {}", profile.profile.id))
        }
    }
}
