//! End-to-end scheduler scenarios.
//!
//! Each test builds a plan from a small profile, executes it against an
//! in-memory system, and checks ordering, abort, and cancellation
//! behaviour through a shared journal.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use stagehand_core::{
    ComponentState, InMemorySystem, ManagedSystem, Operation, Profile, SharedSystem, TargetId,
    Transition,
};
use stagehand_plan::*;

type Journal = Arc<Mutex<Vec<String>>>;

struct Step {
    component: String,
    ok: bool,
    applies: bool,
    journal: Journal,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activate {}", self.component)
    }
}

impl Action for Step {
    fn run(&self, system: &dyn ManagedSystem) -> ActionOutcome {
        self.journal.lock().unwrap().push(self.component.clone());
        if self.applies {
            let target = TargetId::new(self.component.clone(), 0);
            return ActionOutcome::from_result(system.transition(&target, Transition::Activate));
        }
        if self.ok {
            ActionOutcome::success()
        } else {
            ActionOutcome::failure(format!("{} refused", self.component))
        }
    }

    fn lifecycle(&self) -> Option<LifecycleKey> {
        Some(LifecycleKey {
            operation: Operation::Activation,
            target: TargetId::new(self.component.clone(), 0),
        })
    }
}

fn step(component: &str, journal: &Journal) -> ScheduledAction {
    ScheduledAction::new(Step {
        component: component.to_string(),
        ok: true,
        applies: false,
        journal: journal.clone(),
    })
}

/// A step that really activates its component in the system it runs on.
fn applied_step(component: &str, journal: &Journal) -> ScheduledAction {
    ScheduledAction::new(Step {
        component: component.to_string(),
        ok: true,
        applies: true,
        journal: journal.clone(),
    })
}

fn failing_step(component: &str, journal: &Journal) -> ScheduledAction {
    ScheduledAction::new(Step {
        component: component.to_string(),
        ok: false,
        applies: false,
        journal: journal.clone(),
    })
}

fn profile(body: &str) -> Profile {
    Profile::from_toml_str(&format!(
        "[profile]\nid = \"scenario\"\n\n[settings]\npoll_interval_ms = 10\n{body}"
    ))
    .unwrap()
}

fn system() -> SharedSystem {
    let system = InMemorySystem::new();
    for name in ["a", "b", "c"] {
        system.add_component(name, &[], &[0]);
    }
    Arc::new(system)
}

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

#[tokio::test]
async fn unconstrained_actions_each_run_once() {
    let journal = journal();
    let actions = (0..5)
        .map(|i| step(&format!("c{i}"), &journal))
        .collect();
    let plan = Plan::build(&profile(""), actions).unwrap();
    assert_eq!(plan.immediate().len(), 5);
    assert_eq!(plan.deferred().len(), 0);

    let report = plan.execute(system()).await.unwrap();
    assert_eq!(report.executed(), 5);

    let mut seen = entries(&journal);
    seen.sort();
    assert_eq!(seen, vec!["c0", "c1", "c2", "c3", "c4"]);
}

#[tokio::test]
async fn occurrence_dependency_runs_after_dependency() {
    let journal = journal();
    let p = profile(
        r#"
[[activation]]
component = "a"
[activation.preceding]
timing = "on_occurrence"
timeout_ms = 2000
targets = [{ component = "b" }]
"#,
    );
    let plan = Plan::build(&p, vec![step("a", &journal), step("b", &journal)]).unwrap();
    assert_eq!(plan.immediate().len(), 1);
    assert_eq!(plan.deferred().len(), 1);

    plan.execute(system()).await.unwrap();
    assert_eq!(entries(&journal), vec!["b", "a"]);
}

#[tokio::test]
async fn occurrence_dependency_fires_even_when_dependency_fails() {
    let journal = journal();
    let p = profile(
        r#"
[[activation]]
component = "a"
[activation.preceding]
timing = "on_occurrence"
timeout_ms = 2000
targets = [{ component = "b" }]
"#,
    );
    let plan = Plan::build(
        &p,
        vec![step("a", &journal), failing_step("b", &journal)],
    )
    .unwrap();

    let report = plan.execute(system()).await.unwrap();
    assert_eq!(entries(&journal), vec!["b", "a"]);
    assert_eq!(report.failures().count(), 1);
}

#[tokio::test]
async fn completion_timeout_aborts_and_skips_dependent() {
    let journal = journal();
    // "b" is scripted and never changes the system, so "a" never sees it
    // become active.
    let p = profile(
        r#"
[[activation]]
component = "a"
[activation.preceding]
timing = "on_completion"
timeout_ms = 50
targets = [{ component = "b" }]
"#,
    );
    let plan = Plan::build(&p, vec![step("a", &journal), step("b", &journal)]).unwrap();

    let err = plan.execute(system()).await.unwrap_err();
    match err {
        PlanError::PrecedingTimeout {
            action, timeout, ..
        } => {
            assert_eq!(action, "activate a");
            assert_eq!(timeout, Duration::from_millis(50));
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(entries(&journal), vec!["b"]);
}

#[tokio::test]
async fn completion_dependency_sees_the_executed_system() {
    let journal = journal();
    let p = profile(
        r#"
[[activation]]
component = "a"
[activation.preceding]
timing = "on_completion"
timeout_ms = 2000
targets = [{ component = "b" }]
"#,
    );
    let plan = Plan::build(&p, vec![step("a", &journal), applied_step("b", &journal)]).unwrap();
    assert_eq!(plan.deferred().len(), 1);

    let system = system();
    plan.execute(system.clone()).await.unwrap();
    assert_eq!(entries(&journal), vec!["b", "a"]);
    assert_eq!(
        system.component_state(&TargetId::new("b", 0)),
        Ok(ComponentState::Active)
    );
}

#[tokio::test]
async fn required_failure_aborts_before_later_actions() {
    let journal = journal();
    let required = Arc::new(RequiredCallback::new());
    let p = profile(
        r#"
[[activation]]
component = "a"
sequence = 1

[[activation]]
component = "b"
sequence = 2

[[activation]]
component = "c"
wait_time_ms = 10
"#,
    );
    let actions = vec![
        failing_step("a", &journal).with_callback(required.clone()),
        step("b", &journal),
        step("c", &journal),
    ];
    let plan = Plan::build(&p, actions).unwrap();
    assert_eq!(plan.deferred().len(), 1);

    let err = plan.execute(system()).await.unwrap_err();
    assert_eq!(
        err,
        PlanError::RequiredActionFailed {
            action: "activate a".to_string(),
            message: "a refused".to_string(),
        }
    );
    // Neither the next immediate nor the deferred action ran.
    assert_eq!(entries(&journal), vec!["a"]);
    assert_eq!(required.failures(), vec!["activate a: a refused"]);
}

#[tokio::test]
async fn deferred_required_failure_cancels_the_rest() {
    let journal = journal();
    let required = Arc::new(RequiredCallback::new());
    let p = profile(
        r#"
[[activation]]
component = "a"
wait_time_ms = 10

[[activation]]
component = "b"
wait_time_ms = 5000
"#,
    );
    let actions = vec![
        failing_step("a", &journal).with_callback(required),
        step("b", &journal),
    ];
    let plan = Plan::build(&p, actions).unwrap();

    let started = Instant::now();
    let err = plan.execute(system()).await.unwrap_err();
    assert!(matches!(err, PlanError::RequiredActionFailed { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(entries(&journal), vec!["a"]);
}

#[tokio::test]
async fn wait_time_delays_action() {
    let journal = journal();
    let p = profile(
        r#"
[[activation]]
component = "a"
wait_time_ms = 60
"#,
    );
    let plan = Plan::build(&p, vec![step("a", &journal)]).unwrap();
    let started = Instant::now();
    plan.execute(system()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(entries(&journal), vec!["a"]);
}

#[tokio::test]
async fn all_conditions_must_hold_before_deferred_runs() {
    let journal = journal();
    // "a" waits for both "b" and "c"; "c" itself is delayed.
    let p = profile(
        r#"
[[activation]]
component = "a"
[activation.preceding]
timing = "on_occurrence"
timeout_ms = 2000
targets = [{ component = "b" }, { component = "c" }]

[[activation]]
component = "c"
wait_time_ms = 40
"#,
    );
    let actions = vec![step("a", &journal), step("b", &journal), step("c", &journal)];
    let plan = Plan::build(&p, actions).unwrap();
    assert_eq!(plan.deferred().len(), 2);

    plan.execute(system()).await.unwrap();
    assert_eq!(entries(&journal), vec!["b", "c", "a"]);
}

#[tokio::test]
async fn cancel_mid_wait_returns_promptly() {
    let journal = journal();
    let p = profile(
        r#"
[[activation]]
component = "a"
[activation.preceding]
timing = "on_completion"
timeout_ms = 60000
targets = [{ component = "b" }]
"#,
    );
    let plan = Plan::build(&p, vec![step("a", &journal), step("b", &journal)]).unwrap();
    let handle = plan.cancel_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let started = Instant::now();
    let result = tokio::time::timeout(Duration::from_secs(2), plan.execute(system()))
        .await
        .expect("execute must not hang after cancel");
    assert_eq!(result.unwrap_err(), PlanError::Cancelled);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(entries(&journal), vec!["b"]);
}

#[test]
fn dry_run_lists_every_executor_in_order() {
    let journal = journal();
    let p = profile(
        r#"
[[activation]]
component = "b"
sequence = 2

[[activation]]
component = "c"
sequence = 1

[[activation]]
component = "a"
wait_time_ms = 250
"#,
    );
    let plan = Plan::build(
        &p,
        vec![step("a", &journal), step("b", &journal), step("c", &journal)],
    )
    .unwrap();

    let rendered = plan.to_string();
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines[0], "  1. [sequence 1] activate c");
    assert_eq!(lines[1], "  2. [sequence 2] activate b");
    assert!(lines[2].contains("concurrently"));
    assert_eq!(lines[3], "  3. [wait 250ms] activate a");
    assert!(entries(&journal).is_empty());
}
