//! End-to-end checks through the public API: config file on disk, controller,
//! preview orchestrator.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cmdorc_tui::config::{FrontendConfig, create_default_config};
use cmdorc_tui::controller::{Controller, ControllerError, ControllerEvent};
use cmdorc_tui::hierarchy::build_hierarchy;
use cmdorc_tui::keyboard::{KeyBindings, compute_conflicts};
use cmdorc_tui::notifier::{BufferNotifier, NoOpNotifier, Severity};
use cmdorc_tui::orchestrator::{Orchestrator, RunState};
use cmdorc_tui::preview::PreviewOrchestrator;
use cmdorc_tui::reconcile::{CommandView, StateReconciler};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const LINT_FORMAT: &str = r#"
[[command]]
name = "Lint"
command = "ruff check ."

[[command]]
name = "Format"
command = "ruff format ."
triggers = ["command_success:Lint"]

[keyboard]
shortcuts = { Lint = "1", Format = "1" }
"#;

fn write_config(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, text).unwrap();
    path
}

fn controller(path: &Path, run_time: Duration) -> Controller<PreviewOrchestrator> {
    let orch = PreviewOrchestrator::new(&[]).with_run_time(run_time);
    Controller::new(path, orch, Box::new(NoOpNotifier), false).unwrap()
}

#[derive(Debug, Default)]
struct Row {
    name: String,
    running: bool,
    icon: String,
    tooltip: String,
    updates: usize,
}

impl CommandView for Row {
    fn command_name(&self) -> &str {
        &self.name
    }

    fn set_running(&mut self, running: bool, tooltip: String) {
        self.running = running;
        self.tooltip = tooltip;
        self.updates += 1;
    }

    fn set_result(&mut self, icon: &str, tooltip: String, _output: Option<PathBuf>) {
        self.running = false;
        self.icon = icon.to_string();
        self.tooltip = tooltip;
        self.updates += 1;
    }
}

#[test]
fn test_lint_then_format_forms_one_tree() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, LINT_FORMAT);
    let config = FrontendConfig::load(&path).unwrap();

    let forest = build_hierarchy(&config.commands);
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].name(), "Lint");
    assert_eq!(forest[0].children.len(), 1);
    assert_eq!(forest[0].children[0].name(), "Format");
    assert!(forest[0].children[0].children.is_empty());
}

#[test]
fn test_conflicting_shortcut_goes_to_first_declared() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, LINT_FORMAT);
    let config = FrontendConfig::load(&path).unwrap();

    let conflicts = compute_conflicts(&config.keyboard.shortcuts);
    assert_eq!(
        conflicts.get("1"),
        Some(&vec!["Lint".to_string(), "Format".to_string()])
    );
    let bindings = KeyBindings::bind_all(&config.keyboard.shortcuts, &conflicts);
    assert_eq!(bindings.command_for("1"), Some("Lint"));
    assert!(bindings.is_shadowed("Format"));
}

#[test]
fn test_cycles_in_config_do_not_hang() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[[command]]
name = "A"
command = "true"
triggers = ["command_success:B"]

[[command]]
name = "B"
command = "true"
triggers = ["command_success:A"]
"#,
    );
    let config = FrontendConfig::load(&path).unwrap();
    // every command has a parent, so there is no root to start from
    assert!(build_hierarchy(&config.commands).is_empty());
}

#[test]
fn test_reconcile_twice_matches_once() {
    let mut orch = PreviewOrchestrator::with_names(&["Tests"]).with_run_time(Duration::ZERO);
    orch.script_outcome("Tests", RunState::Failed);
    orch.run_command("Tests", vec![]).unwrap();
    orch.poll();
    let runs_before = orch.run_calls();

    let reconciler = StateReconciler::new();
    let mut once = Row {
        name: "Tests".into(),
        ..Row::default()
    };
    reconciler.reconcile(&orch, &mut once);
    let mut twice = Row {
        name: "Tests".into(),
        ..Row::default()
    };
    reconciler.reconcile(&orch, &mut twice);
    reconciler.reconcile(&orch, &mut twice);

    assert_eq!(once.icon, "❌");
    assert_eq!(
        (twice.running, &twice.icon, &twice.tooltip),
        (once.running, &once.icon, &once.tooltip)
    );
    assert_eq!((once.updates, twice.updates), (1, 2));
    assert_eq!(orch.run_calls(), runs_before);
    assert_eq!(orch.cancel_calls(), 0);
}

#[test]
fn test_requests_before_attach_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, LINT_FORMAT);
    let ctrl = controller(&path, Duration::ZERO);
    assert!(matches!(
        ctrl.request_run("Lint"),
        Err(ControllerError::NotAttached)
    ));
}

#[test]
fn test_pump_runs_and_chains_commands() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, LINT_FORMAT);
    let mut ctrl = controller(&path, Duration::ZERO);
    ctrl.attach();
    ctrl.attach();

    ctrl.request_run("Lint").unwrap();
    let events = ctrl.pump();
    assert!(matches!(&events[0], ControllerEvent::Started { command, .. } if command == "Lint"));

    // Lint finished during the first pump and queued Format; the next pump finishes it
    let events = ctrl.pump();
    let finished: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            ControllerEvent::Finished(n) => Some(n.command.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec!["Format"]);

    let format = ctrl.orchestrator().get_history("Format", 1).unwrap();
    assert_eq!(format[0].trigger_chain, vec!["command_success:Lint"]);
}

#[test]
fn test_reload_swaps_generation_and_keeps_it_on_failure() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, LINT_FORMAT);
    let notices = BufferNotifier::new(20);
    let mut ctrl = Controller::new(
        &path,
        PreviewOrchestrator::new(&[]),
        Box::new(notices.clone()),
        false,
    )
    .unwrap();
    ctrl.attach();
    let first = ctrl.generation();

    fs::write(
        &path,
        LINT_FORMAT.replace("shortcuts = { Lint = \"1\", Format = \"1\" }", "shortcuts = { Format = \"f\" }"),
    )
    .unwrap();
    ctrl.reload_config().unwrap();
    let second = ctrl.generation();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(ctrl.keyboard_conflicts().is_empty());
    assert_eq!(ctrl.keyboard_hints().get("f").map(String::as_str), Some("Format"));
    // the old generation is still whole for anyone holding it
    assert_eq!(first.bindings.command_for("1"), Some("Lint"));

    fs::write(&path, "[[command]\nname = ").unwrap();
    assert!(matches!(ctrl.reload_config(), Err(ControllerError::Config(_))));
    assert!(Arc::ptr_eq(&second, &ctrl.generation()));
    let last = notices.snapshot().pop().unwrap();
    assert_eq!(last.severity, Severity::Error);
    assert!(last.message.starts_with("Failed to reload config"));
}

#[test]
fn test_default_config_loads_into_a_chain() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    assert!(create_default_config(&path).unwrap());
    assert!(!create_default_config(&path).unwrap());

    let ctrl = controller(&path, Duration::ZERO);
    let validation = ctrl.validate_config();
    assert!(validation.warnings.is_empty(), "{:?}", validation.warnings);
    assert_eq!(ctrl.hierarchy().len(), 1);
    assert_eq!(ctrl.keyboard_hints().len(), 3);
}
