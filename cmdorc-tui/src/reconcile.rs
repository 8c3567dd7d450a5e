//! Read-only sync of a display surface with the orchestrator's run state.

use std::path::PathBuf;

use log::{debug, error, trace};

use crate::orchestrator::{Orchestrator, OrchestratorError, RunResult};

/// Anything that shows one command's state.
pub trait CommandView {
    fn command_name(&self) -> &str;

    fn set_running(&mut self, running: bool, tooltip: String);

    fn set_result(&mut self, icon: &str, tooltip: String, output_path: Option<PathBuf>);
}

/// Used on mount, reload and whenever a view is recreated. Never runs or
/// cancels anything, so calling it repeatedly is harmless.
#[derive(Debug, Default, Clone, Copy)]
pub struct StateReconciler;

impl StateReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Errors are logged and swallowed; the view keeps whatever it showed.
    pub fn reconcile(&self, orchestrator: &dyn Orchestrator, view: &mut dyn CommandView) {
        let name = view.command_name().to_string();
        trace!("Reconciling view for '{}'", name);
        if let Err(err) = self.try_reconcile(orchestrator, view) {
            error!("Error reconciling state for {}: {}", name, err);
        }
    }

    fn try_reconcile(
        &self,
        orchestrator: &dyn Orchestrator,
        view: &mut dyn CommandView,
    ) -> Result<(), OrchestratorError> {
        let name = view.command_name().to_string();
        let active = orchestrator.get_active_handles(&name)?;

        if let Some(handle) = active.last() {
            match &handle.result {
                Some(result) => {
                    debug!("'{}' finished while being reconciled", name);
                    apply_result(view, result);
                }
                None => {
                    let comment = handle.comment.as_deref().unwrap_or("Running");
                    view.set_running(true, format!("Running: {comment}"));
                }
            }
            return Ok(());
        }

        if let Some(result) = orchestrator.get_history(&name, 1)?.first() {
            apply_result(view, result);
        }
        Ok(())
    }
}

fn apply_result(view: &mut dyn CommandView, result: &RunResult) {
    let tooltip = format!("{} ({})", result.state, result.duration_str());
    view.set_result(result.state.icon(), tooltip, result.output_path.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::orchestrator::{RunHandle, RunState};
    use crate::preview::PreviewOrchestrator;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct RecordingView {
        name: String,
        running: bool,
        icon: Option<String>,
        tooltip: Option<String>,
        output: Option<PathBuf>,
        writes: usize,
    }

    impl RecordingView {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Self::default()
            }
        }

        fn visible(&self) -> (bool, Option<String>, Option<String>, Option<PathBuf>) {
            (
                self.running,
                self.icon.clone(),
                self.tooltip.clone(),
                self.output.clone(),
            )
        }
    }

    impl CommandView for RecordingView {
        fn command_name(&self) -> &str {
            &self.name
        }

        fn set_running(&mut self, running: bool, tooltip: String) {
            self.running = running;
            self.tooltip = Some(tooltip);
            self.writes += 1;
        }

        fn set_result(&mut self, icon: &str, tooltip: String, output_path: Option<PathBuf>) {
            self.running = false;
            self.icon = Some(icon.to_string());
            self.tooltip = Some(tooltip);
            self.output = output_path;
            self.writes += 1;
        }
    }

    fn result(state: RunState, secs: u64) -> RunResult {
        RunResult {
            command: "Lint".into(),
            state,
            duration: Some(Duration::from_secs(secs)),
            finished_at: None,
            output_path: Some(PathBuf::from("/tmp/lint.log")),
            trigger_chain: vec![],
        }
    }

    #[test]
    fn test_no_data_leaves_view_idle() {
        let orchestrator = PreviewOrchestrator::with_names(&["Lint"]);
        let mut view = RecordingView::new("Lint");
        StateReconciler::new().reconcile(&orchestrator, &mut view);
        assert_eq!(view.writes, 0);
        assert_eq!(view.icon, None);
    }

    #[test]
    fn test_history_drives_icon_and_tooltip() {
        let mut orchestrator = PreviewOrchestrator::with_names(&["Lint"]);
        orchestrator.push_history(result(RunState::Failed, 2));
        let mut view = RecordingView::new("Lint");
        StateReconciler::new().reconcile(&orchestrator, &mut view);
        assert_eq!(view.icon.as_deref(), Some("❌"));
        assert_eq!(view.tooltip.as_deref(), Some("failed (2.0s)"));
        assert_eq!(view.output, Some(PathBuf::from("/tmp/lint.log")));
    }

    #[test]
    fn test_active_handle_shows_running_comment() {
        let mut orchestrator = PreviewOrchestrator::with_names(&["Lint"]);
        let mut handle = orchestrator.run_command("Lint", vec![]).unwrap();
        handle.comment = Some("compiling".into());
        orchestrator.replace_active("Lint", vec![handle]);

        let mut view = RecordingView::new("Lint");
        StateReconciler::new().reconcile(&orchestrator, &mut view);
        assert!(view.running);
        assert_eq!(view.tooltip.as_deref(), Some("Running: compiling"));
    }

    #[test]
    fn test_finalized_active_handle_renders_as_result() {
        let mut orchestrator = PreviewOrchestrator::with_names(&["Lint"]);
        let handle = RunHandle {
            id: "h1".into(),
            command: "Lint".into(),
            trigger_chain: vec![],
            started_at: chrono::Utc::now(),
            comment: None,
            result: Some(result(RunState::Success, 1)),
        };
        orchestrator.replace_active("Lint", vec![handle]);

        let mut view = RecordingView::new("Lint");
        StateReconciler::new().reconcile(&orchestrator, &mut view);
        assert!(!view.running);
        assert_eq!(view.icon.as_deref(), Some("✅"));
    }

    #[test]
    fn test_reconcile_is_idempotent_and_read_only() {
        let mut orchestrator = PreviewOrchestrator::with_names(&["Lint"]);
        orchestrator.push_history(result(RunState::Cancelled, 3));
        let reconciler = StateReconciler::new();

        let mut view = RecordingView::new("Lint");
        reconciler.reconcile(&orchestrator, &mut view);
        let first = view.visible();
        reconciler.reconcile(&orchestrator, &mut view);
        assert_eq!(view.visible(), first);
        assert_eq!(orchestrator.run_calls(), 0);
        assert_eq!(orchestrator.cancel_calls(), 0);
    }

    #[test]
    fn test_orchestrator_errors_are_swallowed() {
        let orchestrator = PreviewOrchestrator::with_names(&["Lint"]);
        let mut view = RecordingView::new("Unknown");
        StateReconciler::new().reconcile(&orchestrator, &mut view);
        assert_eq!(view.writes, 0);
    }
}
