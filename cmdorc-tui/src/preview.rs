//! An in-memory orchestrator that never spawns a process.
//!
//! Runs are held "in flight" for a fixed simulated time and then complete
//! with a scripted state. Lifecycle and named triggers fan out to the commands
//! that declare them, so the frontend can be exercised without a real engine.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, info, trace};
use uuid::Uuid;

use crate::config::CommandDescriptor;
use crate::orchestrator::{
    LifecycleCallbacks, LifecycleEvent, Orchestrator, OrchestratorError, RunHandle, RunResult,
    RunState,
};

const HISTORY_LIMIT: usize = 20;
const DEFAULT_RUN_TIME: Duration = Duration::from_millis(600);

struct ActiveRun {
    handle: RunHandle,
    started: Instant,
}

pub struct PreviewOrchestrator {
    commands: Vec<Arc<CommandDescriptor>>,
    active: HashMap<String, Vec<ActiveRun>>,
    history: HashMap<String, VecDeque<RunResult>>,
    callbacks: HashMap<String, LifecycleCallbacks>,
    outcomes: HashMap<String, RunState>,
    run_time: Duration,
    run_calls: usize,
    cancel_calls: usize,
}

impl PreviewOrchestrator {
    pub fn new(commands: &[Arc<CommandDescriptor>]) -> Self {
        info!("Preview orchestrator created for {} commands", commands.len());
        Self {
            commands: commands.to_vec(),
            active: HashMap::new(),
            history: HashMap::new(),
            callbacks: HashMap::new(),
            outcomes: HashMap::new(),
            run_time: DEFAULT_RUN_TIME,
            run_calls: 0,
            cancel_calls: 0,
        }
    }

    /// Commands with no triggers, for tests.
    pub fn with_names(names: &[&str]) -> Self {
        let commands: Vec<Arc<CommandDescriptor>> = names
            .iter()
            .map(|name| {
                Arc::new(CommandDescriptor {
                    name: name.to_string(),
                    command: format!("echo {name}"),
                    triggers: Vec::new(),
                    cancel_on_triggers: Vec::new(),
                    max_concurrent: None,
                })
            })
            .collect();
        Self::new(&commands)
    }

    pub fn with_run_time(mut self, run_time: Duration) -> Self {
        self.run_time = run_time;
        self
    }

    /// Every later run of `name` ends in `state`.
    pub fn script_outcome(&mut self, name: &str, state: RunState) {
        self.outcomes.insert(name.to_string(), state);
    }

    pub fn push_history(&mut self, result: RunResult) {
        let entries = self.history.entry(result.command.clone()).or_default();
        entries.push_front(result);
        entries.truncate(HISTORY_LIMIT);
    }

    pub fn replace_active(&mut self, name: &str, handles: Vec<RunHandle>) {
        let runs = handles
            .into_iter()
            .map(|handle| ActiveRun {
                handle,
                started: Instant::now(),
            })
            .collect();
        self.active.insert(name.to_string(), runs);
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls
    }

    fn descriptor(&self, name: &str) -> Result<&Arc<CommandDescriptor>, OrchestratorError> {
        self.commands
            .iter()
            .find(|cmd| cmd.name == name)
            .ok_or_else(|| OrchestratorError::UnknownCommand(name.to_string()))
    }

    fn start(&mut self, name: &str, trigger_chain: Vec<String>) -> RunHandle {
        let handle = RunHandle {
            id: Uuid::new_v4().to_string(),
            command: name.to_string(),
            trigger_chain,
            started_at: Utc::now(),
            comment: None,
            result: None,
        };
        debug!("Preview run {} started for '{}'", handle.id, name);
        self.active
            .entry(name.to_string())
            .or_default()
            .push(ActiveRun {
                handle: handle.clone(),
                started: Instant::now(),
            });
        handle
    }

    fn finish(&mut self, run: ActiveRun, state: RunState) -> RunHandle {
        let mut handle = run.handle;
        let result = RunResult {
            command: handle.command.clone(),
            state,
            duration: Some(run.started.elapsed()),
            finished_at: Some(Utc::now()),
            output_path: None,
            trigger_chain: handle.trigger_chain.clone(),
        };
        self.push_history(result.clone());
        handle.result = Some(result);

        if let Some(event) = LifecycleEvent::from_state(state) {
            if let Some(callback) = self
                .callbacks
                .get(&handle.command)
                .and_then(|callbacks| callbacks.get(event))
            {
                callback(&handle);
            }
        }
        handle
    }

    /// Starts every command that declares `event`, cancelling those that
    /// list it under `cancel_on_triggers`.
    fn fan_out(&mut self, event: &str, chain: &[String]) {
        let cancel: Vec<String> = self
            .commands
            .iter()
            .filter(|cmd| cmd.cancel_on_triggers.iter().any(|t| t == event))
            .map(|cmd| cmd.name.clone())
            .collect();
        for name in cancel {
            self.cancel_active(&name);
        }

        let start: Vec<String> = self
            .commands
            .iter()
            .filter(|cmd| cmd.triggers.iter().any(|t| t == event))
            .map(|cmd| cmd.name.clone())
            .collect();
        for name in start {
            // a chain that already passed through this event would loop forever
            if chain.iter().any(|link| link == event) {
                debug!("Skipping '{}': '{}' already in chain", name, event);
                continue;
            }
            let mut next = chain.to_vec();
            next.push(event.to_string());
            self.start(&name, next);
        }
    }

    fn cancel_active(&mut self, name: &str) -> usize {
        let runs = self.active.remove(name).unwrap_or_default();
        let count = runs.len();
        let mut finished = Vec::with_capacity(count);
        for run in runs {
            finished.push(self.finish(run, RunState::Cancelled));
        }
        for handle in finished {
            let event = LifecycleEvent::Cancelled.trigger_for(&handle.command);
            self.fan_out(&event, &handle.trigger_chain);
        }
        count
    }
}

impl Orchestrator for PreviewOrchestrator {
    fn list_commands(&self) -> Vec<String> {
        self.commands.iter().map(|cmd| cmd.name.clone()).collect()
    }

    fn has_command(&self, name: &str) -> bool {
        self.commands.iter().any(|cmd| cmd.name == name)
    }

    fn get_active_handles(&self, name: &str) -> Result<Vec<RunHandle>, OrchestratorError> {
        self.descriptor(name)?;
        Ok(self
            .active
            .get(name)
            .map(|runs| runs.iter().map(|run| run.handle.clone()).collect())
            .unwrap_or_default())
    }

    fn get_history(&self, name: &str, limit: usize) -> Result<Vec<RunResult>, OrchestratorError> {
        self.descriptor(name)?;
        Ok(self
            .history
            .get(name)
            .map(|entries| entries.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn set_lifecycle_callback(&mut self, name: &str, callbacks: LifecycleCallbacks) {
        trace!("Lifecycle callbacks set for '{}'", name);
        self.callbacks.insert(name.to_string(), callbacks);
    }

    fn run_command(
        &mut self,
        name: &str,
        trigger_chain: Vec<String>,
    ) -> Result<RunHandle, OrchestratorError> {
        self.descriptor(name)?;
        self.run_calls += 1;
        Ok(self.start(name, trigger_chain))
    }

    fn cancel_command(&mut self, name: &str) -> Result<usize, OrchestratorError> {
        self.descriptor(name)?;
        self.cancel_calls += 1;
        Ok(self.cancel_active(name))
    }

    fn trigger(&mut self, event: &str) -> Result<(), OrchestratorError> {
        debug!("Preview trigger '{}'", event);
        self.fan_out(event, &[]);
        Ok(())
    }

    fn replace_commands(&mut self, commands: &[CommandDescriptor]) {
        self.commands = commands.iter().cloned().map(Arc::new).collect();
        let known: Vec<String> = self.list_commands();
        self.active.retain(|name, _| known.contains(name));
        self.callbacks.retain(|name, _| known.contains(name));
    }

    fn poll(&mut self) {
        let run_time = self.run_time;
        let mut due = Vec::new();
        for runs in self.active.values_mut() {
            let (done, pending): (Vec<ActiveRun>, Vec<ActiveRun>) = runs
                .drain(..)
                .partition(|run| run.started.elapsed() >= run_time);
            *runs = pending;
            due.extend(done);
        }
        self.active.retain(|_, runs| !runs.is_empty());

        for run in due {
            let state = self
                .outcomes
                .get(&run.handle.command)
                .copied()
                .unwrap_or(RunState::Success);
            let handle = self.finish(run, state);
            if let Some(event) = LifecycleEvent::from_state(state) {
                let trigger = event.trigger_for(&handle.command);
                self.fan_out(&trigger, &handle.trigger_chain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn cmd(name: &str, triggers: &[&str]) -> Arc<CommandDescriptor> {
        Arc::new(CommandDescriptor {
            name: name.to_string(),
            command: format!("echo {name}"),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
            cancel_on_triggers: Vec::new(),
            max_concurrent: None,
        })
    }

    #[test]
    fn test_completes_runs_and_fans_out() {
        let mut orch = PreviewOrchestrator::new(&[
            cmd("Lint", &["rs_file_changed"]),
            cmd("Format", &["command_success:Lint"]),
        ])
        .with_run_time(Duration::ZERO);

        orch.trigger("rs_file_changed").unwrap();
        assert_eq!(orch.get_active_handles("Lint").unwrap().len(), 1);

        orch.poll();
        let lint = orch.get_history("Lint", 1).unwrap();
        assert_eq!(lint[0].state, RunState::Success);
        let format = orch.get_active_handles("Format").unwrap();
        assert_eq!(
            format[0].trigger_chain,
            vec!["rs_file_changed", "command_success:Lint"]
        );
    }

    #[test]
    fn test_cancel_fires_callback() {
        let mut orch = PreviewOrchestrator::with_names(&["Build"]);
        let (tx, rx) = mpsc::channel();
        orch.set_lifecycle_callback(
            "Build",
            LifecycleCallbacks {
                on_cancelled: Some(Box::new(move |handle: &RunHandle| {
                    let _ = tx.send(handle.command.clone());
                })),
                ..LifecycleCallbacks::default()
            },
        );
        orch.run_command("Build", vec![]).unwrap();
        assert_eq!(orch.cancel_command("Build").unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), "Build");
        assert_eq!(
            orch.get_history("Build", 5).unwrap()[0].state,
            RunState::Cancelled
        );
    }

    #[test]
    fn test_history_is_most_recent_first() {
        let mut orch = PreviewOrchestrator::with_names(&["Tests"]).with_run_time(Duration::ZERO);
        orch.script_outcome("Tests", RunState::Failed);
        orch.run_command("Tests", vec![]).unwrap();
        orch.poll();
        orch.script_outcome("Tests", RunState::Success);
        orch.run_command("Tests", vec![]).unwrap();
        orch.poll();
        let states: Vec<RunState> = orch
            .get_history("Tests", 3)
            .unwrap()
            .iter()
            .map(|r| r.state)
            .collect();
        assert_eq!(states, vec![RunState::Success, RunState::Failed]);
    }

    #[test]
    fn test_unknown_command_is_an_error() {
        let mut orch = PreviewOrchestrator::with_names(&["Lint"]);
        assert!(matches!(
            orch.run_command("Nope", vec![]),
            Err(OrchestratorError::UnknownCommand(_))
        ));
        assert_eq!(orch.run_calls(), 0);
    }
}
