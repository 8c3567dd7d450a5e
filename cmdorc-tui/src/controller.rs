//! The embed point: owns the loaded config generation and the orchestrator,
//! and moves run/cancel/trigger requests onto the event loop.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};

use crate::config::{ConfigError, FrontendConfig};
use crate::hierarchy::{CommandNode, build_hierarchy};
use crate::keyboard::{ConflictMap, KeyBindings, compute_conflicts, validate_keys};
use crate::lifecycle::{LifecycleNotice, ListenerRegistry, forwarding_callbacks};
use crate::notifier::Notifier;
use crate::orchestrator::{Orchestrator, OrchestratorError, RunHandle};
use crate::reconcile::{CommandView, StateReconciler};
use crate::trigger::TriggerSource;
use crate::watcher::FileWatchers;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Run(String),
    Cancel(String),
    /// A named trigger, usually from a file watcher.
    Trigger(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Started {
        command: String,
        source: TriggerSource,
        handle: RunHandle,
    },
    Cancelled {
        command: String,
        count: usize,
    },
    Finished(LifecycleNotice),
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("controller is not attached; call attach() first")]
    NotAttached,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("file watcher failed: {0}")]
    Watcher(#[from] notify::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub commands_loaded: usize,
    pub watchers_active: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn summary(&self) -> String {
        format!(
            "{} commands, {} watchers, {} warnings",
            self.commands_loaded,
            self.watchers_active,
            self.warnings.len()
        )
    }
}

/// Everything derived from one load of the config file. Rebuilt whole on
/// reload and swapped in with a single assignment.
#[derive(Debug, Clone)]
pub struct ConfigGeneration {
    pub config: FrontendConfig,
    pub hierarchy: Vec<CommandNode>,
    pub conflicts: ConflictMap,
    pub bindings: KeyBindings,
}

impl ConfigGeneration {
    pub fn build(config: FrontendConfig) -> Self {
        let hierarchy = build_hierarchy(&config.commands);
        let conflicts = compute_conflicts(&config.keyboard.shortcuts);
        let bindings = if config.keyboard.enabled {
            KeyBindings::bind_all(&config.keyboard.shortcuts, &conflicts)
        } else {
            debug!("Keyboard shortcuts disabled");
            KeyBindings::disabled()
        };
        Self {
            config,
            hierarchy,
            conflicts,
            bindings,
        }
    }
}

pub struct Controller<O: Orchestrator> {
    config_path: PathBuf,
    generation: Arc<ConfigGeneration>,
    orchestrator: O,
    notifier: Box<dyn Notifier>,
    enable_watchers: bool,
    attached: bool,
    watchers: Option<FileWatchers>,
    requests_tx: Sender<Request>,
    requests_rx: Receiver<Request>,
    notices_tx: Sender<LifecycleNotice>,
    notices_rx: Receiver<LifecycleNotice>,
    pending_triggers: HashMap<String, Instant>,
    listeners: ListenerRegistry,
    reconciler: StateReconciler,
}

impl<O: Orchestrator> Controller<O> {
    /// Loads `config_path`. The orchestrator is told about the loaded commands.
    pub fn new(
        config_path: &Path,
        orchestrator: O,
        notifier: Box<dyn Notifier>,
        enable_watchers: bool,
    ) -> Result<Self, ControllerError> {
        let config = FrontendConfig::load(config_path).inspect_err(|err| {
            error!("Failed to load config from {}: {}", config_path.display(), err);
        })?;
        Ok(Self::from_config(config, orchestrator, notifier, enable_watchers))
    }

    pub fn from_config(
        config: FrontendConfig,
        mut orchestrator: O,
        notifier: Box<dyn Notifier>,
        enable_watchers: bool,
    ) -> Self {
        let descriptors: Vec<_> = config.commands.iter().map(|c| (**c).clone()).collect();
        orchestrator.replace_commands(&descriptors);

        let (requests_tx, requests_rx) = mpsc::channel();
        let (notices_tx, notices_rx) = mpsc::channel();
        info!(
            "Controller created: {} commands from {}",
            config.commands.len(),
            config.path.display()
        );
        Self {
            config_path: config.path.clone(),
            generation: Arc::new(ConfigGeneration::build(config)),
            orchestrator,
            notifier,
            enable_watchers,
            attached: false,
            watchers: None,
            requests_tx,
            requests_rx,
            notices_tx,
            notices_rx,
            pending_triggers: HashMap::new(),
            listeners: ListenerRegistry::new(),
            reconciler: StateReconciler::new(),
        }
    }

    /// Wires lifecycle callbacks and starts watchers. Calling it again is a no-op.
    pub fn attach(&mut self) {
        if self.attached {
            debug!("Controller already attached");
            return;
        }
        self.attached = true;
        self.wire_callbacks();
        self.start_watchers();
        info!("Controller attached");
    }

    pub fn detach(&mut self) {
        if self.watchers.take().is_some() {
            self.notifier.info("File watchers stopped");
        }
        self.attached = false;
        self.pending_triggers.clear();
        info!("Controller detached");
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    fn wire_callbacks(&mut self) {
        for name in self.orchestrator.list_commands() {
            let callbacks = forwarding_callbacks(&name, &self.notices_tx);
            self.orchestrator.set_lifecycle_callback(&name, callbacks);
        }
    }

    fn start_watchers(&mut self) {
        self.watchers = None;
        let configs = &self.generation.config.watchers;
        if !self.enable_watchers || configs.is_empty() {
            return;
        }
        match FileWatchers::start(configs, &self.requests_tx) {
            Ok(watchers) => {
                self.notifier
                    .info(&format!("File watchers started ({} configured)", configs.len()));
                self.watchers = Some(watchers);
            }
            Err(err) => {
                error!("Failed to start file watchers: {}", err);
                self.notifier
                    .error(&format!("File watcher initialization failed: {err}"));
            }
        }
    }

    /// Schedules a run and returns immediately; the outcome arrives through
    /// [`Controller::pump`] and the listener registry.
    pub fn request_run(&self, name: &str) -> Result<(), ControllerError> {
        self.enqueue(Request::Run(name.to_string()))
    }

    pub fn request_cancel(&self, name: &str) -> Result<(), ControllerError> {
        self.enqueue(Request::Cancel(name.to_string()))
    }

    fn enqueue(&self, request: Request) -> Result<(), ControllerError> {
        if !self.attached {
            return Err(ControllerError::NotAttached);
        }
        trace!("Queueing {:?}", request);
        // the receiver lives in self, so this cannot fail while self exists
        let _ = self.requests_tx.send(request);
        Ok(())
    }

    /// A sender other threads can use to hand requests to the event loop.
    pub fn request_sender(&self) -> Sender<Request> {
        self.requests_tx.clone()
    }

    /// Runs on the event loop once per tick: drains queued requests, fires
    /// debounced triggers, advances the orchestrator and dispatches lifecycle
    /// notices.
    pub fn pump(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(request) = self.requests_rx.try_recv() {
            match request {
                Request::Run(name) => {
                    if let Some(event) = self.run_now(&name) {
                        events.push(event);
                    }
                }
                Request::Cancel(name) => {
                    if let Some(event) = self.cancel_now(&name) {
                        events.push(event);
                    }
                }
                Request::Trigger(name) => {
                    if self.attached {
                        self.pending_triggers.insert(name, Instant::now());
                    }
                }
            }
        }

        self.fire_due_triggers();
        self.orchestrator.poll();

        while let Ok(notice) = self.notices_rx.try_recv() {
            let ran = self.listeners.dispatch(&notice);
            trace!(
                "{:?} for '{}' reached {} listeners",
                notice.event, notice.command, ran
            );
            events.push(ControllerEvent::Finished(notice));
        }
        events
    }

    fn run_now(&mut self, name: &str) -> Option<ControllerEvent> {
        if !self.orchestrator.has_command(name) {
            self.notifier.warning(&format!("Command not found: {name}"));
            return None;
        }
        match self.orchestrator.run_command(name, Vec::new()) {
            Ok(handle) => {
                self.notifier.info(&format!("Started: {name}"));
                Some(ControllerEvent::Started {
                    command: name.to_string(),
                    source: TriggerSource::classify(handle.trigger_chain.clone()),
                    handle,
                })
            }
            Err(err) => {
                error!("Error running command '{}': {}", name, err);
                self.notifier.error(&format!("Failed to start {name}: {err}"));
                None
            }
        }
    }

    fn cancel_now(&mut self, name: &str) -> Option<ControllerEvent> {
        if !self.orchestrator.has_command(name) {
            self.notifier.warning(&format!("Command not found: {name}"));
            return None;
        }
        match self.orchestrator.cancel_command(name) {
            Ok(count) => {
                self.notifier.info(&format!("Cancelled: {name}"));
                Some(ControllerEvent::Cancelled {
                    command: name.to_string(),
                    count,
                })
            }
            Err(err) => {
                error!("Error cancelling command '{}': {}", name, err);
                self.notifier.error(&format!("Failed to cancel {name}: {err}"));
                None
            }
        }
    }

    fn fire_due_triggers(&mut self) {
        if self.pending_triggers.is_empty() {
            return;
        }
        let debounce = self.debounce_windows();
        let due: Vec<String> = self
            .pending_triggers
            .iter()
            .filter(|(name, seen)| {
                let window = debounce.get(name.as_str()).copied().unwrap_or_default();
                seen.elapsed() >= window
            })
            .map(|(name, _)| name.clone())
            .collect();
        for name in due {
            self.pending_triggers.remove(&name);
            debug!("Triggered '{}' from file change", name);
            if let Err(err) = self.orchestrator.trigger(&name) {
                error!("Failed to trigger '{}': {}", name, err);
                self.notifier.error(&format!("Failed to trigger {name}: {err}"));
            }
        }
    }

    fn debounce_windows(&self) -> HashMap<&str, Duration> {
        self.generation
            .config
            .watchers
            .iter()
            .map(|w| (w.trigger.as_str(), Duration::from_millis(w.debounce_ms)))
            .collect()
    }

    /// Re-reads the config file. On failure the previous generation stays in
    /// place and the error is both notified and returned.
    pub fn reload_config(&mut self) -> Result<(), ControllerError> {
        let config = match FrontendConfig::load(&self.config_path) {
            Ok(config) => config,
            Err(err) => {
                error!("Failed to reload config: {}", err);
                self.notifier.error(&format!("Failed to reload config: {err}"));
                return Err(err.into());
            }
        };

        let descriptors: Vec<_> = config.commands.iter().map(|c| (**c).clone()).collect();
        let next = Arc::new(ConfigGeneration::build(config));
        self.orchestrator.replace_commands(&descriptors);
        self.generation = next;

        if self.attached {
            self.wire_callbacks();
            self.start_watchers();
        }
        self.notifier.info("Configuration reloaded");
        Ok(())
    }

    pub fn generation(&self) -> Arc<ConfigGeneration> {
        Arc::clone(&self.generation)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn hierarchy(&self) -> &[CommandNode] {
        &self.generation.hierarchy
    }

    /// `{key: command}` for the commands that actually own their key.
    pub fn keyboard_hints(&self) -> BTreeMap<String, String> {
        let bindings = &self.generation.bindings;
        self.generation
            .config
            .keyboard
            .shortcuts
            .iter()
            .filter_map(|shortcut| {
                bindings
                    .command_for(&shortcut.key)
                    .filter(|winner| *winner == shortcut.command)
                    .map(|winner| (shortcut.key.clone(), winner.to_string()))
            })
            .collect()
    }

    pub fn keyboard_conflicts(&self) -> &ConflictMap {
        &self.generation.conflicts
    }

    pub fn validate_config(&self) -> ValidationResult {
        let generation = &self.generation;
        let config = &generation.config;
        let mut result = ValidationResult {
            commands_loaded: config.commands.len(),
            watchers_active: config.watchers.len(),
            ..ValidationResult::default()
        };

        result.warnings.extend(validate_keys(&config.keyboard.shortcuts));
        for shortcut in &config.keyboard.shortcuts {
            if config.command(&shortcut.command).is_none() {
                result.warnings.push(format!(
                    "Shortcut for '{}' references unknown command",
                    shortcut.command
                ));
            }
        }
        for (key, commands) in &generation.conflicts {
            let winner = commands.first().map(String::as_str).unwrap_or_default();
            result.warnings.push(format!(
                "Duplicate key '{}' for {} (first one wins: {})",
                key,
                commands.join(", "),
                winner
            ));
        }

        for warning in &result.warnings {
            warn!("{}", warning);
        }
        result
    }

    pub fn reconcile(&self, view: &mut dyn CommandView) {
        self.reconciler.reconcile(&self.orchestrator, view);
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }

    pub fn orchestrator(&self) -> &O {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut O {
        &mut self.orchestrator
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }
}

impl<O: Orchestrator> Drop for Controller<O> {
    fn drop(&mut self) {
        if self.attached {
            self.detach();
        }
    }
}
