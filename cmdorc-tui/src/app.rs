use std::collections::HashMap;
use std::path::PathBuf;

use log::{debug, info, trace, warn};

use crate::controller::{Controller, ControllerEvent, ValidationResult};
use crate::hierarchy::{CommandNode, occurrences};
use crate::keyboard::SHADOW_MARKER;
use crate::notifier::{BufferNotifier, Notice, Notifier};
use crate::orchestrator::{IDLE_ICON, Orchestrator, RunState};
use crate::reconcile::CommandView;
use crate::tooltip;

/// One line of the flattened command tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRow {
    pub name: String,
    /// Box-drawing prefix, e.g. `│  └─ `.
    pub prefix: String,
    /// The command also appears elsewhere in the tree.
    pub duplicate: bool,
}

pub fn flatten_tree(forest: &[CommandNode]) -> Vec<TreeRow> {
    let counts = occurrences(forest);
    let mut rows = Vec::new();
    for node in forest {
        push_rows(node, "", None, &counts, &mut rows);
    }
    rows
}

fn push_rows(
    node: &CommandNode,
    indent: &str,
    is_last: Option<bool>,
    counts: &HashMap<String, usize>,
    rows: &mut Vec<TreeRow>,
) {
    let (prefix, child_indent) = match is_last {
        None => (String::new(), String::new()),
        Some(true) => (format!("{indent}└─ "), format!("{indent}   ")),
        Some(false) => (format!("{indent}├─ "), format!("{indent}│  ")),
    };
    rows.push(TreeRow {
        name: node.name().to_string(),
        prefix,
        duplicate: counts.get(node.name()).copied().unwrap_or(0) > 1,
    });
    let last = node.children.len().saturating_sub(1);
    for (idx, child) in node.children.iter().enumerate() {
        push_rows(child, &child_indent, Some(idx == last), counts, rows);
    }
}

/// The shortcut shown beside a command in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyHint {
    pub key: String,
    /// Declared, but another command was declared first and owns the key.
    pub shadowed: bool,
}

impl KeyHint {
    pub fn label(&self) -> String {
        if self.shadowed {
            format!("[{}] {SHADOW_MARKER}", self.key)
        } else {
            format!("[{}]", self.key)
        }
    }
}

/// What the tree shows for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandState {
    pub name: String,
    pub running: bool,
    pub icon: String,
    pub status: String,
    pub output_path: Option<PathBuf>,
}

impl CommandState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            running: false,
            icon: IDLE_ICON.to_string(),
            status: "Idle".to_string(),
            output_path: None,
        }
    }
}

impl CommandView for CommandState {
    fn command_name(&self) -> &str {
        &self.name
    }

    fn set_running(&mut self, running: bool, tooltip: String) {
        self.running = running;
        if running {
            self.icon = RunState::Running.icon().to_string();
        }
        self.status = tooltip;
    }

    fn set_result(&mut self, icon: &str, tooltip: String, output_path: Option<PathBuf>) {
        self.running = false;
        self.icon = icon.to_string();
        self.status = tooltip;
        self.output_path = output_path;
    }
}

pub struct App<O: Orchestrator> {
    pub controller: Controller<O>,
    pub rows: Vec<TreeRow>,
    pub selected: usize,
    pub show_help: bool,
    pub validation: ValidationResult,
    states: HashMap<String, CommandState>,
    notices: BufferNotifier,
}

impl<O: Orchestrator> App<O> {
    /// `notices` must be the buffer the controller reports into.
    pub fn new(controller: Controller<O>, notices: BufferNotifier) -> Self {
        info!("Creating App for {}", controller.config_path().display());
        let mut app = Self {
            controller,
            rows: Vec::new(),
            selected: 0,
            show_help: false,
            validation: ValidationResult::default(),
            states: HashMap::new(),
            notices,
        };
        app.refresh_generation();
        app
    }

    /// Rebuilds rows and states from the controller's current generation.
    fn refresh_generation(&mut self) {
        let generation = self.controller.generation();
        self.rows = flatten_tree(&generation.hierarchy);
        self.states
            .retain(|name, _| generation.config.command(name).is_some());
        for command in &generation.config.commands {
            self.states
                .entry(command.name.clone())
                .or_insert_with(|| CommandState::new(&command.name));
        }
        if self.selected >= self.rows.len() {
            self.selected = self.rows.len().saturating_sub(1);
        }

        self.validation = self.controller.validate_config();
        for warning in &self.validation.warnings {
            self.notices.warning(warning);
        }
        self.reconcile_all();
        debug!("{} tree rows for {} commands", self.rows.len(), self.states.len());
    }

    pub fn reconcile_all(&mut self) {
        for state in self.states.values_mut() {
            self.controller.reconcile(state);
        }
    }

    /// Called once per tick by the UI loop.
    pub fn tick(&mut self) -> Vec<ControllerEvent> {
        let events = self.controller.pump();
        for event in &events {
            if let ControllerEvent::Finished(notice) = event {
                let state = notice.handle.state();
                let duration = notice
                    .handle
                    .result
                    .as_ref()
                    .map(|r| r.duration_str())
                    .unwrap_or_else(|| "?".to_string());
                self.notices.info(&format!(
                    "{} {} {} ({})",
                    state.icon(),
                    notice.command,
                    state,
                    duration
                ));
            }
        }
        self.reconcile_all();
        events
    }

    pub fn state(&self, name: &str) -> Option<&CommandState> {
        self.states.get(name)
    }

    pub fn selected_name(&self) -> Option<&str> {
        self.rows.get(self.selected).map(|row| row.name.as_str())
    }

    pub fn move_next(&mut self) {
        if self.rows.is_empty() {
            return;
        }
        self.selected = (self.selected + 1).min(self.rows.len() - 1);
    }

    pub fn move_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Run when idle, cancel when running.
    pub fn toggle(&mut self, name: &str) {
        let running = self.states.get(name).is_some_and(|s| s.running);
        let result = if running {
            info!("Cancelling '{}'", name);
            self.controller.request_cancel(name)
        } else {
            info!("Running '{}'", name);
            self.controller.request_run(name)
        };
        if let Err(err) = result {
            warn!("Toggle of '{}' rejected: {}", name, err);
            self.notices.error(&format!("{name}: {err}"));
        }
    }

    pub fn toggle_selected(&mut self) {
        if let Some(name) = self.selected_name().map(str::to_string) {
            self.toggle(&name);
        }
    }

    /// Returns whether `key` was bound.
    pub fn press_shortcut(&mut self, key: &str) -> bool {
        let generation = self.controller.generation();
        let Some(name) = generation.bindings.command_for(key) else {
            trace!("No binding for [{}]", key);
            return false;
        };
        self.toggle(name);
        true
    }

    pub fn reload(&mut self) {
        if self.controller.reload_config().is_ok() {
            self.refresh_generation();
        }
    }

    pub fn key_hint(&self, name: &str) -> Option<KeyHint> {
        let generation = self.controller.generation();
        if let Some(key) = generation.bindings.key_for(name) {
            return Some(KeyHint {
                key: key.to_string(),
                shadowed: false,
            });
        }
        if !generation.bindings.is_shadowed(name) {
            return None;
        }
        let key = generation.config.keyboard.key_for(name)?;
        Some(KeyHint {
            key: key.to_string(),
            shadowed: true,
        })
    }

    pub fn help_text(&self) -> String {
        let mut text = self.controller.generation().bindings.help_text();
        text.push_str(
            "\nControls:\n  ↑/↓ select  Enter run/stop  Ctrl+R reload\n  ?/Ctrl+H help  Esc/Ctrl+C quit\n",
        );
        text
    }

    /// Status and action text for the selected command.
    pub fn details(&self) -> String {
        let Some(name) = self.selected_name() else {
            return "No commands configured".to_string();
        };
        let generation = self.controller.generation();
        let config = &generation.config;
        let key = if config.keyboard.show_in_tooltips {
            generation.bindings.key_for(name)
        } else {
            None
        };
        let orchestrator = self.controller.orchestrator();
        let running = self.states.get(name).is_some_and(|s| s.running);

        let (status, action) = if running {
            let handle = orchestrator
                .get_active_handles(name)
                .ok()
                .and_then(|handles| handles.into_iter().last());
            (
                tooltip::running_status(config, name, handle.as_ref()),
                tooltip::stop_tooltip(config, key, name, handle.as_ref()),
            )
        } else {
            (
                tooltip::idle_status(orchestrator, config, name),
                tooltip::run_tooltip(config, key, name),
            )
        };

        let mut text = format!("{status}\n\n{action}");
        if let Some(state) = self.states.get(name).filter(|s| s.output_path.is_some()) {
            text.push_str("\n\n");
            text.push_str(&tooltip::output_preview(name, state.output_path.as_deref()));
        }
        text
    }

    /// Newest last.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.snapshot()
    }

    pub fn header(&self) -> String {
        format!(
            "{} | {}",
            self.controller.config_path().display(),
            self.validation.summary()
        )
    }
}
