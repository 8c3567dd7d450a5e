//! Text for the details pane. Every builder has a fixed fallback, so a
//! misbehaving orchestrator never leaves the pane empty.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use log::error;

use crate::config::{CommandDescriptor, FrontendConfig};
use crate::hierarchy::{downstream, parse_lifecycle_trigger};
use crate::orchestrator::{
    LifecycleEvent, Orchestrator, OrchestratorError, RunHandle, RunResult, RunState,
    format_duration,
};
use crate::trigger::{DEFAULT_SEPARATOR, TriggerSource};

const HISTORY_ROWS: usize = 3;
const LIST_CAP: usize = 3;
const CHAIN_WIDTH: usize = 50;
const PREVIEW_LINES: usize = 5;

pub const NOT_YET_RUN: &str = "◯ Not yet run";
const RUNNING_FALLBACK: &str = "Running...";
const RUN_FALLBACK: &str = "Run command";
const STOP_FALLBACK: &str = "Stop command";

/// `{{ name }}` and `{{name}}` replaced from `[variables]`.
pub fn resolve_command(descriptor: &CommandDescriptor, variables: &[(String, String)]) -> String {
    variables
        .iter()
        .fold(descriptor.command.clone(), |text, (name, value)| {
            text.replace(&format!("{{{{ {name} }}}}"), value)
                .replace(&format!("{{{{{name}}}}}"), value)
        })
}

pub fn time_ago(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return "?".to_string();
    };
    let seconds = (Utc::now() - at).num_seconds();
    match seconds {
        s if s < 1 => "just now".to_string(),
        s if s < 60 => format!("{s}s ago"),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}

fn heading(name: &str) -> Vec<String> {
    vec![name.to_string(), "─".repeat(name.chars().count())]
}

fn history_line(result: &RunResult) -> String {
    format!(
        "  {} {} for {}",
        result.state.icon(),
        time_ago(result.finished_at),
        result.duration_str()
    )
}

fn command_line(config: &FrontendConfig, name: &str) -> String {
    match config.command(name) {
        Some(descriptor) => format!("Command: {}", resolve_command(descriptor, &config.variables)),
        None => format!("Command: <unknown command {name}>"),
    }
}

/// Status for a command with nothing in flight.
pub fn idle_status(orchestrator: &dyn Orchestrator, config: &FrontendConfig, name: &str) -> String {
    try_idle_status(orchestrator, config, name).unwrap_or_else(|err| {
        error!("Failed to build idle status for {}: {}", name, err);
        NOT_YET_RUN.to_string()
    })
}

fn try_idle_status(
    orchestrator: &dyn Orchestrator,
    config: &FrontendConfig,
    name: &str,
) -> Result<String, OrchestratorError> {
    let history = orchestrator.get_history(name, HISTORY_ROWS)?;
    let mut lines = heading(name);
    if history.is_empty() {
        lines.push(NOT_YET_RUN.to_string());
        return Ok(lines.join("\n"));
    }
    lines.push(if history.len() > 1 {
        format!("Last {} runs:", history.len())
    } else {
        "Last run:".to_string()
    });
    lines.extend(history.iter().map(history_line));
    lines.push(String::new());
    lines.push(command_line(config, name));
    Ok(lines.join("\n"))
}

pub fn running_status(config: &FrontendConfig, name: &str, handle: Option<&RunHandle>) -> String {
    let mut lines = heading(name);
    match handle {
        Some(handle) => {
            let elapsed = (Utc::now() - handle.started_at)
                .to_std()
                .map(format_duration)
                .unwrap_or_else(|_| "0.0s".to_string());
            lines.push(format!("{} Running for {}", RunState::Running.icon(), elapsed));
        }
        None => lines.push(format!("{} {}", RunState::Running.icon(), RUNNING_FALLBACK)),
    }
    lines.push(String::new());
    lines.push(command_line(config, name));
    lines.join("\n")
}

fn describe_trigger(trigger: &str) -> String {
    match parse_lifecycle_trigger(trigger) {
        Some((LifecycleEvent::Success, parent)) => format!("After {parent} succeeds"),
        Some((LifecycleEvent::Failed, parent)) => format!("After {parent} fails"),
        Some((LifecycleEvent::Cancelled, parent)) => format!("After {parent} is cancelled"),
        None => trigger.to_string(),
    }
}

fn capped(lines: &mut Vec<String>, items: &[&str], prefix: &str) {
    for item in items.iter().take(LIST_CAP) {
        lines.push(format!("  {prefix} {item}"));
    }
    if items.len() > LIST_CAP {
        lines.push(format!("  ... and {} more", items.len() - LIST_CAP));
    }
}

/// What running `name` would do: its command, what starts it and what it starts.
pub fn run_tooltip(config: &FrontendConfig, key: Option<&str>, name: &str) -> String {
    try_run_tooltip(config, key, name).unwrap_or_else(|err| {
        error!("Failed to build run tooltip for {}: {}", name, err);
        RUN_FALLBACK.to_string()
    })
}

fn try_run_tooltip(
    config: &FrontendConfig,
    key: Option<&str>,
    name: &str,
) -> Result<String, OrchestratorError> {
    let descriptor = config
        .command(name)
        .ok_or_else(|| OrchestratorError::UnknownCommand(name.to_string()))?;

    let mut lines = vec![format!("▶ Run {name}"), String::new()];
    lines.push(command_line(config, name));
    lines.push(String::new());

    lines.push("Triggers:".to_string());
    for trigger in &descriptor.triggers {
        lines.push(format!("  • {}", describe_trigger(trigger)));
    }
    match key {
        Some(key) => lines.push(format!("  • [{key}] manual")),
        None => lines.push("  • manual".to_string()),
    }

    for (event, title) in [
        (LifecycleEvent::Success, "On success →"),
        (LifecycleEvent::Failed, "On failure →"),
    ] {
        let next = downstream(&config.commands, name, event);
        if !next.is_empty() {
            lines.push(String::new());
            lines.push(title.to_string());
            capped(&mut lines, &next, "→");
        }
    }

    if !descriptor.cancel_on_triggers.is_empty() {
        let cancel: Vec<&str> = descriptor
            .cancel_on_triggers
            .iter()
            .map(String::as_str)
            .collect();
        lines.push(String::new());
        lines.push("Cancel on:".to_string());
        capped(&mut lines, &cancel, "•");
    }

    Ok(lines.join("\n"))
}

/// Why `name` is running right now and how to stop it.
pub fn stop_tooltip(
    config: &FrontendConfig,
    key: Option<&str>,
    name: &str,
    handle: Option<&RunHandle>,
) -> String {
    try_stop_tooltip(config, key, name, handle).unwrap_or_else(|err| {
        error!("Failed to build stop tooltip for {}: {}", name, err);
        STOP_FALLBACK.to_string()
    })
}

fn try_stop_tooltip(
    config: &FrontendConfig,
    key: Option<&str>,
    name: &str,
    handle: Option<&RunHandle>,
) -> Result<String, OrchestratorError> {
    config
        .command(name)
        .ok_or_else(|| OrchestratorError::UnknownCommand(name.to_string()))?;

    let mut lines = vec![format!("⏹ Stop {name}"), String::new()];
    lines.push(command_line(config, name));

    if let Some(handle) = handle.filter(|h| !h.trigger_chain.is_empty()) {
        let source = TriggerSource::classify(handle.trigger_chain.clone());
        lines.push(String::new());
        lines.push(format!("Trigger: {}", source.semantic_summary()));
        if handle.trigger_chain.len() > 1 {
            lines.push(String::new());
            lines.push("Chain:".to_string());
            lines.push(format!(
                "  {}",
                source.format_chain(DEFAULT_SEPARATOR, Some(CHAIN_WIDTH))
            ));
        }
    }

    if let Some(key) = key {
        lines.push(String::new());
        lines.push(format!("[{key}] to stop"));
    }
    Ok(lines.join("\n"))
}

/// The last few lines of a run's captured output, if any.
pub fn output_preview(name: &str, output: Option<&Path>) -> String {
    let Some(path) = output else {
        return format!("{name}\n\nNo output available yet");
    };
    match fs::read_to_string(path) {
        Ok(text) => {
            let all: Vec<&str> = text.lines().collect();
            let tail = &all[all.len().saturating_sub(PREVIEW_LINES)..];
            let mut lines = vec![name.to_string(), String::new()];
            lines.push(format!("Open: {}", path.display()));
            lines.push(format!("Last {} of {} lines:", tail.len(), all.len()));
            lines.extend(tail.iter().map(|l| format!("  {l}")));
            lines.join("\n")
        }
        Err(err) => {
            error!("Failed to read output for {} at {}: {}", name, path.display(), err);
            format!("{name}\n\nOutput unreadable: {}", path.display())
        }
    }
}
