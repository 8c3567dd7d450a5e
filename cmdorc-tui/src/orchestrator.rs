//! The surface this frontend consumes from the command orchestrator.
//!
//! The orchestrator owns execution, trigger resolution and run history. This
//! crate only reads its state and asks it to run or cancel things.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::CommandDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

/// Icon shown for a command that has never run.
pub const IDLE_ICON: &str = "◯";

impl RunState {
    /// Every display surface goes through here so icons never disagree.
    pub fn icon(self) -> &'static str {
        match self {
            RunState::Success => "✅",
            RunState::Failed => "❌",
            RunState::Cancelled => "⏹",
            RunState::Running => "⏳",
            RunState::Pending => "❓",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running => "running",
            RunState::Success => "success",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Success | RunState::Failed | RunState::Cancelled
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub command: String,
    pub state: RunState,
    pub duration: Option<Duration>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output_path: Option<PathBuf>,
    pub trigger_chain: Vec<String>,
}

impl RunResult {
    /// `"1.2s"`, `"3m 4s"`, or `"?"` when the orchestrator did not time the run.
    pub fn duration_str(&self) -> String {
        self.duration
            .map(format_duration)
            .unwrap_or_else(|| "?".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub id: String,
    pub command: String,
    pub trigger_chain: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub comment: Option<String>,
    pub result: Option<RunResult>,
}

impl RunHandle {
    /// A handle can finish between being listed as active and being read.
    pub fn is_finalized(&self) -> bool {
        self.result.is_some()
    }

    pub fn state(&self) -> RunState {
        self.result
            .as_ref()
            .map(|result| result.state)
            .unwrap_or(RunState::Running)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Success,
    Failed,
    Cancelled,
}

impl LifecycleEvent {
    pub const ALL: [LifecycleEvent; 3] = [
        LifecycleEvent::Success,
        LifecycleEvent::Failed,
        LifecycleEvent::Cancelled,
    ];

    pub fn from_state(state: RunState) -> Option<Self> {
        match state {
            RunState::Success => Some(LifecycleEvent::Success),
            RunState::Failed => Some(LifecycleEvent::Failed),
            RunState::Cancelled => Some(LifecycleEvent::Cancelled),
            RunState::Pending | RunState::Running => None,
        }
    }

    /// Trigger expression the orchestrator emits when `command` reaches this event.
    pub fn trigger_for(self, command: &str) -> String {
        let prefix = match self {
            LifecycleEvent::Success => "command_success",
            LifecycleEvent::Failed => "command_failed",
            LifecycleEvent::Cancelled => "command_cancelled",
        };
        format!("{prefix}:{command}")
    }
}

pub type LifecycleCallback = Box<dyn Fn(&RunHandle) + Send>;

/// One callback per terminal event, installed per command.
#[derive(Default)]
pub struct LifecycleCallbacks {
    pub on_success: Option<LifecycleCallback>,
    pub on_failed: Option<LifecycleCallback>,
    pub on_cancelled: Option<LifecycleCallback>,
}

impl LifecycleCallbacks {
    pub fn get(&self, event: LifecycleEvent) -> Option<&LifecycleCallback> {
        match event {
            LifecycleEvent::Success => self.on_success.as_ref(),
            LifecycleEvent::Failed => self.on_failed.as_ref(),
            LifecycleEvent::Cancelled => self.on_cancelled.as_ref(),
        }
    }
}

impl fmt::Debug for LifecycleCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCallbacks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failed", &self.on_failed.is_some())
            .field("on_cancelled", &self.on_cancelled.is_some())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("command '{0}' is not defined")]
    UnknownCommand(String),
    #[error("orchestrator unavailable: {0}")]
    Unavailable(String),
}

pub trait Orchestrator {
    /// Command names in config order.
    fn list_commands(&self) -> Vec<String>;

    fn has_command(&self, name: &str) -> bool;

    fn get_active_handles(&self, name: &str) -> Result<Vec<RunHandle>, OrchestratorError>;

    /// Terminal results, most recent first.
    fn get_history(&self, name: &str, limit: usize) -> Result<Vec<RunResult>, OrchestratorError>;

    fn set_lifecycle_callback(&mut self, name: &str, callbacks: LifecycleCallbacks);

    fn run_command(
        &mut self,
        name: &str,
        trigger_chain: Vec<String>,
    ) -> Result<RunHandle, OrchestratorError>;

    /// Returns how many runs were cancelled.
    fn cancel_command(&mut self, name: &str) -> Result<usize, OrchestratorError>;

    /// Fire a named trigger (file watcher events, custom triggers).
    fn trigger(&mut self, event: &str) -> Result<(), OrchestratorError>;

    /// Swap in a reloaded command set.
    fn replace_commands(&mut self, commands: &[CommandDescriptor]);

    /// Advance in-flight work; called once per event-loop tick.
    fn poll(&mut self);
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
