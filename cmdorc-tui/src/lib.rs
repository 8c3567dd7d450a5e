//! Terminal frontend for a command orchestrator.
//!
//! The orchestrator itself lives behind [`orchestrator::Orchestrator`]; this
//! crate turns its configuration into a command tree, resolves keyboard
//! shortcuts, keeps the display in sync with run state and shows where each
//! run came from.

pub mod app;
pub mod config;
pub mod controller;
pub mod hierarchy;
pub mod keyboard;
pub mod lifecycle;
pub mod logger;
pub mod notifier;
pub mod orchestrator;
pub mod preview;
pub mod reconcile;
pub mod tooltip;
pub mod trigger;
pub mod tui;
pub mod watcher;
