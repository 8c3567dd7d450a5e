//! Listener registry keyed by command name and lifecycle event.
//!
//! Orchestrator callbacks only forward a [`LifecycleNotice`] onto a channel;
//! the event loop drains that channel and dispatches here, so listeners run
//! on the loop thread.

use std::collections::HashMap;
use std::sync::mpsc::Sender;

use log::{error, trace};

use crate::orchestrator::{LifecycleCallbacks, LifecycleEvent, RunHandle};

pub type Listener = Box<dyn FnMut(&RunHandle)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleNotice {
    pub command: String,
    pub event: LifecycleEvent,
    pub handle: RunHandle,
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: HashMap<(String, LifecycleEvent), Vec<Listener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }

    pub fn register(&mut self, command: &str, event: LifecycleEvent, listener: Listener) {
        self.listeners
            .entry((command.to_string(), event))
            .or_default()
            .push(listener);
    }

    pub fn on_success(&mut self, command: &str, listener: impl FnMut(&RunHandle) + 'static) {
        self.register(command, LifecycleEvent::Success, Box::new(listener));
    }

    pub fn on_failed(&mut self, command: &str, listener: impl FnMut(&RunHandle) + 'static) {
        self.register(command, LifecycleEvent::Failed, Box::new(listener));
    }

    pub fn on_cancelled(&mut self, command: &str, listener: impl FnMut(&RunHandle) + 'static) {
        self.register(command, LifecycleEvent::Cancelled, Box::new(listener));
    }

    /// Returns how many listeners ran.
    pub fn dispatch(&mut self, notice: &LifecycleNotice) -> usize {
        let key = (notice.command.clone(), notice.event);
        let Some(listeners) = self.listeners.get_mut(&key) else {
            trace!("No listeners for {:?} on '{}'", notice.event, notice.command);
            return 0;
        };
        for listener in listeners.iter_mut() {
            listener(&notice.handle);
        }
        listeners.len()
    }

    pub fn listener_count(&self, command: &str, event: LifecycleEvent) -> usize {
        self.listeners
            .get(&(command.to_string(), event))
            .map_or(0, Vec::len)
    }
}

/// Callbacks for one command that forward every terminal event to `tx`.
pub fn forwarding_callbacks(command: &str, tx: &Sender<LifecycleNotice>) -> LifecycleCallbacks {
    let forward = |event: LifecycleEvent| {
        let command = command.to_string();
        let tx = tx.clone();
        Box::new(move |handle: &RunHandle| {
            let notice = LifecycleNotice {
                command: command.clone(),
                event,
                handle: handle.clone(),
            };
            if tx.send(notice).is_err() {
                error!("Lifecycle channel closed; dropped {:?} for '{}'", event, command);
            }
        }) as Box<dyn Fn(&RunHandle) + Send>
    };
    LifecycleCallbacks {
        on_success: Some(forward(LifecycleEvent::Success)),
        on_failed: Some(forward(LifecycleEvent::Failed)),
        on_cancelled: Some(forward(LifecycleEvent::Cancelled)),
    }
}
