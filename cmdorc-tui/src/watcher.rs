//! File watching. Notify's callback thread never touches the orchestrator:
//! it only sends a [`Request::Trigger`] to the event loop.

use std::path::Path;
use std::sync::mpsc::Sender;

use log::{debug, info, trace, warn};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::WatcherConfig;
use crate::controller::Request;

/// Keeps the watchers alive; dropping it stops them.
pub struct FileWatchers {
    watchers: Vec<RecommendedWatcher>,
}

impl FileWatchers {
    pub fn start(configs: &[WatcherConfig], tx: &Sender<Request>) -> Result<Self, notify::Error> {
        let mut watchers = Vec::with_capacity(configs.len());
        for config in configs {
            if !config.dir.exists() {
                warn!("Watcher directory does not exist: {}", config.dir.display());
                continue;
            }

            let filter = config.clone();
            let tx = tx.clone();
            let mut watcher =
                notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
                    let event = match res {
                        Ok(event) => event,
                        Err(err) => {
                            warn!("File watcher error for '{}': {}", filter.trigger, err);
                            return;
                        }
                    };
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    if event.paths.iter().any(|path| matches_filters(&filter, path)) {
                        trace!("File change for '{}': {:?}", filter.trigger, event.paths);
                        if tx.send(Request::Trigger(filter.trigger.clone())).is_err() {
                            debug!("Event loop gone; dropping '{}'", filter.trigger);
                        }
                    }
                })?;
            watcher.watch(&config.dir, RecursiveMode::Recursive)?;
            info!(
                "Watching {} for '{}' (debounce: {}ms)",
                config.dir.display(),
                config.trigger,
                config.debounce_ms
            );
            watchers.push(watcher);
        }
        Ok(Self { watchers })
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }
}

pub fn matches_filters(config: &WatcherConfig, path: &Path) -> bool {
    let relative = path.strip_prefix(&config.dir).unwrap_or(path);
    let ignored = relative.components().any(|component| {
        let part = component.as_os_str().to_string_lossy();
        config.ignore_dirs.iter().any(|dir| *dir == part)
    });
    if ignored {
        return false;
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    if let Some(extensions) = &config.extensions {
        let wanted = extensions.iter().any(|ext| {
            let ext = if ext.starts_with('.') {
                ext.clone()
            } else {
                format!(".{ext}")
            };
            ext == suffix
        });
        if !wanted {
            return false;
        }
    }

    if let Some(patterns) = &config.patterns {
        let matched = patterns.iter().any(|pattern| {
            if let Some(tail) = pattern.strip_prefix("**/*") {
                name.ends_with(tail)
            } else if let Some(ext) = pattern.strip_prefix('*') {
                pattern.starts_with("*.") && suffix == ext
            } else {
                name == *pattern
            }
        });
        if !matched {
            return false;
        }
    }

    true
}
