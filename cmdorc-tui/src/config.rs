use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

const DEFAULT_DEBOUNCE_MS: u64 = 300;

pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# Auto-generated config.toml for cmdorc-tui

[variables]
base_dir = "."

[[file_watcher]]
dir = "."
extensions = [".rs"]
trigger = "rs_file_changed"
debounce_ms = 300
ignore_dirs = ["target", ".git"]

[[command]]
name = "Lint"
command = "cargo clippy --all-targets"
triggers = ["rs_file_changed"]
max_concurrent = 1

[[command]]
name = "Format"
command = "cargo fmt --all"
triggers = ["command_success:Lint"]
max_concurrent = 1

[[command]]
name = "Tests"
command = "cargo test --manifest-path {{ base_dir }}/Cargo.toml"
triggers = ["command_success:Format"]

[keyboard]
shortcuts = { Lint = "1", Format = "2", Tests = "3" }
enabled = true
show_in_tooltips = true
"#;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed reading config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML in {} (make sure string values are quoted): {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A command as declared in `[[command]]`. The orchestrator owns its meaning;
/// the frontend only reads it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub cancel_on_triggers: Vec<String>,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub command: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KeyboardConfig {
    /// Declaration order is significant: the first command to claim a key gets it.
    #[serde(default, deserialize_with = "ordered_shortcuts")]
    pub shortcuts: Vec<Shortcut>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub show_in_tooltips: bool,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            shortcuts: Vec::new(),
            enabled: true,
            show_in_tooltips: true,
        }
    }
}

impl KeyboardConfig {
    pub fn key_for(&self, command: &str) -> Option<&str> {
        self.shortcuts
            .iter()
            .find(|shortcut| shortcut.command == command)
            .map(|shortcut| shortcut.key.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    pub dir: PathBuf,
    pub patterns: Option<Vec<String>>,
    pub extensions: Option<Vec<String>>,
    pub ignore_dirs: Vec<String>,
    pub trigger: String,
    pub debounce_ms: u64,
}

#[derive(Debug, Deserialize)]
struct RawWatcher {
    dir: String,
    patterns: Option<Vec<String>>,
    extensions: Option<Vec<String>>,
    ignore_dirs: Option<Vec<String>>,
    trigger: String,
    debounce_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    #[serde(default)]
    keyboard: KeyboardConfig,
    #[serde(default)]
    command: Vec<CommandDescriptor>,
    #[serde(default)]
    file_watcher: Vec<RawWatcher>,
    #[serde(default)]
    variables: toml::Table,
}

/// Everything the frontend reads out of one config file.
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub path: PathBuf,
    pub commands: Vec<Arc<CommandDescriptor>>,
    pub keyboard: KeyboardConfig,
    pub watchers: Vec<WatcherConfig>,
    /// Passed through to the orchestrator for `{{ name }}` interpolation.
    pub variables: Vec<(String, String)>,
}

impl FrontendConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config: {}", path.display());
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&data, path)
    }

    /// Parses config text. Watcher directories resolve against `path`'s parent.
    pub fn parse(data: &str, path: &Path) -> Result<Self, ConfigError> {
        trace!("Parsing TOML config");
        let raw: FileConfig = toml::from_str(data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        validate_commands(&raw.command)?;

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let watchers = raw
            .file_watcher
            .into_iter()
            .map(|w| WatcherConfig {
                dir: base_dir.join(w.dir),
                patterns: w.patterns,
                extensions: w.extensions,
                ignore_dirs: w
                    .ignore_dirs
                    .unwrap_or_else(|| vec!["__pycache__".to_string(), ".git".to_string()]),
                trigger: w.trigger,
                debounce_ms: w.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS),
            })
            .collect::<Vec<_>>();

        let variables = raw
            .variables
            .into_iter()
            .map(|(name, value)| {
                let text = match value {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                (name, text)
            })
            .collect::<Vec<_>>();

        debug!(
            "Config parsed: {} commands, {} watchers, {} shortcuts",
            raw.command.len(),
            watchers.len(),
            raw.keyboard.shortcuts.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            commands: raw.command.into_iter().map(Arc::new).collect(),
            keyboard: raw.keyboard,
            watchers,
            variables,
        })
    }

    pub fn command(&self, name: &str) -> Option<&Arc<CommandDescriptor>> {
        self.commands.iter().find(|c| c.name == name)
    }
}

fn validate_commands(commands: &[CommandDescriptor]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for command in commands {
        if command.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "every [[command]] needs a non-empty name".to_string(),
            ));
        }
        if !seen.insert(command.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "command '{}' is defined more than once",
                command.name
            )));
        }
    }
    Ok(())
}

/// Writes the starter config when `path` does not exist yet. Returns whether
/// a file was created.
pub fn create_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    warn!("Created default config at {}", path.display());
    Ok(true)
}

fn default_true() -> bool {
    true
}

fn ordered_shortcuts<'de, D>(deserializer: D) -> Result<Vec<Shortcut>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ShortcutVisitor;

    impl<'de> Visitor<'de> for ShortcutVisitor {
        type Value = Vec<Shortcut>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a table of command name to key")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut shortcuts = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((command, key)) = map.next_entry::<String, String>()? {
                shortcuts.push(Shortcut { command, key });
            }
            Ok(shortcuts)
        }
    }

    deserializer.deserialize_map(ShortcutVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Result<FrontendConfig, ConfigError> {
        FrontendConfig::parse(text, Path::new("/work/config.toml"))
    }

    #[test]
    fn test_parses_default_template() {
        let cfg = parse(DEFAULT_CONFIG_TEMPLATE).unwrap();
        let names: Vec<&str> = cfg.commands.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Lint", "Format", "Tests"]);
        assert_eq!(cfg.watchers.len(), 1);
        assert_eq!(cfg.watchers[0].dir, PathBuf::from("/work/."));
        assert_eq!(cfg.watchers[0].debounce_ms, 300);
        assert_eq!(cfg.keyboard.key_for("Format"), Some("2"));
        assert_eq!(cfg.variables, vec![("base_dir".to_string(), ".".to_string())]);
    }

    #[test]
    fn test_shortcuts_keep_declaration_order() {
        let cfg = parse(
            r#"
            [[command]]
            name = "Zeta"
            command = "true"

            [[command]]
            name = "Alpha"
            command = "true"

            [keyboard]
            shortcuts = { Zeta = "1", Alpha = "1", Mid = "2" }
            "#,
        )
        .unwrap();
        let order: Vec<&str> = cfg
            .keyboard
            .shortcuts
            .iter()
            .map(|s| s.command.as_str())
            .collect();
        assert_eq!(order, vec!["Zeta", "Alpha", "Mid"]);
        assert!(cfg.keyboard.enabled);
    }

    #[test]
    fn test_watcher_defaults_apply() {
        let cfg = parse(
            r#"
            [[file_watcher]]
            dir = "src"
            trigger = "src_file_changed"
            "#,
        )
        .unwrap();
        let watcher = &cfg.watchers[0];
        assert_eq!(watcher.ignore_dirs, vec!["__pycache__", ".git"]);
        assert_eq!(watcher.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert!(watcher.patterns.is_none());
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let err = parse(
            r#"
            [[command]]
            name = "Lint"
            command = "a"

            [[command]]
            name = "Lint"
            command = "b"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_reports_unparseable_toml() {
        let err = parse("[[command]\nname = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FrontendConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_creates_default_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        assert!(create_default_config(&path).unwrap());
        assert!(!create_default_config(&path).unwrap());
        assert!(FrontendConfig::load(&path).is_ok());
    }
}
