//! Shortcut keys: alphabet checks, collision detection and first-wins binding.

use std::collections::BTreeMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{debug, warn};

use crate::config::Shortcut;

/// key -> commands claiming it, declaration order. Only keys claimed twice or more.
pub type ConflictMap = BTreeMap<String, Vec<String>>;

/// Marks a shortcut that lost its key to an earlier declaration.
pub const SHADOW_MARKER: &str = "⚠";

pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => matches!(c, '1'..='9' | 'a'..='z'),
        (Some('f'), Some(_)) => key[1..]
            .parse::<u8>()
            .is_ok_and(|n| (1..=12).contains(&n) && !key[1..].starts_with('0')),
        _ => false,
    }
}

pub fn compute_conflicts(shortcuts: &[Shortcut]) -> ConflictMap {
    let mut by_key: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for shortcut in shortcuts {
        by_key
            .entry(shortcut.key.clone())
            .or_default()
            .push(shortcut.command.clone());
    }
    by_key.retain(|_, commands| commands.len() > 1);
    by_key
}

/// One warning per shortcut whose key is outside 1-9, a-z, f1-f12.
pub fn validate_keys(shortcuts: &[Shortcut]) -> Vec<String> {
    shortcuts
        .iter()
        .filter(|shortcut| !is_valid_key(&shortcut.key))
        .map(|shortcut| {
            format!(
                "Invalid key '{}' for command '{}'. Valid keys: 1-9, a-z, f1-f12",
                shortcut.key, shortcut.command
            )
        })
        .collect()
}

/// key -> the command that actually receives it (first declared wins).
/// Keys outside the alphabet can never be pressed, so they are left out.
pub fn keyboard_hints(shortcuts: &[Shortcut]) -> BTreeMap<String, String> {
    let mut hints = BTreeMap::new();
    for shortcut in shortcuts {
        if !is_valid_key(&shortcut.key) {
            warn!(
                "Invalid keyboard shortcut: {} for {}",
                shortcut.key, shortcut.command
            );
            continue;
        }
        hints
            .entry(shortcut.key.clone())
            .or_insert_with(|| shortcut.command.clone());
    }
    hints
}

/// The bindings the UI installs. Built from the same declaration order as
/// [`compute_conflicts`], so the binder and the help screen agree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBindings {
    bindings: BTreeMap<String, String>,
    shadowed: BTreeMap<String, Vec<String>>,
}

impl KeyBindings {
    pub fn bind_all(shortcuts: &[Shortcut], conflicts: &ConflictMap) -> Self {
        let bindings = keyboard_hints(shortcuts);
        let mut shadowed = BTreeMap::new();
        for (key, commands) in conflicts {
            let Some(winner) = bindings.get(key) else {
                continue;
            };
            warn!(
                "Keyboard conflict on [{}]: {:?}. Only {} will execute (first one wins)",
                key, commands, winner
            );
            let losers: Vec<String> = commands.iter().filter(|c| *c != winner).cloned().collect();
            shadowed.insert(key.clone(), losers);
        }
        debug!("Bound {} keys", bindings.len());
        Self { bindings, shadowed }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn command_for(&self, key: &str) -> Option<&str> {
        self.bindings.get(key).map(String::as_str)
    }

    /// The key bound to `command`, if it won one.
    pub fn key_for(&self, command: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(_, bound)| bound.as_str() == command)
            .map(|(key, _)| key.as_str())
    }

    pub fn is_shadowed(&self, command: &str) -> bool {
        self.shadowed
            .values()
            .any(|losers| losers.iter().any(|c| c == command))
    }

    pub fn shadowed(&self) -> &BTreeMap<String, Vec<String>> {
        &self.shadowed
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn help_text(&self) -> String {
        let mut text = String::from("Keyboard Shortcuts:\n");
        if self.bindings.is_empty() {
            text.push_str("  (none configured)\n");
            return text;
        }
        for (key, command) in &self.bindings {
            match self.shadowed.get(key) {
                Some(losers) => text.push_str(&format!(
                    "  [{key}] → {command} {SHADOW_MARKER} (also: {})\n",
                    losers.join(", ")
                )),
                None => text.push_str(&format!("  [{key}] → {command}\n")),
            }
        }
        text
    }
}

/// Converts a key press into the config's key token, if it can be one.
pub fn key_token(event: &KeyEvent) -> Option<String> {
    if event
        .modifiers
        .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
    {
        return None;
    }
    let token = match event.code {
        KeyCode::Char(c) => c.to_ascii_lowercase().to_string(),
        KeyCode::F(n) => format!("f{n}"),
        _ => return None,
    };
    is_valid_key(&token).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn shortcuts(pairs: &[(&str, &str)]) -> Vec<Shortcut> {
        pairs
            .iter()
            .map(|(command, key)| Shortcut {
                command: command.to_string(),
                key: key.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_accepts_only_known_alphabet() {
        for key in ["1", "9", "a", "z", "f1", "f12"] {
            assert!(is_valid_key(key), "{key} should be valid");
        }
        for key in ["0", "A", "f0", "f13", "f01", "ctrl+a", "", "10", "é"] {
            assert!(!is_valid_key(key), "{key} should be invalid");
        }
    }

    #[test]
    fn test_conflicts_keep_declaration_order() {
        let conflicts = compute_conflicts(&shortcuts(&[("A", "1"), ("B", "1"), ("C", "2")]));
        let mut expected = ConflictMap::new();
        expected.insert("1".into(), vec!["A".into(), "B".into()]);
        assert_eq!(conflicts, expected);
    }

    #[test]
    fn test_first_declared_command_wins() {
        let sc = shortcuts(&[("Lint", "1"), ("Format", "1"), ("Tests", "2")]);
        let bindings = KeyBindings::bind_all(&sc, &compute_conflicts(&sc));
        assert_eq!(bindings.command_for("1"), Some("Lint"));
        assert_eq!(bindings.command_for("2"), Some("Tests"));
        assert!(bindings.is_shadowed("Format"));
        assert!(!bindings.is_shadowed("Lint"));
        assert_eq!(bindings.key_for("Format"), None);
        assert_eq!(bindings.shadowed().get("1"), Some(&vec!["Format".to_string()]));
    }

    #[test]
    fn test_help_marks_shadowed_commands() {
        let sc = shortcuts(&[("Lint", "1"), ("Format", "1")]);
        let bindings = KeyBindings::bind_all(&sc, &compute_conflicts(&sc));
        assert_eq!(
            bindings.help_text(),
            "Keyboard Shortcuts:\n  [1] → Lint ⚠ (also: Format)\n"
        );
        assert_eq!(
            KeyBindings::disabled().help_text(),
            "Keyboard Shortcuts:\n  (none configured)\n"
        );
    }

    #[test]
    fn test_warns_for_invalid_keys() {
        let warnings = validate_keys(&shortcuts(&[("Lint", "ctrl+l"), ("Tests", "t")]));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("ctrl+l"));
    }

    #[test]
    fn test_invalid_keys_are_not_bound() {
        let sc = shortcuts(&[("Lint", "ctrl+l"), ("Tests", "t")]);
        let bindings = KeyBindings::bind_all(&sc, &compute_conflicts(&sc));
        assert_eq!(bindings.command_for("ctrl+l"), None);
        assert_eq!(bindings.key_for("Lint"), None);
        assert_eq!(
            bindings.help_text(),
            "Keyboard Shortcuts:\n  [t] → Tests\n"
        );
    }

    #[test]
    fn test_key_events_become_tokens() {
        let plain = KeyEvent::new(KeyCode::Char('L'), KeyModifiers::SHIFT);
        assert_eq!(key_token(&plain).as_deref(), Some("l"));
        let fkey = KeyEvent::new(KeyCode::F(5), KeyModifiers::NONE);
        assert_eq!(key_token(&fkey).as_deref(), Some("f5"));
        let ctrl = KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert_eq!(key_token(&ctrl), None);
        let zero = KeyEvent::new(KeyCode::Char('0'), KeyModifiers::NONE);
        assert_eq!(key_token(&zero), None);
    }
}
