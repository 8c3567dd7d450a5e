//! Trigger provenance: why a command run was started.

pub const DEFAULT_SEPARATOR: &str = " → ";
pub const ELLIPSIS: &str = "...";

/// Below this width there is no room to truncate usefully.
const MIN_TRUNCATE_WIDTH: usize = 10;
/// Room taken by the ellipsis and its separator.
const ELLIPSIS_RESERVE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerKind {
    Manual,
    File,
    Lifecycle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSource {
    /// Oldest first. Empty means the run was started by hand.
    pub chain: Vec<String>,
    pub kind: TriggerKind,
}

impl TriggerSource {
    pub fn classify(chain: Vec<String>) -> Self {
        let kind = match chain.last() {
            None => TriggerKind::Manual,
            Some(last) if last.starts_with("command_") => TriggerKind::Lifecycle,
            Some(last) if last.to_lowercase().contains("file") => TriggerKind::File,
            Some(_) => TriggerKind::Manual,
        };
        Self { chain, kind }
    }

    pub fn manual() -> Self {
        Self::classify(Vec::new())
    }

    /// The last trigger in the chain, or `"manual"`.
    pub fn display_name(&self) -> &str {
        self.chain.last().map(String::as_str).unwrap_or("manual")
    }

    pub fn semantic_summary(&self) -> &'static str {
        if self.chain.is_empty() {
            return "Ran manually";
        }
        match self.kind {
            TriggerKind::Manual => "Ran manually",
            TriggerKind::File => "Ran automatically (file change)",
            TriggerKind::Lifecycle => "Ran automatically (triggered by another command)",
        }
    }

    /// Joins the chain; when it is wider than `max_width`, the oldest part is
    /// cut and replaced with an ellipsis so the newest trigger stays visible.
    /// An empty chain reads as [`display_name`](Self::display_name).
    pub fn format_chain(&self, separator: &str, max_width: Option<usize>) -> String {
        if self.chain.is_empty() {
            return self.display_name().to_string();
        }
        let full = self.chain.join(separator);
        let Some(max_width) = max_width else {
            return full;
        };
        if max_width < MIN_TRUNCATE_WIDTH {
            return full;
        }

        let width = full.chars().count();
        if width <= max_width {
            return full;
        }

        let keep = max_width - ELLIPSIS_RESERVE;
        let tail: String = full.chars().skip(width - keep).collect();
        format!("{ELLIPSIS}{separator}{tail}")
    }

    pub fn format_default(&self) -> String {
        self.format_chain(DEFAULT_SEPARATOR, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_chain_is_manual() {
        let source = TriggerSource::classify(vec![]);
        assert_eq!(source.kind, TriggerKind::Manual);
        assert_eq!(source.display_name(), "manual");
        assert_eq!(source.semantic_summary(), "Ran manually");
        assert_eq!(source.format_default(), "manual");
        assert_eq!(source.format_chain(" > ", Some(40)), "manual");
    }

    #[test]
    fn test_last_lifecycle_element_wins() {
        let source = TriggerSource::classify(chain(&["py_file_changed", "command_success:Lint"]));
        assert_eq!(source.kind, TriggerKind::Lifecycle);
        assert_eq!(
            source.semantic_summary(),
            "Ran automatically (triggered by another command)"
        );
    }

    #[test]
    fn test_file_detection_ignores_case() {
        let source = TriggerSource::classify(chain(&["Source_FILE_saved"]));
        assert_eq!(source.kind, TriggerKind::File);
        assert_eq!(source.semantic_summary(), "Ran automatically (file change)");
    }

    #[test]
    fn test_unknown_trigger_reads_as_manual() {
        let source = TriggerSource::classify(chain(&["deploy_requested"]));
        assert_eq!(source.kind, TriggerKind::Manual);
        assert_eq!(source.semantic_summary(), "Ran manually");
    }

    #[test]
    fn test_short_chain_is_not_truncated() {
        let source = TriggerSource::classify(chain(&["a_file", "command_success:Lint"]));
        let joined = "a_file → command_success:Lint";
        assert_eq!(source.format_chain(DEFAULT_SEPARATOR, Some(80)), joined);
        assert_eq!(source.format_default(), joined);
    }

    #[test]
    fn test_long_chain_keeps_newest_suffix() {
        let source = TriggerSource::classify(chain(&[
            "py_file_changed",
            "command_success:Lint",
            "command_success:Format",
            "command_success:Tests",
        ]));
        let full = source.format_chain(DEFAULT_SEPARATOR, None);
        let max_width = 30;
        let formatted = source.format_chain(DEFAULT_SEPARATOR, Some(max_width));

        assert!(formatted.starts_with(ELLIPSIS));
        let expected_tail: String = full
            .chars()
            .skip(full.chars().count() - (max_width - 4))
            .collect();
        assert!(formatted.ends_with(&expected_tail));
        assert!(formatted.ends_with("command_success:Tests"));
    }

    #[test]
    fn test_narrow_width_skips_truncation() {
        let source = TriggerSource::classify(chain(&["py_file_changed", "command_success:Lint"]));
        assert_eq!(
            source.format_chain(" > ", Some(5)),
            "py_file_changed > command_success:Lint"
        );
    }
}
