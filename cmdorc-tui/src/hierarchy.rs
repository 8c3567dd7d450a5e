//! Derives the command forest from `command_*:<parent>` trigger declarations.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use log::{debug, warn};
use regex::Regex;

use crate::config::CommandDescriptor;
use crate::orchestrator::LifecycleEvent;

static LIFECYCLE_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(command_success|command_failed|command_cancelled):(.+)$")
        .expect("lifecycle trigger pattern is a valid literal")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub descriptor: Arc<CommandDescriptor>,
    pub children: Vec<CommandNode>,
}

impl CommandNode {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn triggers(&self) -> &[String] {
        &self.descriptor.triggers
    }

    /// Depth-first walk, parents before children.
    pub fn walk<'a>(&'a self, depth: usize, visit: &mut impl FnMut(&'a CommandNode, usize)) {
        visit(self, depth);
        for child in &self.children {
            child.walk(depth + 1, visit);
        }
    }
}

/// Splits `command_success:Lint` into its event and parent. Anything else is
/// a manual or file trigger and produces no edge.
pub fn parse_lifecycle_trigger(expr: &str) -> Option<(LifecycleEvent, &str)> {
    let caps = LIFECYCLE_TRIGGER.captures(expr)?;
    let event = match caps.get(1)?.as_str() {
        "command_success" => LifecycleEvent::Success,
        "command_failed" => LifecycleEvent::Failed,
        _ => LifecycleEvent::Cancelled,
    };
    Some((event, caps.get(2)?.as_str()))
}

/// Builds the forest. Roots keep input order; a command triggered by several
/// parents shows up under each of them. A command is never placed below
/// itself: the branch that would close a cycle is dropped and logged.
pub fn build_hierarchy(commands: &[Arc<CommandDescriptor>]) -> Vec<CommandNode> {
    let index: HashMap<&str, usize> = commands
        .iter()
        .enumerate()
        .map(|(idx, cmd)| (cmd.name.as_str(), idx))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); commands.len()];
    let mut has_parent = vec![false; commands.len()];
    for (child_idx, cmd) in commands.iter().enumerate() {
        for trigger in &cmd.triggers {
            let Some((_, parent)) = parse_lifecycle_trigger(trigger) else {
                continue;
            };
            let Some(&parent_idx) = index.get(parent) else {
                debug!("'{}' waits on unknown command '{}'", cmd.name, parent);
                continue;
            };
            if !children[parent_idx].contains(&child_idx) {
                children[parent_idx].push(child_idx);
            }
            has_parent[child_idx] = true;
        }
    }

    let mut on_path = vec![false; commands.len()];
    let roots: Vec<CommandNode> = (0..commands.len())
        .filter(|idx| !has_parent[*idx])
        .filter_map(|idx| expand(idx, commands, &children, &mut on_path))
        .collect();

    debug!(
        "Hierarchy built: {} roots from {} commands",
        roots.len(),
        commands.len()
    );
    roots
}

fn expand(
    idx: usize,
    commands: &[Arc<CommandDescriptor>],
    children: &[Vec<usize>],
    on_path: &mut [bool],
) -> Option<CommandNode> {
    if on_path[idx] {
        warn!(
            "Trigger cycle detected at '{}', dropping that branch",
            commands[idx].name
        );
        return None;
    }

    on_path[idx] = true;
    let node_children = children[idx]
        .iter()
        .filter_map(|&child| expand(child, commands, children, on_path))
        .collect();
    on_path[idx] = false;

    Some(CommandNode {
        descriptor: Arc::clone(&commands[idx]),
        children: node_children,
    })
}

/// How many times each command appears across the forest.
pub fn occurrences(forest: &[CommandNode]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for root in forest {
        root.walk(0, &mut |node, _| {
            *counts.entry(node.name().to_string()).or_insert(0) += 1;
        });
    }
    counts
}

/// Commands whose triggers fire when `name` reaches `event`, in config order.
pub fn downstream<'a>(
    commands: &'a [Arc<CommandDescriptor>],
    name: &str,
    event: LifecycleEvent,
) -> Vec<&'a str> {
    commands
        .iter()
        .filter(|cmd| {
            cmd.triggers.iter().any(|trigger| {
                parse_lifecycle_trigger(trigger)
                    .is_some_and(|(ev, parent)| ev == event && parent == name)
            })
        })
        .map(|cmd| cmd.name.as_str())
        .collect()
}
