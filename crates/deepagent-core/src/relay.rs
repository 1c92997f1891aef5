//! Stream relay - turns raw loop events into display output.
//!
//! One `RelayContext` is kept per role (the main agent included), so text and
//! tool-call fragments from interleaved sub-agents never mix:
//!
//! - Text arrives as cumulative per-turn strings; only the suffix past the
//!   longest common prefix with the previous string is emitted.
//! - Tool-call fragments are assembled by index and announced once per
//!   `name + arguments` signature when the turn completes. Hidden tools are
//!   never announced.
//! - File updates are diffed against the last path set seen for the role.
//!   TODO updates are shown whole.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::agent::loop_events::LoopEvent;
use crate::agent::MAIN_AGENT;
use crate::state::Todo;
use crate::tools::implementations::{
    LIST_FILES, READ_FILE, READ_FILE_WITH_HISTORY, WRITE_TODOS,
};

fn default_hidden_tools() -> BTreeSet<String> {
    [READ_FILE, READ_FILE_WITH_HISTORY, LIST_FILES, WRITE_TODOS]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_true() -> bool {
    true
}

/// What the relay shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Tools whose calls are never announced, whatever the role.
    #[serde(default = "default_hidden_tools")]
    pub hidden_tools: BTreeSet<String>,
    #[serde(default = "default_true")]
    pub show_todos: bool,
    #[serde(default = "default_true")]
    pub show_files: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            hidden_tools: default_hidden_tools(),
            show_todos: true,
            show_files: true,
        }
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    name: Option<String>,
    args: String,
}

/// Buffering state of one role.
#[derive(Debug, Default)]
pub struct RelayContext {
    pending_text: String,
    partial_tool_calls: BTreeMap<usize, PartialCall>,
    already_announced: HashSet<String>,
    last_seen_file_paths: Option<BTreeSet<String>>,
}

impl RelayContext {
    /// Display delta for the new cumulative `text`.
    pub fn push_text(&mut self, text: &str) -> String {
        let common = common_prefix_len(&self.pending_text, text);
        let delta = text[common..].to_string();
        self.pending_text = text.to_string();
        delta
    }

    pub fn push_tool_fragment(&mut self, index: usize, name: Option<&str>, args: &str) {
        let call = self.partial_tool_calls.entry(index).or_default();
        if call.name.is_none() {
            call.name = name.filter(|n| !n.is_empty()).map(str::to_string);
        }
        call.args.push_str(args);
    }

    /// Complete, visible, not yet announced calls as `(name, arguments)`.
    ///
    /// Clears the fragment buffer and the pending text.
    pub fn complete_turn(&mut self, hidden: &BTreeSet<String>) -> Vec<(String, String)> {
        self.pending_text.clear();
        let mut announced = Vec::new();
        for call in std::mem::take(&mut self.partial_tool_calls).into_values() {
            let Some(name) = call.name else {
                continue;
            };
            if call.args.is_empty() || hidden.contains(&name) {
                continue;
            }
            let signature = format!("{}|{}", name, call.args);
            if self.already_announced.insert(signature) {
                announced.push((name, call.args));
            }
        }
        announced
    }

    /// Paths in `paths` not present at the previous update.
    pub fn diff_files(&mut self, paths: &[String]) -> Vec<String> {
        let current: BTreeSet<String> = paths.iter().cloned().collect();
        let added = match &self.last_seen_file_paths {
            Some(previous) => current.difference(previous).cloned().collect(),
            None => current.iter().cloned().collect(),
        };
        self.last_seen_file_paths = Some(current);
        added
    }

    fn reset_turn(&mut self) {
        self.pending_text.clear();
        self.partial_tool_calls.clear();
    }
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map(|((i, c), _)| i + c.len_utf8())
        .unwrap_or(0)
}

/// One displayable item.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutput {
    Text {
        role: String,
        delta: String,
    },
    ToolCall {
        role: String,
        name: String,
        arguments: String,
    },
    ToolFailed {
        role: String,
        name: String,
        output: String,
    },
    Todos {
        role: String,
        todos: Vec<Todo>,
    },
    FilesAdded {
        role: String,
        added: Vec<String>,
        all: Vec<String>,
    },
    SubagentStarted {
        role: String,
        description: String,
    },
    SubagentFinished {
        role: String,
        success: bool,
        error: Option<String>,
    },
    Error {
        role: String,
        error: String,
    },
    Finished,
}

impl RelayOutput {
    pub fn role(&self) -> Option<&str> {
        match self {
            RelayOutput::Text { role, .. }
            | RelayOutput::ToolCall { role, .. }
            | RelayOutput::ToolFailed { role, .. }
            | RelayOutput::Todos { role, .. }
            | RelayOutput::FilesAdded { role, .. }
            | RelayOutput::SubagentStarted { role, .. }
            | RelayOutput::SubagentFinished { role, .. }
            | RelayOutput::Error { role, .. } => Some(role),
            RelayOutput::Finished => None,
        }
    }

    /// Plain-text rendering. Text deltas are returned as-is so they can be
    /// printed without a trailing newline.
    pub fn render(&self) -> String {
        match self {
            RelayOutput::Text { delta, .. } => delta.clone(),
            RelayOutput::ToolCall {
                role,
                name,
                arguments,
            } => format!("[{}] → {} {}", role, name, arguments),
            RelayOutput::ToolFailed { role, name, output } => {
                format!("[{}] ✗ {} failed: {}", role, name, output)
            }
            RelayOutput::Todos { role, todos } => {
                let mut out = format!("[{}] TODO list:", role);
                for todo in todos {
                    let mark = match todo.status {
                        crate::state::TodoStatus::Completed => "[x]",
                        crate::state::TodoStatus::InProgress => "[~]",
                        crate::state::TodoStatus::Pending => "[ ]",
                    };
                    out.push_str(&format!("\n  {} {}", mark, todo.content));
                }
                out
            }
            RelayOutput::FilesAdded { role, added, all } => format!(
                "[{}] new files: {}\n  workspace: {}",
                role,
                added.join(", "),
                all.join(", ")
            ),
            RelayOutput::SubagentStarted { role, description } => {
                format!("── {} started: {}", role, description)
            }
            RelayOutput::SubagentFinished {
                role,
                success: true,
                ..
            } => format!("── {} finished", role),
            RelayOutput::SubagentFinished { role, error, .. } => format!(
                "── {} failed: {}",
                role,
                error.as_deref().unwrap_or("unknown error")
            ),
            RelayOutput::Error { role, error } => format!("[{}] error: {}", role, error),
            RelayOutput::Finished => String::new(),
        }
    }
}

/// Single-consumer event relay.
#[derive(Debug, Default)]
pub struct StreamRelay {
    config: RelayConfig,
    contexts: HashMap<String, RelayContext>,
}

impl StreamRelay {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config,
            contexts: HashMap::new(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Context of `role`, created on first use.
    pub fn context(&mut self, role: &str) -> &mut RelayContext {
        self.contexts.entry(role.to_string()).or_default()
    }

    /// Map one event from the main loop's channel to display output.
    pub fn handle(&mut self, event: LoopEvent) -> Vec<RelayOutput> {
        let mut out = Vec::new();
        self.handle_in(MAIN_AGENT, event, &mut out);
        out
    }

    fn handle_in(&mut self, role: &str, event: LoopEvent, out: &mut Vec<RelayOutput>) {
        match event {
            LoopEvent::SubagentChunk { role: inner, event } => {
                self.handle_in(&inner, *event, out);
            }
            LoopEvent::TextDelta { text } => {
                let delta = self.context(role).push_text(&text);
                if !delta.is_empty() {
                    out.push(RelayOutput::Text {
                        role: role.to_string(),
                        delta,
                    });
                }
            }
            LoopEvent::ToolCallDelta {
                index,
                name,
                arguments,
            } => {
                self.context(role)
                    .push_tool_fragment(index, name.as_deref(), &arguments);
            }
            LoopEvent::StreamComplete { .. } | LoopEvent::TurnComplete { .. } => {
                let hidden = self.config.hidden_tools.clone();
                for (name, arguments) in self.context(role).complete_turn(&hidden) {
                    out.push(RelayOutput::ToolCall {
                        role: role.to_string(),
                        name,
                        arguments,
                    });
                }
            }
            LoopEvent::ToolCallEnd {
                name,
                output,
                is_error: true,
                ..
            } if !self.config.hidden_tools.contains(&name) => {
                out.push(RelayOutput::ToolFailed {
                    role: role.to_string(),
                    name,
                    output,
                });
            }
            LoopEvent::TodoUpdate { todos } => {
                if self.config.show_todos {
                    out.push(RelayOutput::Todos {
                        role: role.to_string(),
                        todos,
                    });
                }
            }
            LoopEvent::FileUpdate { paths } => {
                let added = self.context(role).diff_files(&paths);
                if self.config.show_files && !added.is_empty() {
                    out.push(RelayOutput::FilesAdded {
                        role: role.to_string(),
                        added,
                        all: paths,
                    });
                }
            }
            LoopEvent::SubagentStart {
                role: sub_role,
                description,
                ..
            } => {
                self.context(&sub_role).reset_turn();
                out.push(RelayOutput::SubagentStarted {
                    role: sub_role,
                    description,
                });
            }
            LoopEvent::SubagentStop {
                role: sub_role,
                success,
                error,
            } => {
                out.push(RelayOutput::SubagentFinished {
                    role: sub_role,
                    success,
                    error,
                });
            }
            LoopEvent::Error { error } => {
                out.push(RelayOutput::Error {
                    role: role.to_string(),
                    error,
                });
            }
            LoopEvent::Finished { .. } => out.push(RelayOutput::Finished),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::FinishReason;
    use crate::state::TodoStatus;

    fn text(t: &str) -> LoopEvent {
        LoopEvent::TextDelta { text: t.into() }
    }

    fn fragment(index: usize, name: Option<&str>, args: &str) -> LoopEvent {
        LoopEvent::ToolCallDelta {
            index,
            name: name.map(String::from),
            arguments: args.into(),
        }
    }

    fn complete() -> LoopEvent {
        LoopEvent::StreamComplete {
            finish_reason: FinishReason::ToolCalls,
        }
    }

    fn deltas(outputs: Vec<RelayOutput>) -> String {
        outputs
            .into_iter()
            .map(|o| match o {
                RelayOutput::Text { delta, .. } => delta,
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_cumulative_text_deltas_concatenate() {
        let mut relay = StreamRelay::default();
        let mut printed = String::new();
        for cumulative in ["Hello", "Hello wor", "Hello world"] {
            printed.push_str(&deltas(relay.handle(text(cumulative))));
        }
        assert_eq!(printed, "Hello world");
    }

    #[test]
    fn test_retransmitted_prefix_prints_nothing() {
        let mut relay = StreamRelay::default();
        relay.handle(text("Hello"));
        assert!(relay.handle(text("Hello")).is_empty());
    }

    #[test]
    fn test_text_resets_after_turn() {
        let mut relay = StreamRelay::default();
        relay.handle(text("First answer"));
        relay.handle(complete());
        assert_eq!(deltas(relay.handle(text("First"))), "First");
    }

    #[test]
    fn test_tool_call_assembled_and_announced_once() {
        let mut relay = StreamRelay::default();
        relay.handle(fragment(0, Some("write_file"), "{\"file_path\":"));
        relay.handle(fragment(0, None, "\"a.md\"}"));
        let out = relay.handle(complete());
        assert_eq!(
            out,
            vec![RelayOutput::ToolCall {
                role: "main".into(),
                name: "write_file".into(),
                arguments: "{\"file_path\":\"a.md\"}".into(),
            }]
        );

        // Same call re-sent and completed again is not shown twice.
        relay.handle(fragment(0, Some("write_file"), "{\"file_path\":\"a.md\"}"));
        assert!(relay.handle(complete()).is_empty());
        assert!(relay.handle(complete()).is_empty());
    }

    #[test]
    fn test_hidden_and_incomplete_calls_are_silent() {
        let mut relay = StreamRelay::default();
        relay.handle(fragment(0, Some("read_file"), "{\"file_path\":\"a\"}"));
        relay.handle(fragment(1, Some("task"), ""));
        relay.handle(fragment(2, None, "{}"));
        assert!(relay.handle(complete()).is_empty());
    }

    #[test]
    fn test_subagent_contexts_are_independent() {
        let mut relay = StreamRelay::default();
        let wrap = |role: &str, event| LoopEvent::SubagentChunk {
            role: role.into(),
            event: Box::new(event),
        };
        relay.handle(text("Main says"));
        let out = relay.handle(wrap("system_agent", text("Sub")));
        assert_eq!(
            out,
            vec![RelayOutput::Text {
                role: "system_agent".into(),
                delta: "Sub".into()
            }]
        );
        assert_eq!(deltas(relay.handle(text("Main says more"))), " more");
    }

    #[test]
    fn test_file_updates_report_new_paths() {
        let mut relay = StreamRelay::default();
        let update = |paths: &[&str]| LoopEvent::FileUpdate {
            paths: paths.iter().map(|p| p.to_string()).collect(),
        };

        let first = relay.handle(update(&["a.md"]));
        assert!(matches!(&first[0], RelayOutput::FilesAdded { added, .. } if added == &vec!["a.md".to_string()]));

        let second = relay.handle(update(&["a.md", "b.md"]));
        assert!(matches!(&second[0], RelayOutput::FilesAdded { added, all, .. }
            if added == &vec!["b.md".to_string()] && all.len() == 2));

        assert!(relay.handle(update(&["a.md", "b.md"])).is_empty());
    }

    #[test]
    fn test_todos_shown_whole_unless_disabled() {
        let todos = vec![Todo::new("draft", TodoStatus::InProgress)];
        let mut relay = StreamRelay::default();
        let out = relay.handle(LoopEvent::TodoUpdate {
            todos: todos.clone(),
        });
        assert!(out[0].render().contains("[~] draft"));

        let mut quiet = StreamRelay::new(RelayConfig {
            show_todos: false,
            ..Default::default()
        });
        assert!(quiet.handle(LoopEvent::TodoUpdate { todos }).is_empty());
    }

    #[test]
    fn test_relay_config_from_toml() {
        let config: RelayConfig = toml::from_str("show_files = false").unwrap();
        assert!(!config.show_files);
        assert!(config.show_todos);
        assert!(config.hidden_tools.contains("list_files"));
    }

    #[test]
    fn test_common_prefix_multibyte() {
        assert_eq!(common_prefix_len("héllo", "hélp"), "hél".len());
        assert_eq!(common_prefix_len("", "abc"), 0);
    }
}
