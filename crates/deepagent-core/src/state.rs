//! Conversation state and the patches tools return
//!
//! Tools never mutate state in place. They read a snapshot and hand back a
//! `StatePatch`; the loop merges patches by key.

use serde::{Deserialize, Serialize};

use crate::ai::types::{ModelMessage, Role};
use crate::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

impl std::fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TodoStatus::Pending => write!(f, "pending"),
            TodoStatus::InProgress => write!(f, "in_progress"),
            TodoStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub content: String,
    pub status: TodoStatus,
}

impl Todo {
    pub fn new(content: impl Into<String>, status: TodoStatus) -> Self {
        Self {
            content: content.into(),
            status,
        }
    }
}

/// Messages, TODO list, and workspace of one thread.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    #[serde(default)]
    pub messages: Vec<ModelMessage>,
    #[serde(default)]
    pub todos: Vec<Todo>,
    #[serde(default)]
    pub files: Workspace,
}

/// Partial update; absent fields leave state untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    /// Appended in order.
    pub messages: Vec<ModelMessage>,
    /// Replaces the whole list.
    pub todos: Option<Vec<Todo>>,
    /// Merged per path, last writer wins.
    pub files: Option<Workspace>,
}

impl StatePatch {
    pub fn files(files: Workspace) -> Self {
        Self {
            files: Some(files),
            ..Default::default()
        }
    }

    pub fn todos(todos: Vec<Todo>) -> Self {
        Self {
            todos: Some(todos),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: ModelMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.todos.is_none() && self.files.is_none()
    }
}

/// What a merged patch changed, for event emission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub files_touched: Vec<String>,
    pub todos_replaced: bool,
}

impl ConversationState {
    /// Fresh state seeded with one user message.
    pub fn seeded(input: impl Into<String>) -> Self {
        Self {
            messages: vec![ModelMessage::user(input)],
            ..Default::default()
        }
    }

    pub fn apply(&mut self, patch: StatePatch) -> PatchSummary {
        let mut summary = PatchSummary::default();
        self.messages.extend(patch.messages);
        if let Some(todos) = patch.todos {
            self.todos = todos;
            summary.todos_replaced = true;
        }
        if let Some(files) = patch.files {
            summary.files_touched = self.files.merge(files);
        }
        summary
    }

    /// Text of the most recent assistant message, if any.
    pub fn last_assistant_text(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .map(ModelMessage::text)
            .find(|t| !t.is_empty())
    }

    /// Output of the most recent tool-result message, if any.
    pub fn last_tool_output(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool)
            .map(ModelMessage::text)
    }
}
