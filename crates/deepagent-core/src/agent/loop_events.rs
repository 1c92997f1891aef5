//! Canonical event protocol for the reasoning loop.
//!
//! `LoopEvent` is the single source of truth for everything a loop emits.
//! Sub-agent events travel inside `SubagentChunk` so consumers can keep one
//! buffering context per role. The relay and the CLI map these events to
//! their own presentation.

use serde::Serialize;

use crate::ai::types::FinishReason;
use crate::state::Todo;

/// Events emitted by a reasoning loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    // ── Streaming ──────────────────────────────────────────────────────
    /// Cumulative assistant text for the current turn.
    TextDelta { text: String },

    /// Fragment of a tool call keyed by its per-turn index.
    ToolCallDelta {
        index: usize,
        name: Option<String>,
        arguments: String,
    },

    /// The model finished streaming this turn.
    StreamComplete { finish_reason: FinishReason },

    // ── Tool lifecycle ─────────────────────────────────────────────────
    /// Tool is being executed.
    ToolCallStart {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed with result.
    ToolCallEnd {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },

    // ── State ──────────────────────────────────────────────────────────
    /// TODO list was replaced.
    TodoUpdate { todos: Vec<Todo> },

    /// Workspace changed; carries every path now present.
    FileUpdate { paths: Vec<String> },

    // ── Sub-agents ─────────────────────────────────────────────────────
    SubagentStart {
        role: String,
        description: String,
        thread_id: String,
    },

    /// An event produced inside a sub-agent run.
    SubagentChunk {
        role: String,
        event: Box<LoopEvent>,
    },

    SubagentStop {
        role: String,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    // ── Turn lifecycle ─────────────────────────────────────────────────
    /// An iteration of the loop completed.
    TurnComplete { turn: usize, has_more: bool },

    /// Token usage for this turn.
    Usage {
        prompt_tokens: usize,
        completion_tokens: usize,
    },

    /// Loop finished.
    Finished { thread_id: String },

    /// Error occurred.
    Error { error: String },
}

impl LoopEvent {
    /// Progress snapshots that a later event of the same kind supersedes.
    ///
    /// These may be evicted when the event channel is full. Tool fragments,
    /// turn boundaries, sub-agent lifecycle, errors, and completion are never
    /// droppable.
    pub fn is_droppable(&self) -> bool {
        match self {
            LoopEvent::TextDelta { .. }
            | LoopEvent::TodoUpdate { .. }
            | LoopEvent::FileUpdate { .. }
            | LoopEvent::Usage { .. } => true,
            LoopEvent::SubagentChunk { event, .. } => event.is_droppable(),
            _ => false,
        }
    }

    /// Sub-agent roles wrapping this event, outermost first, and the
    /// innermost event.
    pub fn unwrap_roles(&self) -> (Vec<&str>, &LoopEvent) {
        let mut roles = Vec::new();
        let mut event = self;
        while let LoopEvent::SubagentChunk { role, event: inner } = event {
            roles.push(role.as_str());
            event = inner.as_ref();
        }
        (roles, event)
    }

    pub(crate) fn innermost_mut(&mut self) -> &mut LoopEvent {
        match self {
            LoopEvent::SubagentChunk { event, .. } => event.innermost_mut(),
            other => other,
        }
    }
}
