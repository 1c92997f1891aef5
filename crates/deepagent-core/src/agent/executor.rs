//! Tool execution for the reasoning loop.
//!
//! Runs a turn's tool calls one after another against the thread's state:
//! each call sees the files and TODOs left by the previous one, its
//! `StatePatch` is merged as soon as it returns, and file/TODO changes are
//! published as events.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ai::types::{AiToolCall, Content};
use crate::state::ConversationState;
use crate::tools::registry::{ToolContext, ToolRegistry, ToolResult};
use crate::workspace::PermissionScope;

use super::event_bus::EventSender;
use super::loop_events::LoopEvent;

pub const DEFAULT_MAX_TOOL_OUTPUT_CHARS: usize = 30_000;

/// Who is running the tools, and with what limits.
pub(crate) struct ExecutionScope<'a> {
    pub agent: &'a str,
    pub thread_id: &'a str,
    pub permissions: Option<&'a PermissionScope>,
    pub events: &'a EventSender,
    pub cancel: &'a CancellationToken,
    pub max_output_chars: usize,
}

/// Execute a batch of tool calls, merging each result into `state`.
///
/// Returns one `ToolResult` content block per call, in call order.
pub(crate) async fn execute_tools(
    tool_calls: &[AiToolCall],
    tools: &ToolRegistry,
    state: &mut ConversationState,
    scope: &ExecutionScope<'_>,
) -> Vec<Content> {
    let mut results = Vec::with_capacity(tool_calls.len());

    for call in tool_calls {
        scope.events.send(LoopEvent::ToolCallStart {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });

        let ctx = ToolContext {
            agent: scope.agent.to_string(),
            thread_id: scope.thread_id.to_string(),
            tool_call_id: Some(call.id.clone()),
            files: state.files.clone(),
            todos: state.todos.clone(),
            scope: scope.permissions.cloned(),
            events: Some(scope.events.clone()),
            cancel: scope.cancel.clone(),
            timeout: None,
        };

        let result = tools
            .execute(&call.name, call.arguments.clone(), &ctx)
            .await
            .unwrap_or_else(|| {
                tracing::warn!(agent = scope.agent, tool = %call.name, "Model called unknown tool");
                ToolResult::error_with_code(
                    "unknown_tool",
                    format!("Unknown tool: {}", call.name),
                )
            });
        drop(ctx);

        let ToolResult {
            output,
            is_error,
            patch,
        } = result;

        let summary = state.apply(patch);
        if !summary.files_touched.is_empty() {
            tracing::debug!(
                agent = scope.agent,
                tool = %call.name,
                files = ?summary.files_touched,
                "Workspace updated"
            );
            scope.events.send(LoopEvent::FileUpdate {
                paths: state.files.paths(),
            });
        }
        if summary.todos_replaced {
            scope.events.send(LoopEvent::TodoUpdate {
                todos: state.todos.clone(),
            });
        }

        let output = truncate_output(&output, scope.max_output_chars);
        scope.events.send(LoopEvent::ToolCallEnd {
            id: call.id.clone(),
            name: call.name.clone(),
            output: output.clone(),
            is_error,
        });

        results.push(Content::ToolResult {
            tool_use_id: call.id.clone(),
            output: Value::String(output),
            is_error: is_error.then_some(true),
        });
    }

    results
}

/// Room left for the marker added to a shortened JSON string value.
const VALUE_MARKER_CHARS: usize = 48;

/// Cap `output` at `max_chars` characters.
///
/// JSON objects stay valid JSON: their longest string values are shortened
/// instead of cutting the text. Anything else is cut at the last line break.
pub(crate) fn truncate_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(output) {
        if let Some(shrunk) = shrink_json(value, max_chars) {
            return shrunk;
        }
    }

    let truncated = &output[..char_byte_index(output, max_chars)];
    let clean = match truncated.rfind('\n') {
        Some(break_point) => &truncated[..break_point],
        None => truncated,
    };
    format!(
        "{}\n\n[... OUTPUT TRUNCATED: {} chars -> {} chars ...]",
        clean,
        total,
        clean.chars().count()
    )
}

fn shrink_json(mut value: Value, max_chars: usize) -> Option<String> {
    // Escapes make rendered length differ from value length; a few passes settle it.
    for _ in 0..8 {
        let rendered = value.to_string();
        let total = rendered.chars().count();
        if total <= max_chars {
            return Some(rendered);
        }

        let mut leaves = Vec::new();
        collect_string_leaves(&value, String::new(), &mut leaves);
        let (pointer, len) = leaves.into_iter().max_by_key(|(_, len)| *len)?;
        let excess = total - max_chars + VALUE_MARKER_CHARS;
        if len <= excess {
            return None;
        }

        if let Some(Value::String(text)) = value.pointer_mut(&pointer) {
            let keep = len - excess;
            text.truncate(char_byte_index(text, keep));
            text.push_str(&format!("[... {} chars truncated ...]", len - keep));
        }
    }
    None
}

/// JSON pointers and char lengths of every string value.
fn collect_string_leaves(value: &Value, pointer: String, out: &mut Vec<(String, usize)>) {
    match value {
        Value::String(text) => out.push((pointer, text.chars().count())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_string_leaves(item, format!("{}/{}", pointer, i), out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let key = key.replace('~', "~0").replace('/', "~1");
                collect_string_leaves(item, format!("{}/{}", pointer, key), out);
            }
        }
        _ => {}
    }
}

fn char_byte_index(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(index, _)| index)
}
