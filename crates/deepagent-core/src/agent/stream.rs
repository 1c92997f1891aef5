//! Stream processing for the reasoning loop.
//!
//! Consumes `StreamPart`s from `ModelClient::complete()` and:
//! - Accumulates text and emits it as cumulative `TextDelta`s
//! - Assembles tool-call fragments by their per-turn index
//! - Handles stream timeout (no data for `timeout`)

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::ai::model::StreamPart;
use crate::ai::types::{AiToolCall, FinishReason, Usage};

use super::event_bus::EventSender;
use super::loop_events::LoopEvent;

pub(crate) const STREAM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Result of processing a complete model stream.
#[derive(Debug, Default)]
pub(crate) struct StreamResult {
    pub text: String,
    pub tool_calls: Vec<AiToolCall>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
    /// Set when the provider failed mid-stream or went silent.
    pub error: Option<String>,
}

/// Process a model stream, emitting `LoopEvent`s as parts arrive.
///
/// Returns the accumulated result once the stream closes or times out.
pub(crate) async fn process_stream(
    mut api_rx: mpsc::UnboundedReceiver<StreamPart>,
    events: &EventSender,
    timeout: Duration,
) -> StreamResult {
    let mut result = StreamResult::default();
    let mut partial: BTreeMap<usize, PartialCall> = BTreeMap::new();

    loop {
        let part = match tokio::time::timeout(timeout, api_rx.recv()).await {
            Ok(Some(part)) => part,
            Ok(None) => break,
            Err(_) => {
                result.error = Some(format!(
                    "model stream timeout: no data received for {} seconds",
                    timeout.as_secs()
                ));
                break;
            }
        };

        match part {
            StreamPart::TextDelta { delta } => {
                if delta.is_empty() {
                    continue;
                }
                result.text.push_str(&delta);
                events.send(LoopEvent::TextDelta {
                    text: result.text.clone(),
                });
            }
            StreamPart::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let call = partial.entry(index).or_default();
                if call.id.is_none() {
                    call.id = id.filter(|s| !s.is_empty());
                }
                if call.name.is_none() {
                    call.name = name.clone().filter(|s| !s.is_empty());
                }
                call.arguments.push_str(&arguments);
                events.send(LoopEvent::ToolCallDelta {
                    index,
                    name,
                    arguments,
                });
            }
            StreamPart::Finish { reason } => {
                events.send(LoopEvent::StreamComplete {
                    finish_reason: reason.clone(),
                });
                result.finish_reason = Some(reason);
            }
            StreamPart::Usage { usage } => {
                events.send(LoopEvent::Usage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                });
                result.usage = Some(usage);
            }
            StreamPart::Error { error } => {
                result.error = Some(error);
                break;
            }
        }
    }

    result.tool_calls = partial
        .into_values()
        .filter_map(|call| {
            let name = call.name?;
            Some(AiToolCall {
                id: call
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
                name,
                arguments: parse_arguments(&call.arguments),
            })
        })
        .collect();

    result
}

/// Arguments as JSON; malformed input is kept as the raw string so the tool
/// can report it.
fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(serde_json::Map::new());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
