//! Scripted model client
//!
//! Replays canned turns in order and records every request. Used by tests
//! and for offline dry runs of an agent configuration.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::model::{CompletionRequest, ModelClient, StreamPart};
use super::types::FinishReason;

/// One canned assistant turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    Parts(Vec<StreamPart>),
    /// `complete` itself fails, as when the provider is unreachable.
    Fail(String),
}

impl ScriptedTurn {
    /// Plain answer, streamed in word-sized deltas.
    pub fn text(text: &str) -> Self {
        let mut parts: Vec<StreamPart> = text
            .split_inclusive(' ')
            .map(|piece| StreamPart::TextDelta {
                delta: piece.to_string(),
            })
            .collect();
        parts.push(StreamPart::Finish {
            reason: FinishReason::Stop,
        });
        Self::Parts(parts)
    }

    /// A single tool call whose arguments arrive in two fragments.
    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        Self::tool_calls(&[(id, name, arguments)])
    }

    pub fn tool_calls(calls: &[(&str, &str, serde_json::Value)]) -> Self {
        let mut parts = Vec::new();
        for (index, (id, name, arguments)) in calls.iter().enumerate() {
            let raw = arguments.to_string();
            let split = raw.char_indices().nth(raw.chars().count() / 2).map(|(i, _)| i).unwrap_or(0);
            parts.push(StreamPart::ToolCallDelta {
                index,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: raw[..split].to_string(),
            });
            parts.push(StreamPart::ToolCallDelta {
                index,
                id: None,
                name: None,
                arguments: raw[split..].to_string(),
            });
        }
        parts.push(StreamPart::Finish {
            reason: FinishReason::ToolCalls,
        });
        Self::Parts(parts)
    }

    pub fn fail(message: &str) -> Self {
        Self::Fail(message.to_string())
    }
}

#[derive(Default)]
struct Script {
    turns: VecDeque<ScriptedTurn>,
    requests: Vec<CompletionRequest>,
}

/// Model client that answers from a fixed script.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedModel {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Script {
                turns: turns.into_iter().collect(),
                requests: Vec::new(),
            })),
        }
    }

    pub fn push(&self, turn: ScriptedTurn) {
        self.inner.lock().turns.push_back(turn);
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.lock().requests.clone()
    }

    pub fn remaining(&self) -> usize {
        self.inner.lock().turns.len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<StreamPart>> {
        let turn = {
            let mut script = self.inner.lock();
            script.requests.push(request);
            script.turns.pop_front()
        };

        let parts = match turn {
            Some(ScriptedTurn::Parts(parts)) => parts,
            Some(ScriptedTurn::Fail(message)) => anyhow::bail!(message),
            None => vec![StreamPart::Error {
                error: "scripted model has no turns left".to_string(),
            }],
        };

        let (tx, rx) = mpsc::unbounded_channel();
        for part in parts {
            let _ = tx.send(part);
        }
        Ok(rx)
    }
}
