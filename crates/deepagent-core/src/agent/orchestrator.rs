//! Reasoning loop - one agent's model/tool cycle.
//!
//! `AgentLoop` is shared by the main agent and every sub-agent role. Each
//! iteration streams one model turn, executes the requested tools against
//! the thread's `ConversationState`, and checkpoints the state under the
//! thread id.
//!
//! ```text
//!  ┌───────────┐  CompletionRequest  ┌─────────────┐
//!  │ AgentLoop │ ──────────────────► │ ModelClient │
//!  │           │ ◄────────────────── │             │
//!  └───────────┘     StreamPart      └─────────────┘
//!        │ LoopEvent
//!        ▼
//!   EventSender (tagged per role for sub-agents)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ai::model::{CompletionRequest, ModelClient, ModelConfig};
use crate::ai::types::{AiToolCall, Content, ModelMessage, Role};
use crate::error::AgentError;
use crate::state::ConversationState;
use crate::tools::registry::ToolRegistry;
use crate::workspace::PermissionScope;

use super::checkpoint::CheckpointStore;
use super::event_bus::EventSender;
use super::executor::{self, ExecutionScope, DEFAULT_MAX_TOOL_OUTPUT_CHARS};
use super::failure;
use super::loop_events::LoopEvent;
use super::stream::{self, STREAM_TIMEOUT};

pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Bounds on a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopLimits {
    pub max_iterations: usize,
    pub max_tool_output_chars: usize,
    /// Longest silence tolerated from the model stream.
    pub stream_timeout: Duration,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_tool_output_chars: DEFAULT_MAX_TOOL_OUTPUT_CHARS,
            stream_timeout: STREAM_TIMEOUT,
        }
    }
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model answered without calling tools.
    Answered,
    MaxIterations,
    /// The same tool call kept failing the same way.
    RepeatedFailure,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StopReason::Answered => "answered",
            StopReason::MaxIterations => "max_iterations",
            StopReason::RepeatedFailure => "repeated_failure",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct LoopRun {
    pub state: ConversationState,
    pub iterations: usize,
    pub stop: StopReason,
}

/// A configured reasoning loop: prompt, model, tools and permissions.
pub struct AgentLoop {
    name: String,
    system_prompt: String,
    model: Arc<dyn ModelClient>,
    model_config: ModelConfig,
    tools: Arc<ToolRegistry>,
    scope: Option<PermissionScope>,
    checkpoints: Arc<dyn CheckpointStore>,
    limits: LoopLimits,
}

impl AgentLoop {
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        model: Arc<dyn ModelClient>,
        model_config: ModelConfig,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            model,
            model_config,
            tools,
            scope: None,
            checkpoints,
            limits: LoopLimits::default(),
        }
    }

    /// Enforce `scope` on every file tool call this loop makes.
    pub fn with_scope(mut self, scope: PermissionScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    /// Run until the model stops calling tools.
    ///
    /// `state` must already hold the new user message. The returned state is
    /// also the last checkpoint saved under `thread_id`.
    pub async fn run(
        &self,
        mut state: ConversationState,
        thread_id: &str,
        events: &EventSender,
        cancel: &CancellationToken,
    ) -> Result<LoopRun, AgentError> {
        let ai_tools = self.tools.get_ai_tools();
        let mut failure_counters: HashMap<String, usize> = HashMap::new();

        info!(
            agent = %self.name,
            thread_id,
            tools = ai_tools.len(),
            "Reasoning loop started"
        );

        for iteration in 1..=self.limits.max_iterations {
            if cancel.is_cancelled() {
                self.checkpoint(thread_id, &state).await;
                return Err(AgentError::Cancelled);
            }

            let request = CompletionRequest {
                config: self.model_config.clone(),
                system_prompt: self.system_prompt.clone(),
                messages: state.messages.clone(),
                tools: ai_tools.clone(),
            };

            let api_rx = tokio::select! {
                started = self.model.complete(request) => match started {
                    Ok(rx) => rx,
                    Err(e) => return Err(self.fail(thread_id, &state, events, e.to_string()).await),
                },
                _ = cancel.cancelled() => {
                    self.checkpoint(thread_id, &state).await;
                    return Err(AgentError::Cancelled);
                }
            };

            let result = tokio::select! {
                result = stream::process_stream(api_rx, events, self.limits.stream_timeout) => result,
                _ = cancel.cancelled() => {
                    self.checkpoint(thread_id, &state).await;
                    return Err(AgentError::Cancelled);
                }
            };

            if let Some(error) = result.error {
                return Err(self.fail(thread_id, &state, events, error).await);
            }

            let assistant_msg = build_assistant_message(&result.text, &result.tool_calls);
            if !assistant_msg.content.is_empty() {
                state.messages.push(assistant_msg);
            }

            if result.tool_calls.is_empty() {
                self.checkpoint(thread_id, &state).await;
                events.send(LoopEvent::TurnComplete {
                    turn: iteration,
                    has_more: false,
                });
                info!(agent = %self.name, thread_id, iteration, "Reasoning loop answered");
                return Ok(LoopRun {
                    state,
                    iterations: iteration,
                    stop: StopReason::Answered,
                });
            }

            debug!(
                agent = %self.name,
                iteration,
                calls = result.tool_calls.len(),
                "Executing tool calls"
            );
            let scope = ExecutionScope {
                agent: &self.name,
                thread_id,
                permissions: self.scope.as_ref(),
                events,
                cancel,
                max_output_chars: self.limits.max_tool_output_chars,
            };
            let tool_results =
                executor::execute_tools(&result.tool_calls, &self.tools, &mut state, &scope).await;

            let fail_diagnostic = failure::detect_repeated_failures(
                &mut failure_counters,
                &result.tool_calls,
                &tool_results,
            );

            state.messages.push(ModelMessage {
                role: Role::Tool,
                content: tool_results,
            });
            self.checkpoint(thread_id, &state).await;

            if let Some(diagnostic) = fail_diagnostic {
                warn!(
                    agent = %self.name,
                    thread_id,
                    iteration,
                    diagnostic = %diagnostic,
                    "Fail-fast: stopping repeated tool failure loop"
                );
                events.send(LoopEvent::Error { error: diagnostic });
                events.send(LoopEvent::TurnComplete {
                    turn: iteration,
                    has_more: false,
                });
                return Ok(LoopRun {
                    state,
                    iterations: iteration,
                    stop: StopReason::RepeatedFailure,
                });
            }

            events.send(LoopEvent::TurnComplete {
                turn: iteration,
                has_more: true,
            });
        }

        warn!(
            agent = %self.name,
            thread_id,
            max_iterations = self.limits.max_iterations,
            "Reasoning loop hit the iteration limit"
        );
        events.send(LoopEvent::Error {
            error: format!(
                "Stopped after {} iterations without a final answer",
                self.limits.max_iterations
            ),
        });
        Ok(LoopRun {
            state,
            iterations: self.limits.max_iterations,
            stop: StopReason::MaxIterations,
        })
    }

    async fn checkpoint(&self, thread_id: &str, state: &ConversationState) {
        if let Err(e) = self.checkpoints.save(thread_id, state).await {
            warn!(agent = %self.name, thread_id, "Failed to save checkpoint: {}", e);
        }
    }

    async fn fail(
        &self,
        thread_id: &str,
        state: &ConversationState,
        events: &EventSender,
        error: String,
    ) -> AgentError {
        warn!(agent = %self.name, thread_id, error = %error, "Model call failed");
        self.checkpoint(thread_id, state).await;
        events.send(LoopEvent::Error {
            error: format!("AI error: {}", error),
        });
        AgentError::UpstreamFailure(error)
    }
}

fn build_assistant_message(text: &str, tool_calls: &[AiToolCall]) -> ModelMessage {
    let mut content = Vec::with_capacity(tool_calls.len() + usize::from(!text.is_empty()));

    if !text.is_empty() {
        content.push(Content::Text {
            text: text.to_string(),
        });
    }

    for call in tool_calls {
        content.push(Content::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        });
    }

    ModelMessage {
        role: Role::Assistant,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::checkpoint::MemoryCheckpointStore;
    use crate::agent::event_bus::event_channel;
    use crate::ai::scripted::{ScriptedModel, ScriptedTurn};
    use crate::tools::implementations::register_builtin_tools;
    use serde_json::json;

    fn agent_loop(model: &ScriptedModel, store: Arc<MemoryCheckpointStore>) -> AgentLoop {
        let tools = ToolRegistry::new();
        register_builtin_tools(&tools);
        AgentLoop::new(
            "main",
            "You are helpful.",
            Arc::new(model.clone()),
            ModelConfig::default(),
            Arc::new(tools),
            store,
        )
    }

    #[tokio::test]
    async fn test_runs_tools_then_answers() {
        let model = ScriptedModel::new([
            ScriptedTurn::tool_call(
                "call_1",
                "write_file",
                json!({"file_path": "docs/a.md", "content": "draft"}),
            ),
            ScriptedTurn::text("Wrote the draft."),
        ]);
        let store = Arc::new(MemoryCheckpointStore::new());
        let (tx, mut rx) = event_channel(256);

        let run = agent_loop(&model, store.clone())
            .run(
                ConversationState::seeded("write a draft"),
                "thread-1",
                &tx,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(run.stop, StopReason::Answered);
        assert_eq!(run.iterations, 2);
        assert_eq!(run.state.files.get("docs/a.md").unwrap().current(), "draft");
        assert_eq!(run.state.last_assistant_text().as_deref(), Some("Wrote the draft."));
        // user, assistant(tool_use), tool, assistant(text)
        assert_eq!(run.state.messages.len(), 4);
        assert_eq!(run.state.messages[2].role, Role::Tool);

        let saved = store.load("thread-1").await.unwrap().unwrap();
        assert_eq!(saved, run.state);

        let second_request = &model.requests()[1];
        assert_eq!(second_request.system_prompt, "You are helpful.");
        assert_eq!(second_request.messages.len(), 3);
        assert!(second_request.tools.iter().any(|t| t.name == "edit_file"));

        drop(tx);
        let mut turns = Vec::new();
        while let Some(event) = rx.recv().await {
            if let LoopEvent::TurnComplete { turn, has_more } = event {
                turns.push((turn, has_more));
            }
        }
        assert_eq!(turns, vec![(1, true), (2, false)]);
    }

    #[tokio::test]
    async fn test_model_failure_is_upstream_error() {
        let model = ScriptedModel::new([ScriptedTurn::fail("connection refused")]);
        let store = Arc::new(MemoryCheckpointStore::new());
        let err = agent_loop(&model, store.clone())
            .run(
                ConversationState::seeded("hi"),
                "t",
                &EventSender::detached(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::UpstreamFailure(ref m) if m.contains("connection refused")));
        assert!(store.load("t").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_repeated_failure_stops_loop() {
        let bad_edit = json!({"file_path": "missing.md", "old_string": "a", "new_string": "b"});
        let model = ScriptedModel::new([
            ScriptedTurn::tool_call("c1", "edit_file", bad_edit.clone()),
            ScriptedTurn::tool_call("c2", "edit_file", bad_edit),
            ScriptedTurn::text("never reached"),
        ]);
        let run = agent_loop(&model, Arc::new(MemoryCheckpointStore::new()))
            .run(
                ConversationState::seeded("edit"),
                "t",
                &EventSender::detached(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(run.stop, StopReason::RepeatedFailure);
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let model = ScriptedModel::new([
            ScriptedTurn::tool_call("c1", "list_files", json!({})),
            ScriptedTurn::tool_call("c2", "list_files", json!({})),
        ]);
        let run = agent_loop(&model, Arc::new(MemoryCheckpointStore::new()))
            .with_limits(LoopLimits {
                max_iterations: 1,
                ..Default::default()
            })
            .run(
                ConversationState::seeded("loop"),
                "t",
                &EventSender::detached(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(run.stop, StopReason::MaxIterations);
        assert_eq!(model.remaining(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let model = ScriptedModel::new([ScriptedTurn::text("hi")]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = agent_loop(&model, Arc::new(MemoryCheckpointStore::new()))
            .run(
                ConversationState::seeded("hi"),
                "t",
                &EventSender::detached(),
                &cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(model.requests().is_empty());
    }
}
