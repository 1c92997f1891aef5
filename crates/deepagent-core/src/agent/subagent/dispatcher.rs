//! Sub-agent dispatcher
//!
//! Runs one role's reasoning loop for one `task` call:
//!
//! ```text
//!  Idle ──► Running ──► Merging ──► Done
//!              │
//!              └──────► Failed
//! ```
//!
//! The sub-agent starts from a copy of the parent's files and TODOs plus the
//! task description as its only message. It runs on its own tokio task under
//! a timeout and a child cancellation token, so a panic, a hang or a provider
//! failure ends up as an error for this call only. Its events are forwarded
//! as `SubagentChunk`s as they happen. When the loop ends, the final state is
//! read back from the checkpoint store and returned for merging. A run that
//! stopped without answering reports its stop reason and last tool output as
//! the response.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::checkpoint::CheckpointStore;
use crate::agent::event_bus::EventSender;
use crate::agent::loop_events::LoopEvent;
use crate::agent::orchestrator::{AgentLoop, LoopLimits, StopReason};
use crate::ai::model::{ModelClient, ModelConfig};
use crate::ai::types::ModelMessage;
use crate::error::AgentError;
use crate::state::{ConversationState, Todo};
use crate::workspace::Workspace;

use super::registry::SubAgentRegistry;
use super::types::{DispatchOutcome, DispatchPhase};

/// Default upper bound on one sub-agent run (10 minutes)
pub const DEFAULT_SUBAGENT_TIMEOUT: Duration = Duration::from_secs(600);

/// One delegation request.
pub struct DispatchRequest {
    pub role: String,
    pub description: String,
    /// Id of the `task` call; makes the checkpoint thread unique.
    pub tool_call_id: String,
    pub files: Workspace,
    pub todos: Vec<Todo>,
    pub events: EventSender,
    /// Parent's token; the sub-agent runs under a child of it.
    pub cancel: CancellationToken,
}

/// Checkpoint thread of one dispatch.
pub fn subagent_thread_id(role: &str, tool_call_id: &str) -> String {
    format!("sub_agent_{}_{}", role, tool_call_id)
}

pub struct Dispatcher {
    roles: SubAgentRegistry,
    model: Arc<dyn ModelClient>,
    default_model: ModelConfig,
    checkpoints: Arc<dyn CheckpointStore>,
    limits: LoopLimits,
    timeout: Duration,
    /// Reasoning loops built so far, keyed by role.
    loops: DashMap<String, Arc<AgentLoop>>,
}

impl Dispatcher {
    pub fn new(
        roles: SubAgentRegistry,
        model: Arc<dyn ModelClient>,
        default_model: ModelConfig,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            roles,
            model,
            default_model,
            checkpoints,
            limits: LoopLimits::default(),
            timeout: DEFAULT_SUBAGENT_TIMEOUT,
            loops: DashMap::new(),
        }
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn roles(&self) -> &SubAgentRegistry {
        &self.roles
    }

    /// Roles whose loop has been constructed.
    pub fn loaded_roles(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loops.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Cached loop for `role`, built on first use.
    fn loop_for(&self, role: &str) -> Option<Arc<AgentLoop>> {
        let entry = self.roles.get(role)?;
        let agent_loop = self
            .loops
            .entry(role.to_string())
            .or_insert_with(|| {
                debug!(role, "Building sub-agent loop");
                let model_config = match &entry.spec.model {
                    Some(model) => model.clone().inherit(&self.default_model),
                    None => self.default_model.clone(),
                };
                Arc::new(
                    AgentLoop::new(
                        role,
                        entry.spec.system_prompt(),
                        self.model.clone(),
                        model_config,
                        entry.tools.clone(),
                        self.checkpoints.clone(),
                    )
                    .with_scope(entry.scope.clone())
                    .with_limits(self.limits),
                )
            })
            .value()
            .clone();
        Some(agent_loop)
    }

    /// Run `request.role` to completion and return its state for merging.
    pub async fn dispatch(&self, request: DispatchRequest) -> Result<DispatchOutcome, AgentError> {
        let DispatchRequest {
            role,
            description,
            tool_call_id,
            files,
            todos,
            events,
            cancel,
        } = request;

        let Some(agent_loop) = self.loop_for(&role) else {
            warn!(role = %role, "Dispatch to unknown sub-agent role");
            return Err(AgentError::UnknownSubagent {
                role,
                valid: self.roles.names(),
            });
        };

        let thread_id = subagent_thread_id(&role, &tool_call_id);
        let mut phase = PhaseTracker::new(&role, &thread_id);

        events.send(LoopEvent::SubagentStart {
            role: role.clone(),
            description: description.clone(),
            thread_id: thread_id.clone(),
        });
        phase.advance(DispatchPhase::Running);

        let state = ConversationState {
            messages: vec![ModelMessage::user(description)],
            todos,
            files,
        };

        let child_cancel = cancel.child_token();
        let sub_events = events.for_subagent(role.clone());
        let run_cancel = child_cancel.clone();
        let run_thread = thread_id.clone();
        let mut handle = tokio::spawn(async move {
            agent_loop
                .run(state, &run_thread, &sub_events, &run_cancel)
                .await
        });

        let outcome = match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(AgentError::UpstreamFailure(format!(
                "sub-agent '{}' aborted: {}",
                role, join_err
            ))),
            Err(_) => {
                child_cancel.cancel();
                handle.abort();
                Err(AgentError::TimedOut {
                    role: role.clone(),
                    secs: self.timeout.as_secs(),
                })
            }
        };

        let run = match outcome {
            Ok(run) => run,
            Err(err) => {
                phase.advance(DispatchPhase::Failed);
                warn!(role = %role, thread_id = %thread_id, error = %err, "Sub-agent failed");
                events.send(LoopEvent::SubagentStop {
                    role,
                    success: false,
                    error: Some(err.to_string()),
                });
                return Err(err);
            }
        };

        phase.advance(DispatchPhase::Merging);
        let final_state = match self.checkpoints.load(&thread_id).await {
            Ok(Some(saved)) => saved,
            Ok(None) => run.state,
            Err(e) => {
                warn!(thread_id = %thread_id, "Checkpoint read-back failed, using in-memory state: {}", e);
                run.state
            }
        };
        let (response, failure) = match run.stop {
            StopReason::Answered => (final_state.last_assistant_text().unwrap_or_default(), None),
            stop => {
                let mut message = format!("Sub-agent '{}' stopped before answering ({})", role, stop);
                if let Some(output) = final_state.last_tool_output().filter(|o| !o.is_empty()) {
                    message.push_str(". Last tool output: ");
                    message.push_str(&output);
                }
                warn!(role = %role, thread_id = %thread_id, stop = %stop, "Sub-agent gave no answer");
                (message.clone(), Some(message))
            }
        };

        phase.advance(DispatchPhase::Done);
        events.send(LoopEvent::SubagentStop {
            role: role.clone(),
            success: failure.is_none(),
            error: failure,
        });

        Ok(DispatchOutcome {
            role,
            thread_id,
            response,
            files: final_state.files,
            iterations: run.iterations,
            stop: run.stop,
        })
    }
}

struct PhaseTracker<'a> {
    phase: DispatchPhase,
    role: &'a str,
    thread_id: &'a str,
}

impl<'a> PhaseTracker<'a> {
    fn new(role: &'a str, thread_id: &'a str) -> Self {
        Self {
            phase: DispatchPhase::Idle,
            role,
            thread_id,
        }
    }

    fn advance(&mut self, next: DispatchPhase) {
        debug_assert!(
            self.phase.can_transition(next),
            "invalid dispatch transition {} -> {}",
            self.phase,
            next
        );
        info!(
            role = self.role,
            thread_id = self.thread_id,
            from = %self.phase,
            to = %next,
            "Dispatch phase"
        );
        self.phase = next;
    }
}
