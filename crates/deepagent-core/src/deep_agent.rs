//! Deep agent - the main agent wired to its sub-agent roles
//!
//! `DeepAgentBuilder` assembles the global tool registry, resolves every role
//! against it, and gives the main loop the `task` tool on top of the global
//! tools. `DeepAgent` runs conversations by thread id; each thread's state
//! lives in the checkpoint store between calls.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::agent::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use crate::agent::event_bus::{event_channel, EventReceiver, EventSender, DEFAULT_EVENT_CAPACITY};
use crate::agent::loop_events::LoopEvent;
use crate::agent::orchestrator::{AgentLoop, LoopLimits};
use crate::agent::prompts::{main_system_prompt, MAIN_INSTRUCTIONS};
use crate::agent::subagent::{Dispatcher, SubAgentRegistry, SubAgentSpec, DEFAULT_SUBAGENT_TIMEOUT};
use crate::agent::MAIN_AGENT;
use crate::ai::model::{ModelClient, ModelConfig};
use crate::ai::types::ModelMessage;
use crate::config::AppConfig;
use crate::error::{AgentError, ConfigError};
use crate::state::ConversationState;
use crate::tools::implementations::{
    register_builtin_tools, register_search_tool, DisabledDocumentSearch, DocumentSearch, TaskTool,
};
use crate::tools::registry::{Tool, ToolRegistry, DEFAULT_TOOL_TIMEOUT};

pub struct DeepAgentBuilder {
    model: Arc<dyn ModelClient>,
    model_config: ModelConfig,
    instructions: String,
    extra_tools: Vec<Arc<dyn Tool>>,
    subagents: Vec<SubAgentSpec>,
    checkpoints: Arc<dyn CheckpointStore>,
    search: Option<Arc<dyn DocumentSearch>>,
    limits: LoopLimits,
    subagent_timeout: Duration,
    tool_timeout: Duration,
    event_capacity: usize,
}

impl DeepAgentBuilder {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            model,
            model_config: ModelConfig::default(),
            instructions: MAIN_INSTRUCTIONS.to_string(),
            extra_tools: Vec::new(),
            subagents: Vec::new(),
            checkpoints: Arc::new(MemoryCheckpointStore::new()),
            search: None,
            limits: LoopLimits::default(),
            subagent_timeout: DEFAULT_SUBAGENT_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Builder preloaded from a loaded configuration.
    pub fn from_config(config: &AppConfig, model: Arc<dyn ModelClient>) -> Self {
        Self::new(model)
            .model_config(config.model.clone())
            .instructions(config.instructions.clone())
            .subagents(config.subagents.clone())
            .search(config.search_backend())
            .limits(config.limits.loop_limits())
            .subagent_timeout(config.limits.subagent_timeout())
            .tool_timeout(config.limits.tool_timeout())
            .event_capacity(config.limits.event_capacity)
    }

    pub fn model_config(mut self, config: ModelConfig) -> Self {
        self.model_config = config;
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Extra tool, callable by the main agent and by roles that list it.
    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra_tools.push(tool);
        self
    }

    pub fn subagent(mut self, spec: SubAgentSpec) -> Self {
        self.subagents.push(spec);
        self
    }

    pub fn subagents(mut self, specs: impl IntoIterator<Item = SubAgentSpec>) -> Self {
        self.subagents.extend(specs);
        self
    }

    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = store;
        self
    }

    pub fn search(mut self, backend: Arc<dyn DocumentSearch>) -> Self {
        self.search = Some(backend);
        self
    }

    pub fn limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn subagent_timeout(mut self, timeout: Duration) -> Self {
        self.subagent_timeout = timeout;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Validate every role and wire the loops.
    pub fn build(self) -> Result<DeepAgent, ConfigError> {
        let global = ToolRegistry::new().with_timeout(self.tool_timeout);
        register_builtin_tools(&global);
        register_search_tool(
            &global,
            self.search.unwrap_or_else(|| Arc::new(DisabledDocumentSearch)),
        );
        for tool in self.extra_tools {
            global.register(tool);
        }

        let roles = SubAgentRegistry::new(self.subagents, &global, &self.instructions)?;
        let dispatcher = Arc::new(
            Dispatcher::new(
                roles,
                self.model.clone(),
                self.model_config.clone(),
                self.checkpoints.clone(),
            )
            .with_limits(self.limits)
            .with_timeout(self.subagent_timeout),
        );

        let main_tools = global.snapshot();
        main_tools.register(Arc::new(TaskTool::new(dispatcher.clone())));

        info!(
            roles = ?dispatcher.roles().names(),
            tools = ?main_tools.names(),
            model = %self.model_config.model,
            "Deep agent built"
        );

        let main = AgentLoop::new(
            MAIN_AGENT,
            main_system_prompt(&self.instructions),
            self.model,
            self.model_config,
            Arc::new(main_tools),
            self.checkpoints.clone(),
        )
        .with_limits(self.limits);

        Ok(DeepAgent {
            main,
            dispatcher,
            checkpoints: self.checkpoints,
            event_capacity: self.event_capacity,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }
}

pub struct DeepAgent {
    main: AgentLoop,
    dispatcher: Arc<Dispatcher>,
    checkpoints: Arc<dyn CheckpointStore>,
    event_capacity: usize,
    /// Token shared by every run started since the last `cancel`.
    cancel: Mutex<CancellationToken>,
}

impl DeepAgent {
    pub fn builder(model: Arc<dyn ModelClient>) -> DeepAgentBuilder {
        DeepAgentBuilder::new(model)
    }

    /// Send `input` on `thread_id` and run the main loop to completion.
    ///
    /// Emits `Finished` when the loop stops without error.
    pub async fn invoke(
        &self,
        thread_id: &str,
        input: &str,
        events: &EventSender,
    ) -> Result<ConversationState, AgentError> {
        let cancel = self.cancel.lock().clone();

        let mut state = match self.checkpoints.load(thread_id).await {
            Ok(Some(saved)) => saved,
            Ok(None) => ConversationState::default(),
            Err(e) => {
                warn!(thread_id, "Failed to load checkpoint, starting fresh: {}", e);
                ConversationState::default()
            }
        };
        state.messages.push(ModelMessage::user(input));

        let run = self.main.run(state, thread_id, events, &cancel).await?;
        info!(
            thread_id,
            iterations = run.iterations,
            stop = ?run.stop,
            files = run.state.files.len(),
            "Invocation finished"
        );
        events.send(LoopEvent::Finished {
            thread_id: thread_id.to_string(),
        });
        Ok(run.state)
    }

    /// Spawn `invoke` and hand back its event stream.
    pub fn run(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
        input: impl Into<String>,
    ) -> (
        EventReceiver,
        JoinHandle<Result<ConversationState, AgentError>>,
    ) {
        let (tx, rx) = event_channel(self.event_capacity);
        let agent = Arc::clone(self);
        let thread_id = thread_id.into();
        let input = input.into();

        let handle = tokio::spawn(async move {
            let result = agent.invoke(&thread_id, &input, &tx).await;
            if let Err(e) = &result {
                tx.send(LoopEvent::Error {
                    error: e.to_string(),
                });
            }
            result
        });

        (rx, handle)
    }

    /// Last saved state of `thread_id`.
    pub async fn state(&self, thread_id: &str) -> anyhow::Result<Option<ConversationState>> {
        self.checkpoints.load(thread_id).await
    }

    /// Role names, the generic role first.
    pub fn roles(&self) -> Vec<String> {
        self.dispatcher.roles().names()
    }

    pub fn role_registry(&self) -> &SubAgentRegistry {
        self.dispatcher.roles()
    }

    pub fn main_loop(&self) -> &AgentLoop {
        &self.main
    }

    /// Cancel every run in flight, sub-agents included.
    ///
    /// Runs started afterwards are unaffected.
    pub fn cancel(&self) {
        let mut token = self.cancel.lock();
        token.cancel();
        *token = CancellationToken::new();
        info!("Cancelled in-flight runs");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::subagent::GENERAL_PURPOSE;
    use crate::ai::model::{CompletionRequest, StreamPart};
    use crate::ai::scripted::{ScriptedModel, ScriptedTurn};
    use crate::tools::implementations::{DOCUMENT_SEARCH, TASK, WRITE_FILE};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn architect() -> SubAgentSpec {
        SubAgentSpec::new("architecture_agent", "Architect", "Design it.")
            .with_tools(["read_file", "write_file", "list_files"])
            .with_permissions(["requirement", "architecture"], ["architecture"])
    }

    fn agent(model: &ScriptedModel) -> DeepAgent {
        DeepAgent::builder(Arc::new(model.clone()))
            .instructions("Coordinate.")
            .subagent(architect())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_wires_tools_and_roles() {
        let agent = agent(&ScriptedModel::default());
        assert_eq!(agent.roles(), vec![GENERAL_PURPOSE, "architecture_agent"]);

        let main_tools = agent.main_loop().tools().names();
        assert!(main_tools.contains(&TASK.to_string()));
        assert!(main_tools.contains(&DOCUMENT_SEARCH.to_string()));

        let general = agent.role_registry().get(GENERAL_PURPOSE).unwrap();
        assert!(!general.tools.contains(TASK));
        assert!(agent.main_loop().system_prompt().starts_with("Coordinate.\n\n"));
    }

    #[test]
    fn test_build_rejects_unknown_tool() {
        let result = DeepAgent::builder(Arc::new(ScriptedModel::default()))
            .subagent(SubAgentSpec::new("r", "d", "i").with_tools(["shell"]))
            .build();
        assert!(matches!(result, Err(ConfigError::UnknownTool { .. })));
    }

    #[test]
    fn test_default_config_builds() {
        let config = AppConfig::default();
        let agent = DeepAgentBuilder::from_config(&config, Arc::new(ScriptedModel::default()))
            .build()
            .unwrap();
        assert_eq!(agent.roles().len(), 5);
    }

    #[tokio::test]
    async fn test_invoke_persists_thread() {
        let model = ScriptedModel::new([
            ScriptedTurn::text("Hello."),
            ScriptedTurn::text("Again."),
        ]);
        let agent = agent(&model);
        let events = EventSender::detached();

        let state = agent.invoke("t1", "hi", &events).await.unwrap();
        assert_eq!(state.last_assistant_text().as_deref(), Some("Hello."));

        let state = agent.invoke("t1", "once more", &events).await.unwrap();
        assert_eq!(state.messages.len(), 4);
        assert_eq!(model.requests()[1].messages.len(), 3);

        let saved = agent.state("t1").await.unwrap().unwrap();
        assert_eq!(saved.messages.len(), 4);
        assert!(agent.state("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_task_merges_subagent_files() {
        let model = ScriptedModel::new([
            ScriptedTurn::tool_call(
                "call_1",
                TASK,
                json!({"description": "Write the architecture", "subagent_role": "architecture_agent"}),
            ),
            ScriptedTurn::tool_call(
                "s1",
                WRITE_FILE,
                json!({"file_path": "architecture/arch.md", "content": "two subsystems"}),
            ),
            ScriptedTurn::text("Architecture saved."),
            ScriptedTurn::text("All stages done."),
        ]);
        let agent = Arc::new(agent(&model));

        let (mut rx, handle) = agent.run("t2", "Design a train controller");
        let mut seen_start = false;
        let mut seen_chunk = false;
        let mut finished = false;
        while let Some(event) = rx.recv().await {
            match event {
                LoopEvent::SubagentStart { role, thread_id, .. } => {
                    assert_eq!(role, "architecture_agent");
                    assert_eq!(thread_id, "sub_agent_architecture_agent_call_1");
                    seen_start = true;
                }
                LoopEvent::SubagentChunk { .. } => seen_chunk = true,
                LoopEvent::Finished { thread_id } => {
                    assert_eq!(thread_id, "t2");
                    finished = true;
                }
                _ => {}
            }
        }
        let state = handle.await.unwrap().unwrap();

        assert!(seen_start && seen_chunk && finished);
        assert_eq!(
            state.files.get("architecture/arch.md").unwrap().current(),
            "two subsystems"
        );
        assert_eq!(state.last_assistant_text().as_deref(), Some("All stages done."));

        // The main agent saw the sub-agent's answer as the task result.
        let last = &model.requests()[3];
        let tool_message = last.messages.last().unwrap();
        assert!(tool_message.text().contains("Architecture saved."));
    }

    #[tokio::test]
    async fn test_model_failure_surfaces_as_error_event() {
        let model = ScriptedModel::new([ScriptedTurn::fail("provider down")]);
        let agent = Arc::new(agent(&model));

        let (mut rx, handle) = agent.run("t3", "hi");
        let mut errors = Vec::new();
        while let Some(event) = rx.recv().await {
            if let LoopEvent::Error { error } = event {
                errors.push(error);
            }
        }
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::UpstreamFailure(_)));
        assert!(errors.iter().any(|e| e.contains("provider down")));
    }

    struct Hanging;

    #[async_trait]
    impl ModelClient for Hanging {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> anyhow::Result<mpsc::UnboundedReceiver<StreamPart>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancel_stops_run_and_resets() {
        let agent = Arc::new(DeepAgent::builder(Arc::new(Hanging)).build().unwrap());
        let (_rx, handle) = agent.run("t4", "hi");
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        agent.cancel();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(!agent.cancel.lock().is_cancelled());
    }
}
