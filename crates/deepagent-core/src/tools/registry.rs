//! Tool registry for managing available tools
//!
//! Tools read a copy of the conversation state from their `ToolContext` and
//! return a `ToolResult` carrying an optional `StatePatch`. Per-role tool
//! sets are carved out of a registry with `subset`, which rejects unknown
//! names up front.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::agent::event_bus::EventSender;
use crate::ai::types::AiTool;
use crate::error::{Access, AgentError, ConfigError, WorkspaceError};
use crate::state::{StatePatch, Todo};
use crate::workspace::{PermissionScope, Workspace};

/// Default tool execution timeout (2 minutes)
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Tool execution result
#[derive(Debug, Clone, Default)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
    /// State changes to merge once the call returns.
    pub patch: StatePatch,
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Default::default()
        }
    }

    /// Create a structured success envelope with `ok=true` and `data`.
    pub fn success_data(data: Value) -> Self {
        Self::success_data_with(data, None)
    }

    /// Create a structured success envelope with an optional diff.
    pub fn success_data_with(data: Value, diff: Option<String>) -> Self {
        let mut envelope = serde_json::Map::new();
        envelope.insert("ok".to_string(), Value::Bool(true));
        envelope.insert("data".to_string(), data);

        if let Some(diff) = diff.filter(|d| !d.is_empty()) {
            envelope.insert("diff".to_string(), Value::String(diff));
        }

        Self::success(Value::Object(envelope).to_string())
    }

    /// Create a structured error with explicit code.
    pub fn error_with_code(code: &str, msg: impl std::fmt::Display) -> Self {
        Self::error_with_details(code, msg, None)
    }

    /// Create a structured error envelope with optional data.
    pub fn error_with_details(code: &str, msg: impl std::fmt::Display, data: Option<Value>) -> Self {
        let mut envelope = serde_json::Map::new();
        envelope.insert("ok".to_string(), Value::Bool(false));
        envelope.insert(
            "error".to_string(),
            serde_json::json!({
                "code": code,
                "message": msg.to_string()
            }),
        );

        if let Some(data) = data {
            envelope.insert("data".to_string(), data);
        }

        Self {
            output: Value::Object(envelope).to_string(),
            is_error: true,
            patch: StatePatch::default(),
        }
    }

    /// Create an invalid-parameters error.
    pub fn invalid_parameters(msg: impl std::fmt::Display) -> Self {
        Self::error_with_code("invalid_parameters", msg)
    }

    /// Attach state changes to this result.
    pub fn with_patch(mut self, patch: StatePatch) -> Self {
        self.patch = patch;
        self
    }

    /// Error code from the envelope, if this is a structured error.
    pub fn error_code(&self) -> Option<String> {
        if !self.is_error {
            return None;
        }
        serde_json::from_str::<Value>(&self.output)
            .ok()
            .and_then(|v| v["error"]["code"].as_str().map(str::to_string))
    }
}

impl From<WorkspaceError> for ToolResult {
    fn from(err: WorkspaceError) -> Self {
        ToolResult::error_with_code(err.code(), err)
    }
}

impl From<AgentError> for ToolResult {
    fn from(err: AgentError) -> Self {
        let data = match &err {
            AgentError::UnknownSubagent { valid, .. } => {
                Some(serde_json::json!({ "valid_roles": valid }))
            }
            _ => None,
        };
        ToolResult::error_with_details(err.code(), err, data)
    }
}

/// Parse tool parameters, returning a ToolResult error on failure
pub fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ToolResult> {
    // Arguments that failed to parse as JSON arrive as a raw string.
    let params = match params {
        Value::String(raw) => serde_json::from_str(&raw).map_err(|e| {
            ToolResult::invalid_parameters(format!("Invalid parameters: {}", e))
        })?,
        other => other,
    };
    serde_json::from_value(params)
        .map_err(|e| ToolResult::invalid_parameters(format!("Invalid parameters: {}", e)))
}

/// Context for tool execution
pub struct ToolContext {
    /// Role running the tool ("main" for the top-level agent)
    pub agent: String,
    /// Checkpoint thread of the running loop
    pub thread_id: String,
    /// Tool call being answered
    pub tool_call_id: Option<String>,
    /// Workspace as of this call
    pub files: Workspace,
    /// TODO list as of this call
    pub todos: Vec<Todo>,
    /// Path permissions; `None` means unrestricted
    pub scope: Option<PermissionScope>,
    /// Event channel of the running loop
    pub events: Option<EventSender>,
    pub cancel: CancellationToken,
    /// Optional per-call timeout override
    pub timeout: Option<Duration>,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            agent: crate::agent::MAIN_AGENT.to_string(),
            thread_id: String::new(),
            tool_call_id: None,
            files: Workspace::default(),
            todos: Vec::new(),
            scope: None,
            events: None,
            cancel: CancellationToken::new(),
            timeout: None,
        }
    }
}

impl ToolContext {
    pub fn with_files(mut self, files: Workspace) -> Self {
        self.files = files;
        self
    }

    pub fn with_scope(mut self, scope: PermissionScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    pub fn check_read(&self, path: &str) -> Result<(), WorkspaceError> {
        self.check(path, Access::Read)
    }

    pub fn check_write(&self, path: &str) -> Result<(), WorkspaceError> {
        self.check(path, Access::Write)
    }

    fn check(&self, path: &str, access: Access) -> Result<(), WorkspaceError> {
        match &self.scope {
            Some(scope) => scope.check(path, access),
            None => Ok(()),
        }
    }

    pub fn can_read(&self, path: &str) -> bool {
        self.check_read(path).is_ok()
    }
}

/// Trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (id)
    fn name(&self) -> &str;

    /// Tool description for AI
    fn description(&self) -> &str;

    /// JSON schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Timeout overriding the registry default
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Execute the tool
    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult;
}

/// Registry of named tools
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
    /// Default timeout for tool execution
    default_timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(BTreeMap::new()),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.write().insert(name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Registry holding only `allowed`, resolved now.
    ///
    /// Fails on the first name this registry does not know.
    pub fn subset(&self, role: &str, allowed: &[String]) -> Result<ToolRegistry, ConfigError> {
        let tools = self.tools.read();
        let mut picked = BTreeMap::new();
        for name in allowed {
            let tool = tools.get(name).ok_or_else(|| ConfigError::UnknownTool {
                role: role.to_string(),
                tool: name.clone(),
            })?;
            picked.insert(name.clone(), tool.clone());
        }
        Ok(ToolRegistry {
            tools: RwLock::new(picked),
            default_timeout: self.default_timeout,
        })
    }

    /// Copy of this registry, for extending without touching the original.
    pub fn snapshot(&self) -> ToolRegistry {
        ToolRegistry {
            tools: RwLock::new(self.tools.read().clone()),
            default_timeout: self.default_timeout,
        }
    }

    /// Get all tools as AI tool definitions
    pub fn get_ai_tools(&self) -> Vec<AiTool> {
        self.tools
            .read()
            .values()
            .map(|t| AiTool {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }

    /// Execute a tool by name with timeout and cancellation
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Option<ToolResult> {
        let tool = self.get(name)?;
        let timeout = ctx
            .timeout
            .or_else(|| tool.timeout())
            .unwrap_or(self.default_timeout);
        let start = Instant::now();
        tracing::debug!(tool = name, agent = %ctx.agent, "ToolRegistry: executing");

        let result = tokio::select! {
            outcome = tokio::time::timeout(timeout, tool.execute(params, ctx)) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        tool = name,
                        timeout_secs = timeout.as_secs(),
                        "Tool execution timed out"
                    );
                    ToolResult::error_with_code(
                        "timeout",
                        format!(
                            "Tool '{}' timed out after {} seconds",
                            name,
                            timeout.as_secs()
                        ),
                    )
                }
            },
            _ = ctx.cancel.cancelled() => {
                ToolResult::error_with_code("cancelled", format!("Tool '{}' was cancelled", name))
            }
        };

        tracing::debug!(
            tool = name,
            is_error = result.is_error,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ToolRegistry: finished"
        );
        Some(result)
    }
}
