//! Task tool - delegate work to a sub-agent role
//!
//! The result's output is the sub-agent's final answer; its patch carries the
//! sub-agent's whole workspace, merged into the caller's per path. A sub-agent
//! that stopped without answering yields an `upstream_failure` error that
//! still carries its files.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::event_bus::EventSender;
use crate::agent::prompts::{TASK_DESCRIPTION_PREFIX, TASK_DESCRIPTION_SUFFIX};
use crate::agent::subagent::{DispatchRequest, Dispatcher};
use crate::state::StatePatch;
use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};

pub const TASK: &str = "task";

pub struct TaskTool {
    dispatcher: Arc<Dispatcher>,
    description: String,
}

impl TaskTool {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        let description = format!(
            "{}\n{}\n{}",
            TASK_DESCRIPTION_PREFIX,
            dispatcher.roles().describe(),
            TASK_DESCRIPTION_SUFFIX
        );
        Self {
            dispatcher,
            description,
        }
    }
}

#[derive(Deserialize)]
struct Params {
    description: String,
    #[serde(alias = "subagent_type")]
    subagent_role: String,
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        TASK
    }

    fn description(&self) -> &str {
        &self.description
    }

    /// The dispatcher enforces its own limit; leave it room to report.
    fn timeout(&self) -> Option<Duration> {
        Some(self.dispatcher.timeout() + Duration::from_secs(5))
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Complete instructions for the sub-agent"
                },
                "subagent_role": {
                    "type": "string",
                    "enum": self.dispatcher.roles().names(),
                    "description": "Role to delegate to"
                }
            },
            "required": ["description", "subagent_role"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let tool_call_id = ctx
            .tool_call_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        let request = DispatchRequest {
            role: params.subagent_role,
            description: params.description,
            tool_call_id,
            files: ctx.files.clone(),
            todos: ctx.todos.clone(),
            events: ctx.events.clone().unwrap_or_else(EventSender::detached),
            cancel: ctx.cancel.clone(),
        };

        match self.dispatcher.dispatch(request).await {
            Ok(outcome) if outcome.answered() => {
                ToolResult::success(outcome.response).with_patch(StatePatch::files(outcome.files))
            }
            Ok(outcome) => ToolResult::error_with_details(
                "upstream_failure",
                &outcome.response,
                Some(json!({ "stop_reason": outcome.stop.to_string() })),
            )
            .with_patch(StatePatch::files(outcome.files)),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::checkpoint::MemoryCheckpointStore;
    use crate::agent::subagent::{SubAgentRegistry, SubAgentSpec};
    use crate::ai::model::ModelConfig;
    use crate::ai::scripted::{ScriptedModel, ScriptedTurn};
    use crate::tools::implementations::register_builtin_tools;
    use crate::tools::registry::ToolRegistry;
    use crate::workspace::Workspace;

    fn task_tool(model: &ScriptedModel) -> TaskTool {
        let global = ToolRegistry::new();
        register_builtin_tools(&global);
        let roles = SubAgentRegistry::new(
            vec![SubAgentSpec::new("system_agent", "Models the system", "Model it.")
                .with_tools(["write_file"])
                .with_permissions(["architecture"], ["system"])],
            &global,
            "general",
        )
        .unwrap();
        TaskTool::new(Arc::new(Dispatcher::new(
            roles,
            Arc::new(model.clone()),
            ModelConfig::default(),
            Arc::new(MemoryCheckpointStore::new()),
        )))
    }

    #[test]
    fn test_description_lists_roles() {
        let tool = task_tool(&ScriptedModel::default());
        assert!(tool.description().contains("- system_agent: Models the system"));
        assert!(tool.description().contains("- general-purpose: "));
        assert_eq!(
            tool.parameters_schema()["properties"]["subagent_role"]["enum"],
            json!(["general-purpose", "system_agent"])
        );
    }

    #[tokio::test]
    async fn test_task_returns_answer_and_files() {
        let model = ScriptedModel::new([
            ScriptedTurn::tool_call(
                "c1",
                "write_file",
                json!({"file_path": "system/train.txt", "content": "state Idle"}),
            ),
            ScriptedTurn::text("Modelled the train."),
        ]);
        let tool = task_tool(&model);
        let mut files = Workspace::new();
        files.write("architecture/arch.md", "train subsystem");
        let ctx = ToolContext::default()
            .with_files(files)
            .with_tool_call_id("call_9");

        let result = tool
            .execute(
                json!({"description": "Model the train", "subagent_type": "system_agent"}),
                &ctx,
            )
            .await;

        assert!(!result.is_error);
        assert_eq!(result.output, "Modelled the train.");
        let files = result.patch.files.unwrap();
        assert_eq!(files.paths(), vec!["architecture/arch.md", "system/train.txt"]);
        assert!(result.patch.messages.is_empty());
    }

    #[tokio::test]
    async fn test_subagent_without_answer_is_tool_error() {
        let denied = json!({"file_path": "architecture/arch.md", "content": "rewritten"});
        let model = ScriptedModel::new([
            ScriptedTurn::tool_call("c1", "write_file", denied.clone()),
            ScriptedTurn::tool_call("c2", "write_file", denied),
        ]);
        let tool = task_tool(&model);
        let mut files = Workspace::new();
        files.write("architecture/arch.md", "train subsystem");
        let ctx = ToolContext::default()
            .with_files(files)
            .with_tool_call_id("call_3");

        let result = tool
            .execute(
                json!({"description": "Model the train", "subagent_role": "system_agent"}),
                &ctx,
            )
            .await;

        assert!(result.is_error);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["error"]["code"], "upstream_failure");
        assert_eq!(parsed["data"]["stop_reason"], "repeated_failure");
        assert!(parsed["error"]["message"]
            .as_str()
            .unwrap()
            .contains("permission_denied"));
        let files = result.patch.files.unwrap();
        assert_eq!(files.get("architecture/arch.md").unwrap().current(), "train subsystem");
    }

    #[tokio::test]
    async fn test_unknown_role_is_tool_error() {
        let tool = task_tool(&ScriptedModel::default());
        let result = tool
            .execute(
                json!({"description": "x", "subagent_role": "poet"}),
                &ToolContext::default(),
            )
            .await;
        assert!(result.is_error);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["error"]["code"], "unknown_subagent");
        assert!(parsed["error"]["message"]
            .as_str()
            .unwrap()
            .contains("[`general-purpose`, `system_agent`]"));
        assert_eq!(parsed["data"]["valid_roles"][1], "system_agent");
    }
}
