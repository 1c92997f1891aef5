//! TODO tool - replace the shared task list

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::{StatePatch, Todo, TodoStatus};
use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};

pub const WRITE_TODOS: &str = "write_todos";

pub struct WriteTodosTool;

#[derive(Deserialize)]
struct Params {
    todos: Vec<Todo>,
}

#[async_trait]
impl Tool for WriteTodosTool {
    fn name(&self) -> &str {
        WRITE_TODOS
    }

    fn description(&self) -> &str {
        "Replace the TODO list used to plan and track multi-step work. Send the complete list every time; keep exactly one item in_progress while working and mark items completed as soon as they are done."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {"type": "string"},
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed"]
                            }
                        },
                        "required": ["content", "status"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["todos"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let count = |status: TodoStatus| params.todos.iter().filter(|t| t.status == status).count();
        let data = json!({
            "message": format!("Updated todo list ({} items)", params.todos.len()),
            "pending": count(TodoStatus::Pending),
            "in_progress": count(TodoStatus::InProgress),
            "completed": count(TodoStatus::Completed),
        });

        ToolResult::success_data(data).with_patch(StatePatch::todos(params.todos))
    }
}
