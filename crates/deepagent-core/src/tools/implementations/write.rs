//! Write tool - create or replace a workspace file

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::StatePatch;
use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};
use crate::workspace::Workspace;

pub const WRITE_FILE: &str = "write_file";

pub struct WriteFileTool;

#[derive(Deserialize)]
struct Params {
    file_path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        WRITE_FILE
    }

    fn description(&self) -> &str {
        "Create a workspace file, or replace an existing one. Replacing discards the file's history; prefer edit_file or edit_file_with_commit for changes to existing files."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Workspace path, `<directory>/<name>`"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["file_path", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(e) = ctx.check_write(&params.file_path) {
            return e.into();
        }

        let replaced = ctx.files.contains(&params.file_path);
        let mut files = Workspace::new();
        files.write(params.file_path.clone(), params.content);

        ToolResult::success_data(json!({
            "message": format!("Updated file {}", params.file_path),
            "file_path": params.file_path,
            "replaced": replaced,
        }))
        .with_patch(StatePatch::files(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::PermissionScope;

    #[tokio::test]
    async fn test_write_returns_single_file_patch() {
        let result = WriteFileTool
            .execute(
                json!({"file_path": "docs/a.txt", "content": "hello"}),
                &ToolContext::default(),
            )
            .await;
        assert!(!result.is_error);
        let files = result.patch.files.unwrap();
        assert_eq!(files.paths(), vec!["docs/a.txt"]);
        assert_eq!(files.get("docs/a.txt").unwrap().current(), "hello");
    }

    #[tokio::test]
    async fn test_write_outside_scope_is_denied() {
        let ctx = ToolContext::default().with_scope(PermissionScope::new(
            "architecture_agent",
            vec!["requirement".into()],
            vec!["architecture".into()],
        ));
        let result = WriteFileTool
            .execute(
                json!({"file_path": "requirement/r.md", "content": "x"}),
                &ctx,
            )
            .await;
        assert_eq!(result.error_code().as_deref(), Some("permission_denied"));
        assert!(result.patch.is_empty());
    }
}
