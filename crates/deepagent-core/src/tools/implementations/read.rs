//! Read tools - numbered view of the latest snapshot, or of the whole history

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};
use crate::workspace::DEFAULT_READ_LIMIT;

pub const READ_FILE: &str = "read_file";
pub const READ_FILE_WITH_HISTORY: &str = "read_file_with_history";

pub struct ReadFileTool;

pub struct ReadFileWithHistoryTool;

#[derive(Deserialize)]
struct Params {
    file_path: String,
    #[serde(default)]
    offset: usize,
    #[serde(default = "default_limit")]
    limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_READ_LIMIT
}

fn schema(what: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "file_path": {
                "type": "string",
                "description": format!("Workspace path of the file to read {}", what)
            },
            "offset": {
                "type": "integer",
                "description": "0-based line to start reading from",
                "default": 0
            },
            "limit": {
                "type": "integer",
                "description": "Maximum number of lines to return",
                "default": DEFAULT_READ_LIMIT
            }
        },
        "required": ["file_path"],
        "additionalProperties": false
    })
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        READ_FILE
    }

    fn description(&self) -> &str {
        "Read the current content of a workspace file. Lines are numbered cat -n style starting at 1 and cut at 2000 characters. Use offset/limit to page through long files."
    }

    fn parameters_schema(&self) -> Value {
        schema("")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(e) = ctx.check_read(&params.file_path) {
            return e.into();
        }

        match ctx.files.read(&params.file_path, params.offset, params.limit) {
            Ok(text) => ToolResult::success(text),
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadFileWithHistoryTool {
    fn name(&self) -> &str {
        READ_FILE_WITH_HISTORY
    }

    fn description(&self) -> &str {
        "Read every recorded version of a workspace file, oldest first, as one numbered document. Commit messages recorded by edit_file_with_commit appear between versions."
    }

    fn parameters_schema(&self) -> Value {
        schema("including its edit history")
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(e) = ctx.check_read(&params.file_path) {
            return e.into();
        }

        match ctx
            .files
            .read_history(&params.file_path, params.offset, params.limit)
        {
            Ok(text) => ToolResult::success(text),
            Err(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{PermissionScope, Workspace};

    fn ctx() -> ToolContext {
        let mut files = Workspace::new();
        files.write("docs/a.txt", "line1\nline2\nline3");
        files.write("secret/b.txt", "hidden");
        ToolContext::default().with_files(files)
    }

    #[tokio::test]
    async fn test_read_with_offset_and_limit() {
        let result = ReadFileTool
            .execute(
                json!({"file_path": "docs/a.txt", "offset": 1, "limit": 1}),
                &ctx(),
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(result.output, "     2\tline2");
        assert!(result.patch.is_empty());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let result = ReadFileTool
            .execute(json!({"file_path": "nope.txt"}), &ctx())
            .await;
        assert_eq!(result.error_code().as_deref(), Some("not_found"));
    }

    #[tokio::test]
    async fn test_read_outside_scope_is_denied() {
        let scoped = ctx().with_scope(PermissionScope::new("r", vec!["docs".into()], vec![]));
        let result = ReadFileTool
            .execute(json!({"file_path": "secret/b.txt"}), &scoped)
            .await;
        assert_eq!(result.error_code().as_deref(), Some("permission_denied"));
    }

    #[tokio::test]
    async fn test_read_history_includes_commit_message() {
        let mut context = ctx();
        context
            .files
            .edit_with_commit("docs/a.txt", "shorten", "line1")
            .unwrap();
        let result = ReadFileWithHistoryTool
            .execute(json!({"file_path": "docs/a.txt", "offset": 3}), &context)
            .await;
        assert_eq!(result.output, "     4\tshorten\n     5\tline1");
    }
}
