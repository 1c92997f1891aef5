//! List tool - first-level directory listing of the workspace

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};

pub const LIST_FILES: &str = "list_files";

pub struct ListFilesTool;

#[derive(Deserialize, Default)]
struct Params {
    #[serde(default, alias = "file_dir")]
    directory: String,
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        LIST_FILES
    }

    fn description(&self) -> &str {
        "List workspace files. Only one directory level is recognized: pass \"\" for every file, \"root\" for files without a directory, or a first-level directory name such as \"requirement\"."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "\"\" (all files), \"root\", or a first-level directory name",
                    "default": ""
                }
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = if params.is_null() {
            Params::default()
        } else {
            match parse_params::<Params>(params) {
                Ok(p) => p,
                Err(e) => return e,
            }
        };

        let paths: Vec<String> = ctx
            .files
            .list(&params.directory)
            .into_iter()
            .filter(|p| ctx.can_read(p))
            .collect();

        ToolResult::success(Value::from(paths).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::{PermissionScope, Workspace};

    fn ctx() -> ToolContext {
        let mut files = Workspace::new();
        files.write("docs/a.txt", "a");
        files.write("other/b.txt", "b");
        files.write("top.md", "t");
        ToolContext::default().with_files(files)
    }

    fn listed(result: &ToolResult) -> Vec<String> {
        serde_json::from_str(&result.output).unwrap()
    }

    #[tokio::test]
    async fn test_list_directory() {
        let result = ListFilesTool
            .execute(json!({"directory": "docs"}), &ctx())
            .await;
        assert_eq!(listed(&result), vec!["docs/a.txt"]);
    }

    #[tokio::test]
    async fn test_list_defaults_to_everything() {
        let result = ListFilesTool.execute(json!({}), &ctx()).await;
        assert_eq!(listed(&result).len(), 3);
        let result = ListFilesTool.execute(Value::Null, &ctx()).await;
        assert_eq!(listed(&result).len(), 3);
    }

    #[tokio::test]
    async fn test_list_hides_unreadable_paths() {
        let scoped = ctx().with_scope(PermissionScope::new(
            "r",
            vec!["docs".into(), "root".into()],
            vec![],
        ));
        let result = ListFilesTool.execute(json!({"directory": ""}), &scoped).await;
        assert_eq!(listed(&result), vec!["docs/a.txt", "top.md"]);
    }
}
