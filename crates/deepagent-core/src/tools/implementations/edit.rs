//! Edit tools - exact substring replacement, or commit-message rewrites
//!
//! Both append to the file's history rather than overwriting it.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use similar::TextDiff;

use crate::state::StatePatch;
use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};

pub const EDIT_FILE: &str = "edit_file";
pub const EDIT_FILE_WITH_COMMIT: &str = "edit_file_with_commit";

pub struct EditFileTool;

pub struct EditFileWithCommitTool;

#[derive(Deserialize)]
struct EditParams {
    file_path: String,
    old_string: String,
    new_string: String,
    #[serde(default)]
    replace_all: bool,
}

#[derive(Deserialize)]
struct CommitParams {
    file_path: String,
    commit_message: String,
    new_content: String,
}

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &str {
        EDIT_FILE
    }

    fn description(&self) -> &str {
        "Replace an exact string in a workspace file. old_string must occur exactly once unless replace_all is true. The edited content is appended to the file's history."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Workspace path of the file to modify"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The text to replace it with"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)",
                    "default": false
                }
            },
            "required": ["file_path", "old_string", "new_string"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<EditParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(e) = ctx.check_write(&params.file_path) {
            return e.into();
        }

        let mut files = ctx.files.select([params.file_path.as_str()]);
        let before = files
            .get(&params.file_path)
            .map(|f| f.current().to_string())
            .unwrap_or_default();

        let outcome = match files.edit(
            &params.file_path,
            &params.old_string,
            &params.new_string,
            params.replace_all,
        ) {
            Ok(outcome) => outcome,
            Err(e) => return e.into(),
        };

        let after = files
            .get(&params.file_path)
            .map(|f| f.current().to_string())
            .unwrap_or_default();
        let diff = compact_diff(&before, &after, &params.file_path);

        let message = if params.replace_all {
            format!(
                "Successfully replaced {} instance(s) of the string in '{}'",
                outcome.replacements, params.file_path
            )
        } else {
            format!("Successfully replaced string in '{}'", params.file_path)
        };

        ToolResult::success_data_with(
            json!({
                "message": message,
                "replacements": outcome.replacements,
                "file_path": params.file_path,
                "versions": files.history_len(&params.file_path),
            }),
            Some(diff),
        )
        .with_patch(StatePatch::files(files))
    }
}

#[async_trait]
impl Tool for EditFileWithCommitTool {
    fn name(&self) -> &str {
        EDIT_FILE_WITH_COMMIT
    }

    fn description(&self) -> &str {
        "Rewrite a workspace file in full, recording a commit message that explains the change. The message and the new content are both appended to the file's history, which read_file_with_history shows."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Workspace path of an existing file"
                },
                "commit_message": {
                    "type": "string",
                    "description": "Why the file changed"
                },
                "new_content": {
                    "type": "string",
                    "description": "Complete new content of the file"
                }
            },
            "required": ["file_path", "commit_message", "new_content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<CommitParams>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };
        if let Err(e) = ctx.check_write(&params.file_path) {
            return e.into();
        }

        let mut files = ctx.files.select([params.file_path.as_str()]);
        if let Err(e) =
            files.edit_with_commit(&params.file_path, &params.commit_message, &params.new_content)
        {
            return e.into();
        }

        ToolResult::success_data(json!({
            "message": format!(
                "Updated file {} with commit message: {}",
                params.file_path, params.commit_message
            ),
            "file_path": params.file_path,
            "versions": files.history_len(&params.file_path),
        }))
        .with_patch(StatePatch::files(files))
    }
}

fn compact_diff(old: &str, new: &str, path: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();
    for hunk in diff.unified_diff().context_radius(2).iter_hunks() {
        output.push_str(&format!("{}", hunk));
    }
    if output.is_empty() {
        return String::new();
    }
    format!("--- {}\n+++ {}\n{}", path, path, output)
}
