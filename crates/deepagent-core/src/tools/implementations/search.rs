//! Document search tool - query an external knowledge service and keep the
//! answer in the workspace

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::ai::sse::{SseEvent, SseLineBuffer};
use crate::error::AgentError;
use crate::state::StatePatch;
use crate::tools::registry::Tool;
use crate::tools::{parse_params, ToolContext, ToolResult};
use crate::workspace::Workspace;

pub const DOCUMENT_SEARCH: &str = "document_search";

/// Directory search answers are saved under.
pub const SEARCH_DIR: &str = "search";

const MAX_QUERY_SLUG_CHARS: usize = 80;

/// Question in, answer text out.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<String>;
}

/// Search service reached over HTTP, answering with an SSE stream whose
/// `data:` lines carry JSON objects with a `content` fragment.
pub struct HttpDocumentSearch {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpDocumentSearch {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token,
        }
    }
}

#[async_trait]
impl DocumentSearch for HttpDocumentSearch {
    async fn search(&self, query: &str) -> anyhow::Result<String> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&json!({"question": query, "stream": true}));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("search service returned {}: {}", status, body);
        }

        let mut stream = response.bytes_stream();
        let mut lines = SseLineBuffer::new();
        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            for event in lines.push(&chunk?) {
                match event {
                    SseEvent::Data(payload) => append_content(&payload, &mut answer),
                    SseEvent::Done => return Ok(answer),
                }
            }
        }
        if let Some(SseEvent::Data(payload)) = lines.finish() {
            append_content(&payload, &mut answer);
        }
        Ok(answer)
    }
}

fn append_content(payload: &str, answer: &mut String) {
    match serde_json::from_str::<Value>(payload) {
        Ok(json) => {
            let fragment = json
                .get("content")
                .or_else(|| json.get("data").and_then(|d| d.get("content")))
                .and_then(Value::as_str);
            if let Some(fragment) = fragment {
                answer.push_str(fragment);
            }
        }
        Err(_) => warn!("search stream sent a non-JSON data line"),
    }
}

/// Backend used when no search service is configured.
pub struct DisabledDocumentSearch;

#[async_trait]
impl DocumentSearch for DisabledDocumentSearch {
    async fn search(&self, _query: &str) -> anyhow::Result<String> {
        anyhow::bail!("document search is not configured")
    }
}

/// Drop a reasoning preamble that ends with `</think>`.
pub fn strip_reasoning(raw: &str) -> &str {
    match raw.rfind("</think>") {
        Some(pos) => raw[pos + "</think>".len()..].trim(),
        None => raw.trim(),
    }
}

/// Workspace path an answer to `query` is stored at.
pub fn search_result_path(query: &str) -> String {
    let slug: String = query
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_whitespace() || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .take(MAX_QUERY_SLUG_CHARS)
        .collect();
    let slug = if slug.is_empty() { "query".to_string() } else { slug };
    format!("{}/{}.txt", SEARCH_DIR, slug)
}

pub struct DocumentSearchTool {
    backend: Arc<dyn DocumentSearch>,
}

impl DocumentSearchTool {
    pub fn new(backend: Arc<dyn DocumentSearch>) -> Self {
        Self { backend }
    }
}

#[derive(Deserialize)]
struct Params {
    query: String,
}

#[async_trait]
impl Tool for DocumentSearchTool {
    fn name(&self) -> &str {
        DOCUMENT_SEARCH
    }

    fn description(&self) -> &str {
        "Search the literature knowledge base with a natural-language question. The answer is returned and also saved to the workspace under search/ so other agents can read it."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Question to research"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> ToolResult {
        let params = match parse_params::<Params>(params) {
            Ok(p) => p,
            Err(e) => return e,
        };

        info!(agent = %ctx.agent, query = %params.query, "Document search started");
        let raw = match self.backend.search(&params.query).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(agent = %ctx.agent, "Document search failed: {}", e);
                return AgentError::UpstreamFailure(e.to_string()).into();
            }
        };

        let answer = strip_reasoning(&raw).to_string();
        let path = search_result_path(&params.query);
        // Search results are system artifacts and skip the role's write scope.
        let mut files = Workspace::new();
        files.write(path.clone(), answer.clone());

        ToolResult::success_data(json!({
            "answer": answer,
            "file_path": path,
        }))
        .with_patch(StatePatch::files(files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::PermissionScope;

    struct Canned(Result<&'static str, &'static str>);

    #[async_trait]
    impl DocumentSearch for Canned {
        async fn search(&self, _query: &str) -> anyhow::Result<String> {
            match self.0 {
                Ok(answer) => Ok(answer.to_string()),
                Err(e) => Err(anyhow::anyhow!(e)),
            }
        }
    }

    #[test]
    fn test_strip_reasoning() {
        assert_eq!(strip_reasoning("<think>hmm</think>\n Answer "), "Answer");
        assert_eq!(strip_reasoning("plain"), "plain");
    }

    #[test]
    fn test_search_result_path_is_flat() {
        assert_eq!(
            search_result_path("rail signalling / safety"),
            "search/rail_signalling___safety.txt"
        );
        assert_eq!(search_result_path("  "), "search/query.txt");
    }

    #[test]
    fn test_append_content_shapes() {
        let mut answer = String::new();
        append_content(r#"{"content":"A"}"#, &mut answer);
        append_content(r#"{"data":{"content":"B"}}"#, &mut answer);
        append_content("not json", &mut answer);
        assert_eq!(answer, "AB");
    }

    #[tokio::test]
    async fn test_search_saves_answer_despite_scope() {
        let tool = DocumentSearchTool::new(Arc::new(Canned(Ok("<think>x</think>Found it"))));
        let ctx = ToolContext::default().with_scope(PermissionScope::new(
            "requirement_doc_agent",
            vec!["requirement".into()],
            vec!["requirement".into()],
        ));
        let result = tool.execute(json!({"query": "train control"}), &ctx).await;
        assert!(!result.is_error);
        let files = result.patch.files.unwrap();
        assert_eq!(
            files.get("search/train_control.txt").unwrap().current(),
            "Found it"
        );
    }

    #[tokio::test]
    async fn test_search_failure_is_upstream_error() {
        let tool = DocumentSearchTool::new(Arc::new(Canned(Err("connection refused"))));
        let result = tool
            .execute(json!({"query": "q"}), &ToolContext::default())
            .await;
        assert_eq!(result.error_code().as_deref(), Some("upstream_failure"));
        assert!(result.patch.is_empty());

        let disabled = DocumentSearchTool::new(Arc::new(DisabledDocumentSearch));
        let result = disabled
            .execute(json!({"query": "q"}), &ToolContext::default())
            .await;
        assert!(result.output.contains("not configured"));
    }
}
