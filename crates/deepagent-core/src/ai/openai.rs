//! OpenAI-compatible chat/completions streaming client

use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::model::{CompletionRequest, ModelClient, StreamPart};
use super::retry::{is_retryable_status, with_retry, IsRetryable, RetryConfig};
use super::sse::{SseEvent, SseLineBuffer};
use super::types::{Content, FinishReason, ModelMessage, Role, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Error from a single HTTP attempt, carrying the status for retry decisions.
#[derive(Debug)]
struct HttpError {
    status: Option<u16>,
    message: String,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl IsRetryable for HttpError {
    fn is_retryable(&self) -> bool {
        match self.status {
            Some(status) => is_retryable_status(status),
            None => {
                self.message.contains("timeout")
                    || self.message.contains("connect")
                    || self.message.contains("network")
            }
        }
    }
}

/// Streams completions from any server speaking the OpenAI chat format.
pub struct OpenAiClient {
    http: reqwest::Client,
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    pub fn with_http(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn send(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
    ) -> Result<reqwest::Response, HttpError> {
        let mut request = self.http.post(url).json(body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| HttpError {
            status: None,
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(HttpError {
            status: Some(status.as_u16()),
            message,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>> {
        let base = request
            .config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{}/chat/completions", base.trim_end_matches('/'));
        let body = build_request_body(&request);
        let retry = RetryConfig::default().with_max_retries(request.config.max_retries);
        let api_key = request.config.api_key.clone();

        let call_start = Instant::now();
        let response = with_retry(&retry, || self.send(&url, api_key.as_deref(), &body))
            .await
            .map_err(|e| {
                error!(model = %request.config.model, "Completion request failed: {}", e);
                anyhow::anyhow!("completion request failed: {}", e)
            })?;
        info!(
            model = %request.config.model,
            "Completion stream opened in {:?}",
            call_start.elapsed()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let stream = response.bytes_stream();
        tokio::spawn(async move {
            tokio::pin!(stream);
            let mut lines = SseLineBuffer::new();
            let mut chunk_count: u64 = 0;

            'outer: while let Some(chunk) = stream.next().await {
                chunk_count += 1;
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("completion read error at chunk #{}: {}", chunk_count, e);
                        let _ = tx.send(StreamPart::Error {
                            error: format!("completion read error: {}", e),
                        });
                        return;
                    }
                };
                for event in lines.push(&bytes) {
                    match event {
                        SseEvent::Done => break 'outer,
                        SseEvent::Data(payload) => {
                            if !forward_payload(&payload, &tx) {
                                return;
                            }
                        }
                    }
                }
            }

            if let Some(SseEvent::Data(payload)) = lines.finish() {
                forward_payload(&payload, &tx);
            }
            debug!("completion stream ended after {} chunks", chunk_count);
        });

        Ok(rx)
    }
}

/// Returns false when the receiver is gone or the payload carried an error.
fn forward_payload(payload: &str, tx: &mpsc::UnboundedSender<StreamPart>) -> bool {
    let json: Value = match serde_json::from_str(payload) {
        Ok(json) => json,
        Err(e) => {
            debug!("skipping unparseable SSE payload: {}", e);
            return true;
        }
    };
    for part in parse_chunk(&json) {
        let is_error = matches!(part, StreamPart::Error { .. });
        if tx.send(part).is_err() || is_error {
            return false;
        }
    }
    true
}

/// Translate one chat.completion.chunk into stream parts.
pub(crate) fn parse_chunk(json: &Value) -> Vec<StreamPart> {
    let mut parts = Vec::new();

    if let Some(err) = json.get("error") {
        let message = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        parts.push(StreamPart::Error { error: message });
        return parts;
    }

    if let Some(choice) = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    {
        let delta = choice.get("delta").unwrap_or(&Value::Null);

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                parts.push(StreamPart::TextDelta {
                    delta: text.to_string(),
                });
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let function = call.get("function").unwrap_or(&Value::Null);
                parts.push(StreamPart::ToolCallDelta {
                    index: call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize,
                    id: non_empty_str(call.get("id")),
                    name: non_empty_str(function.get("name")),
                    arguments: function
                        .get("arguments")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                });
            }
        }

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            parts.push(StreamPart::Finish {
                reason: FinishReason::parse(reason),
            });
        }
    }

    if let Some(usage) = json.get("usage").filter(|u| u.is_object()) {
        let prompt = usage
            .get("prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        let completion = usage
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize;
        parts.push(StreamPart::Usage {
            usage: Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            },
        });
    }

    parts
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn build_request_body(request: &CompletionRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if !request.system_prompt.is_empty() {
        messages.push(json!({"role": "system", "content": request.system_prompt}));
    }
    for message in &request.messages {
        messages.extend(convert_message(message));
    }

    let mut body = json!({
        "model": request.config.model,
        "messages": messages,
        "temperature": request.config.temperature,
        "stream": true,
        "stream_options": {"include_usage": true},
    });

    if let Some(max_tokens) = request.config.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(
            request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect(),
        );
    }

    body
}

fn convert_message(message: &ModelMessage) -> Vec<Value> {
    match message.role {
        Role::System => vec![json!({"role": "system", "content": message.text()})],
        Role::User => vec![json!({"role": "user", "content": message.text()})],
        Role::Assistant => {
            let text = message.text();
            let tool_calls: Vec<Value> = message
                .tool_calls()
                .map(|(id, name, input)| {
                    let arguments = match input {
                        Value::String(raw) => raw.clone(),
                        other => other.to_string(),
                    };
                    json!({
                        "id": id,
                        "type": "function",
                        "function": {"name": name, "arguments": arguments}
                    })
                })
                .collect();
            let mut msg = json!({"role": "assistant"});
            msg["content"] = if text.is_empty() {
                Value::Null
            } else {
                Value::String(text)
            };
            if !tool_calls.is_empty() {
                msg["tool_calls"] = Value::Array(tool_calls);
            }
            vec![msg]
        }
        Role::Tool => message
            .content
            .iter()
            .filter_map(|c| match c {
                Content::ToolResult {
                    tool_use_id,
                    output,
                    ..
                } => Some(json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": match output {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    },
                })),
                _ => None,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::model::ModelConfig;
    use crate::ai::types::AiTool;

    #[test]
    fn test_parse_text_and_finish() {
        let parts = parse_chunk(&json!({
            "choices": [{"delta": {"content": "Hi"}, "finish_reason": "stop"}]
        }));
        assert_eq!(
            parts,
            vec![
                StreamPart::TextDelta { delta: "Hi".into() },
                StreamPart::Finish {
                    reason: FinishReason::Stop
                }
            ]
        );
    }

    #[test]
    fn test_parse_tool_call_fragments() {
        let first = parse_chunk(&json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 1, "id": "call_a", "function": {"name": "write_file", "arguments": ""}}
            ]}}]
        }));
        let second = parse_chunk(&json!({
            "choices": [{"delta": {"tool_calls": [
                {"index": 1, "function": {"arguments": "{\"file_path\":"}}
            ]}}]
        }));
        assert_eq!(
            first,
            vec![StreamPart::ToolCallDelta {
                index: 1,
                id: Some("call_a".into()),
                name: Some("write_file".into()),
                arguments: String::new(),
            }]
        );
        assert_eq!(
            second,
            vec![StreamPart::ToolCallDelta {
                index: 1,
                id: None,
                name: None,
                arguments: "{\"file_path\":".into(),
            }]
        );
    }

    #[test]
    fn test_parse_usage_and_error() {
        let usage = parse_chunk(&json!({
            "choices": [],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }));
        assert_eq!(
            usage,
            vec![StreamPart::Usage {
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15
                }
            }]
        );

        let err = parse_chunk(&json!({"error": {"message": "quota exceeded"}}));
        assert_eq!(
            err,
            vec![StreamPart::Error {
                error: "quota exceeded".into()
            }]
        );
    }

    #[test]
    fn test_request_body_shape() {
        let mut assistant = ModelMessage::assistant("");
        assistant.content = vec![Content::ToolUse {
            id: "call_1".into(),
            name: "ls".into(),
            input: json!({"directory": ""}),
        }];
        let request = CompletionRequest {
            config: ModelConfig::default(),
            system_prompt: "be brief".into(),
            messages: vec![
                ModelMessage::user("hello"),
                assistant,
                ModelMessage::tool_result("call_1", "[]", false),
            ],
            tools: vec![AiTool {
                name: "ls".into(),
                description: "list".into(),
                input_schema: json!({"type": "object"}),
            }],
        };

        let body = build_request_body(&request);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            "{\"directory\":\"\"}"
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
        assert_eq!(body["tools"][0]["function"]["name"], "ls");
        assert_eq!(body["model"], "qwen-max");
        assert_eq!(body["stream"], true);
    }
}
