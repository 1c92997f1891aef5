//! Model-completion seam
//!
//! The reasoning loop only sees `ModelClient::complete`, which returns a
//! channel of `StreamPart`s for one assistant turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::types::{AiTool, FinishReason, ModelMessage, Usage};

pub const DEFAULT_MODEL: &str = "qwen-max";
pub const DEFAULT_PROVIDER: &str = "openai";
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Per-agent model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_retries: DEFAULT_MAX_RETRIES,
            max_tokens: None,
            base_url: None,
            api_key: None,
        }
    }
}

impl ModelConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Fill unset connection fields from `fallback`.
    pub fn inherit(mut self, fallback: &ModelConfig) -> Self {
        if self.base_url.is_none() {
            self.base_url = fallback.base_url.clone();
        }
        if self.api_key.is_none() {
            self.api_key = fallback.api_key.clone();
        }
        self
    }
}

/// One streamed fragment of an assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    /// Incremental text.
    TextDelta { delta: String },
    /// Fragment of a tool call, keyed by a stable per-call index.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// The model finished this turn.
    Finish { reason: FinishReason },
    Usage { usage: Usage },
    /// Provider-side failure; the turn cannot complete.
    Error { error: String },
}

/// Everything the model needs for one turn.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub config: ModelConfig,
    pub system_prompt: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<AiTool>,
}

/// Streaming chat-completion capability.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Start one assistant turn. Errors here mean the request never started.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<StreamPart>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_defaults_and_inherit() {
        let base = ModelConfig {
            base_url: Some("http://localhost:8000/v1".into()),
            api_key: Some("k".into()),
            ..Default::default()
        };
        let role: ModelConfig = toml::from_str("model = \"qwen-plus\"").unwrap();
        assert_eq!(role.temperature, 0.0);
        assert_eq!(role.provider, "openai");

        let merged = role.inherit(&base);
        assert_eq!(merged.model, "qwen-plus");
        assert_eq!(merged.base_url.as_deref(), Some("http://localhost:8000/v1"));
        assert_eq!(merged.api_key.as_deref(), Some("k"));
    }
}
