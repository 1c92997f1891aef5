//! AI provider layer
//!
//! The model-completion seam, an OpenAI-compatible streaming client, and a
//! scripted client for tests and dry runs.

pub mod model;
pub mod openai;
pub mod retry;
pub mod scripted;
pub mod sse;
pub mod types;

pub use model::{CompletionRequest, ModelClient, ModelConfig, StreamPart};
pub use openai::OpenAiClient;
pub use scripted::{ScriptedModel, ScriptedTurn};
