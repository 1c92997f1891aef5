//! Application configuration
//!
//! Loaded from TOML (`~/.deepagent/config.toml` unless a path is given),
//! then overridden from the environment. Every section is optional; an
//! absent file yields the built-in document-pipeline roles.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::event_bus::DEFAULT_EVENT_CAPACITY;
use crate::agent::executor::DEFAULT_MAX_TOOL_OUTPUT_CHARS;
use crate::agent::orchestrator::{LoopLimits, DEFAULT_MAX_ITERATIONS};
use crate::agent::prompts;
use crate::agent::subagent::SubAgentSpec;
use crate::ai::model::ModelConfig;
use crate::error::ConfigError;
use crate::paths;
use crate::relay::RelayConfig;
use crate::tools::implementations::{
    DisabledDocumentSearch, DocumentSearch, HttpDocumentSearch, DOCUMENT_SEARCH,
    EDIT_FILE_WITH_COMMIT, LIST_FILES, READ_FILE_WITH_HISTORY, WRITE_FILE,
};

pub const ENV_API_KEY: &str = "DEEPAGENT_API_KEY";
pub const ENV_BASE_URL: &str = "DEEPAGENT_BASE_URL";
pub const ENV_MODEL: &str = "DEEPAGENT_MODEL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Main-agent model; roles inherit its connection settings.
    pub model: ModelConfig,
    /// Main-agent instructions.
    pub instructions: String,
    pub limits: LimitsConfig,
    pub relay: RelayConfig,
    pub subagents: Vec<SubAgentSpec>,
    pub search: Option<SearchConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            instructions: prompts::MAIN_INSTRUCTIONS.to_string(),
            limits: LimitsConfig::default(),
            relay: RelayConfig::default(),
            subagents: default_subagents(),
            search: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_iterations: usize,
    pub subagent_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub event_capacity: usize,
    pub max_tool_output_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            subagent_timeout_secs: 600,
            tool_timeout_secs: 120,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_tool_output_chars: DEFAULT_MAX_TOOL_OUTPUT_CHARS,
        }
    }
}

impl LimitsConfig {
    pub fn loop_limits(&self) -> LoopLimits {
        LoopLimits {
            max_iterations: self.max_iterations.max(1),
            max_tool_output_chars: self.max_tool_output_chars,
            ..Default::default()
        }
    }

    pub fn subagent_timeout(&self) -> Duration {
        Duration::from_secs(self.subagent_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

/// External document-search service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl AppConfig {
    /// Load from `path`, or from the default location.
    ///
    /// An explicit path must exist; a missing default file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (paths::config_path(), false),
        };

        let mut config = if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        } else {
            Self::from_file(&path)?
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&raw, path)
    }

    fn from_toml(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.model.base_url = Some(url);
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.model.model = model;
        }
    }

    /// Search backend for the document search tool.
    pub fn search_backend(&self) -> Arc<dyn DocumentSearch> {
        match &self.search {
            Some(search) => Arc::new(HttpDocumentSearch::new(
                search.endpoint.clone(),
                search.token.clone(),
            )),
            None => Arc::new(DisabledDocumentSearch),
        }
    }

    /// Where this config would be saved by default.
    pub fn default_path() -> PathBuf {
        paths::config_path()
    }
}

/// The requirement → architecture → system pipeline roles.
pub fn default_subagents() -> Vec<SubAgentSpec> {
    let editing = [READ_FILE_WITH_HISTORY, WRITE_FILE, EDIT_FILE_WITH_COMMIT, LIST_FILES];
    vec![
        SubAgentSpec::new(
            prompts::REQUIREMENT_DOC_AGENT,
            prompts::REQUIREMENT_DOC_DESCRIPTION,
            prompts::REQUIREMENT_DOC_INSTRUCTIONS,
        )
        .with_tools(std::iter::once(DOCUMENT_SEARCH).chain(editing))
        .with_permissions(["requirement"], ["requirement"]),
        SubAgentSpec::new(
            prompts::REQUIREMENT_CODE_AGENT,
            prompts::REQUIREMENT_CODE_DESCRIPTION,
            prompts::REQUIREMENT_CODE_INSTRUCTIONS,
        )
        .with_tools(editing)
        .with_permissions(["requirement"], ["requirement"]),
        SubAgentSpec::new(
            prompts::ARCHITECTURE_AGENT,
            prompts::ARCHITECTURE_DESCRIPTION,
            prompts::ARCHITECTURE_INSTRUCTIONS,
        )
        .with_tools(editing)
        .with_permissions(["requirement", "architecture"], ["architecture"]),
        SubAgentSpec::new(
            prompts::SYSTEM_AGENT,
            prompts::SYSTEM_DESCRIPTION,
            prompts::SYSTEM_INSTRUCTIONS,
        )
        .with_tools(editing)
        .with_permissions(["architecture", "system"], ["system"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_carry_pipeline_roles() {
        let config = AppConfig::default();
        let names: Vec<&str> = config.subagents.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "requirement_doc_agent",
                "requirement_code_agent",
                "architecture_agent",
                "system_agent"
            ]
        );
        let doc = &config.subagents[0];
        assert!(doc.tools.as_ref().unwrap().contains(&DOCUMENT_SEARCH.to_string()));
        assert!(!config.subagents[1]
            .tools
            .as_ref()
            .unwrap()
            .contains(&DOCUMENT_SEARCH.to_string()));
        assert_eq!(config.subagents[3].read_permissions, vec!["architecture", "system"]);
        assert_eq!(config.limits.max_iterations, 50);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
instructions = "Coordinate."

[model]
model = "qwen-plus"
base_url = "http://localhost:8000/v1"

[limits]
max_iterations = 10

[relay]
show_files = false

[search]
endpoint = "http://search.local/chat"

[[subagents]]
name = "writer"
description = "Writes docs"
instructions = "Write."
tools = ["write_file"]
write_permissions = ["docs"]
"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.instructions, "Coordinate.");
        assert_eq!(config.model.model, "qwen-plus");
        assert_eq!(config.model.temperature, 0.0);
        assert_eq!(config.limits.max_iterations, 10);
        assert_eq!(config.limits.subagent_timeout_secs, 600);
        assert!(!config.relay.show_files);
        assert_eq!(config.subagents.len(), 1);
        assert_eq!(config.subagents[0].write_permissions, vec!["docs"]);
        assert_eq!(config.search.unwrap().endpoint, "http://search.local/chat");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = AppConfig::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_iterations = \"many\"").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "sk-test"),
            (ENV_MODEL, "qwen-turbo"),
            (ENV_BASE_URL, "  "),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.model.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model.model, "qwen-turbo");
        assert_eq!(config.model.base_url, None);
    }

    #[test]
    fn test_limits_convert() {
        let limits = LimitsConfig {
            max_iterations: 0,
            ..Default::default()
        };
        assert_eq!(limits.loop_limits().max_iterations, 1);
        assert_eq!(limits.subagent_timeout(), Duration::from_secs(600));
    }
}
