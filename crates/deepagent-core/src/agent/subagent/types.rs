//! Sub-agent types and data structures
//!
//! Role configuration, dispatch lifecycle, and dispatch results.

use serde::{Deserialize, Serialize};

use crate::agent::orchestrator::StopReason;
use crate::ai::model::ModelConfig;
use crate::workspace::{PermissionScope, Workspace};

/// Configuration of one sub-agent role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentSpec {
    pub name: String,
    /// Shown to the main agent when it picks a role.
    pub description: String,
    pub instructions: String,
    /// Tool allow-list; `None` grants every global tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Model override; connection settings fall back to the main model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub read_permissions: Vec<String>,
    #[serde(default)]
    pub write_permissions: Vec<String>,
}

impl SubAgentSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            tools: None,
            model: None,
            read_permissions: Vec::new(),
            write_permissions: Vec::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_permissions<R, W>(mut self, read: R, write: W) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        W: IntoIterator,
        W::Item: Into<String>,
    {
        self.read_permissions = read.into_iter().map(Into::into).collect();
        self.write_permissions = write.into_iter().map(Into::into).collect();
        self
    }

    pub fn scope(&self) -> PermissionScope {
        PermissionScope::new(
            self.name.clone(),
            self.read_permissions.clone(),
            self.write_permissions.clone(),
        )
    }

    /// Instructions with the permission block appended.
    pub fn system_prompt(&self) -> String {
        format!(
            "{}{}",
            self.instructions.trim_end(),
            self.scope().render_instructions()
        )
    }
}

/// Lifecycle of one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Idle,
    Running,
    Merging,
    Done,
    Failed,
}

impl DispatchPhase {
    pub fn can_transition(self, next: DispatchPhase) -> bool {
        use DispatchPhase::*;
        matches!(
            (self, next),
            (Idle, Running) | (Running, Merging) | (Running, Failed) | (Merging, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchPhase::Done | DispatchPhase::Failed)
    }
}

impl std::fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DispatchPhase::Idle => "idle",
            DispatchPhase::Running => "running",
            DispatchPhase::Merging => "merging",
            DispatchPhase::Done => "done",
            DispatchPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// What a finished sub-agent hands back to its parent.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub role: String,
    pub thread_id: String,
    /// Final answer, or the stop reason and last tool output when the run
    /// ended without one.
    pub response: String,
    /// The sub-agent's whole workspace, to merge into the parent.
    pub files: Workspace,
    pub iterations: usize,
    pub stop: StopReason,
}

impl DispatchOutcome {
    /// Whether the sub-agent ended with a final answer.
    pub fn answered(&self) -> bool {
        self.stop == StopReason::Answered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_from_toml() {
        let spec: SubAgentSpec = toml::from_str(
            r#"
            name = "system_agent"
            description = "Designs the system"
            instructions = "Write system docs."
            tools = ["read_file", "write_file"]
            read_permissions = ["architecture"]
            write_permissions = ["system"]
            "#,
        )
        .unwrap();
        assert_eq!(spec.tools.as_ref().unwrap().len(), 2);
        assert!(spec.model.is_none());
        assert!(spec.scope().can_write("system/a.md"));
        assert!(!spec.scope().can_write("architecture/a.md"));
    }

    #[test]
    fn test_system_prompt_carries_permissions() {
        let spec = SubAgentSpec::new("r", "d", "Do the thing.\n")
            .with_permissions(["requirement"], ["architecture"]);
        let prompt = spec.system_prompt();
        assert!(prompt.starts_with("Do the thing.\n\n"));
        assert!(prompt.contains("requirement"));
        assert!(prompt.contains("architecture"));
    }

    #[test]
    fn test_phase_transitions() {
        use DispatchPhase::*;
        assert!(Idle.can_transition(Running));
        assert!(Running.can_transition(Failed));
        assert!(!Idle.can_transition(Done));
        assert!(!Done.can_transition(Running));
        assert!(Failed.is_terminal());
    }
}
