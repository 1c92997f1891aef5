//! Error taxonomy
//!
//! Workspace and dispatch errors are recovered locally: tools turn them into
//! structured error results that the reasoning loop reads and retries on.
//! Only configuration errors abort a build.

use thiserror::Error;

/// Failures of the mock filesystem and its permission checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    #[error("Error: File '{path}' not found")]
    NotFound { path: String },

    #[error("Error: String not found in file: '{needle}'")]
    StringNotFound { needle: String },

    #[error(
        "Error: String '{needle}' appears {count} times in file. Use replace_all=true to replace all instances, or provide a more specific string with surrounding context."
    )]
    AmbiguousMatch { needle: String, count: usize },

    #[error("Error: Line offset {offset} exceeds file length ({total} lines)")]
    OffsetOutOfRange { offset: usize, total: usize },

    #[error("Error: role '{role}' has no {access} permission for '{path}'")]
    PermissionDenied {
        role: String,
        path: String,
        access: Access,
    },
}

impl WorkspaceError {
    /// Stable machine-readable code used in tool error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::StringNotFound { .. } => "string_not_found",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::OffsetOutOfRange { .. } => "offset_out_of_range",
            Self::PermissionDenied { .. } => "permission_denied",
        }
    }
}

/// Kind of access a permission check was made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read => write!(f, "read"),
            Access::Write => write!(f, "write"),
        }
    }
}

/// Failures of a reasoning loop or a sub-agent dispatch.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Error: invoked agent of type {role}, the only allowed types are {}", format_roles(.valid))]
    UnknownSubagent { role: String, valid: Vec<String> },

    #[error("Upstream failure: {0}")]
    UpstreamFailure(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Sub-agent '{role}' timed out after {secs} seconds")]
    TimedOut { role: String, secs: u64 },
}

impl AgentError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownSubagent { .. } => "unknown_subagent",
            Self::UpstreamFailure(_) => "upstream_failure",
            Self::Cancelled => "cancelled",
            Self::TimedOut { .. } => "timeout",
        }
    }
}

fn format_roles(roles: &[String]) -> String {
    let quoted: Vec<String> = roles.iter().map(|r| format!("`{}`", r)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Invalid agent or role configuration, reported when the agent is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("role '{role}' allows unknown tool '{tool}'")]
    UnknownTool { role: String, tool: String },

    #[error("role '{0}' is registered more than once")]
    DuplicateRole(String),

    #[error("role name '{0}' is reserved")]
    ReservedRole(String),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_subagent_lists_valid_roles() {
        let err = AgentError::UnknownSubagent {
            role: "poet".to_string(),
            valid: vec!["general-purpose".to_string(), "system_agent".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("poet"));
        assert!(msg.contains("`general-purpose`"));
        assert!(msg.contains("`system_agent`"));
        assert_eq!(err.code(), "unknown_subagent");
    }

    #[test]
    fn test_ambiguous_match_reports_count() {
        let err = WorkspaceError::AmbiguousMatch {
            needle: "x".to_string(),
            count: 3,
        };
        assert!(err.to_string().contains("appears 3 times"));
        assert_eq!(err.code(), "ambiguous_match");
    }
}
