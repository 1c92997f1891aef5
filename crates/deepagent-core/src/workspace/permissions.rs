//! Per-role path-prefix permissions
//!
//! A scope is rendered into the role's instructions and checked by every
//! file tool before it touches the workspace.

use serde::{Deserialize, Serialize};

use crate::error::{Access, WorkspaceError};

use super::ROOT_DIR;

/// Prefix that admits every path.
pub const ANY_PATH: &str = "*";

/// Read and write allow-lists for one role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionScope {
    pub role: String,
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub write: Vec<String>,
}

impl PermissionScope {
    pub fn new(role: impl Into<String>, read: Vec<String>, write: Vec<String>) -> Self {
        Self {
            role: role.into(),
            read,
            write,
        }
    }

    /// Scope that admits everything (used for the generic role).
    pub fn unrestricted(role: impl Into<String>) -> Self {
        Self::new(role, vec![ANY_PATH.to_string()], vec![ANY_PATH.to_string()])
    }

    pub fn can_read(&self, path: &str) -> bool {
        self.read.iter().any(|p| prefix_admits(p, path))
    }

    pub fn can_write(&self, path: &str) -> bool {
        self.write.iter().any(|p| prefix_admits(p, path))
    }

    pub fn check(&self, path: &str, access: Access) -> Result<(), WorkspaceError> {
        let allowed = match access {
            Access::Read => self.can_read(path),
            Access::Write => self.can_write(path),
        };
        if allowed {
            Ok(())
        } else {
            Err(WorkspaceError::PermissionDenied {
                role: self.role.clone(),
                path: path.to_string(),
                access,
            })
        }
    }

    /// Instruction text appended to the role's prompt.
    pub fn render_instructions(&self) -> String {
        format!(
            "\n\n## Workspace permissions\n\n\
             You may read files under: {}\n\
             You may create or edit files under: {}\n\
             Paths are `<directory>/<name>`; `root` means top-level files without a directory. \
             Tool calls outside these directories are rejected.",
            render_list(&self.read),
            render_list(&self.write),
        )
    }
}

fn render_list(prefixes: &[String]) -> String {
    if prefixes.is_empty() {
        return "(none)".to_string();
    }
    prefixes
        .iter()
        .map(|p| format!("`{}`", p))
        .collect::<Vec<_>>()
        .join(", ")
}

fn prefix_admits(prefix: &str, path: &str) -> bool {
    if prefix == ANY_PATH {
        return true;
    }
    if prefix == ROOT_DIR {
        return !path.contains('/');
    }
    let prefix = prefix.trim_end_matches('/');
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}
