//! Role registry
//!
//! Resolves every role's tool allow-list against the global tool registry
//! once, when the agent is built. A role naming a tool that does not exist is
//! a configuration error, never a call-time surprise.

use std::collections::HashSet;
use std::sync::Arc;

use crate::agent::prompts::GENERAL_PURPOSE_DESCRIPTION;
use crate::agent::MAIN_AGENT;
use crate::error::ConfigError;
use crate::tools::registry::ToolRegistry;
use crate::workspace::{PermissionScope, ANY_PATH};

use super::types::SubAgentSpec;

/// Generic role with every global tool and no path restriction.
pub const GENERAL_PURPOSE: &str = "general-purpose";

/// A role with its tools resolved.
pub struct RoleEntry {
    pub spec: SubAgentSpec,
    pub tools: Arc<ToolRegistry>,
    pub scope: PermissionScope,
}

/// Registered roles in registration order, the generic role first.
pub struct SubAgentRegistry {
    roles: Vec<RoleEntry>,
}

impl SubAgentRegistry {
    /// Validate `specs` against `global` and add the generic role.
    ///
    /// `general_instructions` become the generic role's prompt.
    pub fn new(
        specs: Vec<SubAgentSpec>,
        global: &ToolRegistry,
        general_instructions: &str,
    ) -> Result<Self, ConfigError> {
        let general = SubAgentSpec::new(
            GENERAL_PURPOSE,
            GENERAL_PURPOSE_DESCRIPTION,
            general_instructions,
        )
        .with_permissions([ANY_PATH], [ANY_PATH]);

        let mut roles = vec![RoleEntry {
            scope: PermissionScope::unrestricted(GENERAL_PURPOSE),
            tools: Arc::new(global.snapshot()),
            spec: general,
        }];
        let mut seen: HashSet<String> = HashSet::new();

        for spec in specs {
            if spec.name == GENERAL_PURPOSE || spec.name == MAIN_AGENT {
                return Err(ConfigError::ReservedRole(spec.name));
            }
            if !seen.insert(spec.name.clone()) {
                return Err(ConfigError::DuplicateRole(spec.name));
            }

            let tools = match &spec.tools {
                Some(allowed) => global.subset(&spec.name, allowed)?,
                None => global.snapshot(),
            };
            tracing::debug!(role = %spec.name, tools = ?tools.names(), "Registered sub-agent role");

            roles.push(RoleEntry {
                scope: spec.scope(),
                tools: Arc::new(tools),
                spec,
            });
        }

        Ok(Self { roles })
    }

    pub fn get(&self, name: &str) -> Option<&RoleEntry> {
        self.roles.iter().find(|r| r.spec.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.spec.name.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleEntry> {
        self.roles.iter()
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// One `- name: description` line per role.
    pub fn describe(&self) -> String {
        self.roles
            .iter()
            .map(|r| format!("- {}: {}", r.spec.name, r.spec.description.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::implementations::{register_builtin_tools, READ_FILE, WRITE_FILE};

    fn global() -> ToolRegistry {
        let registry = ToolRegistry::new();
        register_builtin_tools(&registry);
        registry
    }

    #[test]
    fn test_roles_resolve_their_tools() {
        let registry = SubAgentRegistry::new(
            vec![SubAgentSpec::new("system_agent", "d", "i")
                .with_tools([READ_FILE, WRITE_FILE])
                .with_permissions(["architecture"], ["system"])],
            &global(),
            "general",
        )
        .unwrap();

        assert_eq!(registry.names(), vec![GENERAL_PURPOSE, "system_agent"]);
        let role = registry.get("system_agent").unwrap();
        assert_eq!(role.tools.names(), vec![READ_FILE, WRITE_FILE]);
        assert!(role.scope.can_read("architecture/a.md"));
        assert!(!role.scope.can_write("architecture/a.md"));

        let general = registry.get(GENERAL_PURPOSE).unwrap();
        assert_eq!(general.tools.len(), global().len());
        assert!(general.scope.can_write("anything/at/all"));
        assert_eq!(general.spec.instructions, "general");
    }

    #[test]
    fn test_unknown_tool_is_rejected() {
        let err = SubAgentRegistry::new(
            vec![SubAgentSpec::new("r", "d", "i").with_tools(["shell"])],
            &global(),
            "",
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::UnknownTool { ref role, ref tool } if role == "r" && tool == "shell"));
    }

    #[test]
    fn test_duplicate_and_reserved_names() {
        let dup = SubAgentRegistry::new(
            vec![
                SubAgentSpec::new("r", "d", "i"),
                SubAgentSpec::new("r", "d", "i"),
            ],
            &global(),
            "",
        );
        assert!(matches!(dup, Err(ConfigError::DuplicateRole(_))));

        let reserved = SubAgentRegistry::new(
            vec![SubAgentSpec::new(GENERAL_PURPOSE, "d", "i")],
            &global(),
            "",
        );
        assert!(matches!(reserved, Err(ConfigError::ReservedRole(_))));
    }

    #[test]
    fn test_describe_lists_roles() {
        let registry = SubAgentRegistry::new(
            vec![SubAgentSpec::new("architecture_agent", " Breaks systems down. ", "i")],
            &global(),
            "",
        )
        .unwrap();
        let text = registry.describe();
        assert!(text.starts_with("- general-purpose: "));
        assert!(text.ends_with("- architecture_agent: Breaks systems down."));
    }
}
