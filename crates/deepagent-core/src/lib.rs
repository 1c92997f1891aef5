//! deepagent core library
//!
//! A main agent that plans with a TODO list, works on a shared in-memory
//! workspace, and delegates self-contained work to permission-scoped
//! sub-agent roles through the `task` tool.

pub mod agent;
pub mod ai;
pub mod config;
pub mod deep_agent;
pub mod error;
pub mod paths;
pub mod relay;
pub mod state;
pub mod tools;
pub mod workspace;

pub use config::AppConfig;
pub use deep_agent::{DeepAgent, DeepAgentBuilder};
pub use error::{AgentError, ConfigError, WorkspaceError};
pub use relay::{RelayConfig, RelayOutput, StreamRelay};
pub use state::{ConversationState, Todo, TodoStatus};
pub use workspace::{PermissionScope, Workspace};
