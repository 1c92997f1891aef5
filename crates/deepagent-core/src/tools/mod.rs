//! Tools available to reasoning loops
//!
//! Provides the tool registry and all built-in tool implementations.

pub mod implementations;
pub mod registry;

pub use implementations::{register_builtin_tools, register_search_tool};
pub use registry::{parse_params, Tool, ToolContext, ToolRegistry, ToolResult};
