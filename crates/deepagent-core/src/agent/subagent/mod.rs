//! Sub-agents: role registry, dispatch, and their types

pub mod dispatcher;
pub mod registry;
pub mod types;

pub use dispatcher::{subagent_thread_id, DispatchRequest, Dispatcher, DEFAULT_SUBAGENT_TIMEOUT};
pub use registry::{RoleEntry, SubAgentRegistry, GENERAL_PURPOSE};
pub use types::{DispatchOutcome, DispatchPhase, SubAgentSpec};
