//! Agent system
//!
//! ## Reasoning loop
//! - `AgentLoop` - Model/tool cycle shared by the main agent and every role
//! - `LoopEvent` - Event protocol between loops and consumers
//! - `event_channel` - Bounded, non-blocking event delivery
//!
//! ## Sub-agents
//! - `SubAgentRegistry` - Roles with their tools resolved at build time
//! - `Dispatcher` - Runs a role for one `task` call and hands back its state
//!
//! ## Persistence
//! - `CheckpointStore` - Per-thread state snapshots

pub mod checkpoint;
pub mod event_bus;
pub mod executor;
pub mod failure;
pub mod loop_events;
pub mod orchestrator;
pub mod prompts;
mod stream;
pub mod subagent;

/// Agent name of the top-level loop.
pub const MAIN_AGENT: &str = "main";

pub use checkpoint::{CheckpointStore, MemoryCheckpointStore};
pub use event_bus::{event_channel, EventReceiver, EventSender, DEFAULT_EVENT_CAPACITY};
pub use loop_events::LoopEvent;
pub use orchestrator::{AgentLoop, LoopLimits, LoopRun, StopReason};
pub use subagent::{
    DispatchOutcome, DispatchPhase, DispatchRequest, Dispatcher, SubAgentRegistry, SubAgentSpec,
    GENERAL_PURPOSE,
};
