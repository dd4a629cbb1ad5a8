//! Agent sessions as seen by the bridge: an input queue of one, an
//! execution state, and an append-only event log read through cursors.

pub mod agent;
pub mod error;
pub mod event;
pub mod factory;
pub mod log;
pub mod process;

pub use {
    agent::{Agent, AgentFactory},
    error::{Error, Result},
    event::{AgentEvent, ExecutionState, RequestId, SystemLevel},
    factory::ConfiguredAgents,
    log::{EventCursor, EventLog, EventSubscription},
    process::ProcessAgent,
};
