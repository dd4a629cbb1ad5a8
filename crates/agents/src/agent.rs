use std::{sync::Arc, time::Duration};

use {async_trait::async_trait, switchboard_common::ChannelKey};

use crate::{
    Result,
    event::{ExecutionState, RequestId},
    log::{EventCursor, EventSubscription},
};

/// One long-lived agent worker bound to a channel.
///
/// The bridge never interleaves inputs: it waits for [`ExecutionState::Idle`],
/// captures a cursor, submits, then reads events from the cursor until the
/// matching `InputCompleted`.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Configured agent name, for logs.
    fn name(&self) -> &str;

    /// How long a listener waits for one input to complete.
    fn max_run_time(&self) -> Duration;

    fn state(&self) -> ExecutionState;

    /// Resolve once the agent is idle.
    async fn wait_idle(&self);

    /// Position just past the newest event.
    fn cursor(&self) -> EventCursor;

    fn subscribe(&self, from: EventCursor) -> EventSubscription;

    /// Queue `input` for processing and return its request id.
    async fn submit(&self, input: &str) -> Result<RequestId>;

    /// Stop any work in progress and release resources.
    async fn shutdown(&self);
}

/// Creates agents by configured name.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn create(&self, agent: &str, channel: &ChannelKey) -> Result<Arc<dyn Agent>>;
}
