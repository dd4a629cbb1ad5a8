//! Drives one user input through a session's agent.

use std::{sync::Arc, time::Duration};

use {
    switchboard_agents::AgentEvent,
    switchboard_channels::ChatTransport,
    tokio::time::Instant,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{Result, aggregator::OutputAggregator, notices::Notices, registry::Session};

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The agent completed the input and produced chat output.
    Completed,
    /// The agent completed the input without any chat output.
    NoResponse,
    /// The agent's max run time elapsed first.
    TimedOut(Duration),
    /// Listening was aborted by shutdown.
    Cancelled,
}

/// Submits input to an agent and relays its events back to the chat.
///
/// Chat output goes through the [`OutputAggregator`]; system messages are
/// sent immediately with their level tag.
pub struct AgentEventBridge {
    transport: Arc<dyn ChatTransport>,
    aggregator: Arc<OutputAggregator>,
    notices: Arc<Notices>,
}

impl AgentEventBridge {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        aggregator: Arc<OutputAggregator>,
        notices: Arc<Notices>,
    ) -> Self {
        Self {
            transport,
            aggregator,
            notices,
        }
    }

    /// Run one turn on `session`. Turns on the same session are serialized.
    ///
    /// When the agent's max run time elapses, listening stops, any buffered
    /// output is flushed, and the timeout notice is sent. The agent itself
    /// is left running.
    pub async fn run_turn(
        &self,
        session: &Session,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let _turn = session.turn.lock().await;
        let key = &session.channel_key;
        let agent = &session.agent;
        let max_run_time = agent.max_run_time();
        let deadline = Instant::now() + max_run_time;

        let outcome = 'turn: {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break 'turn TurnOutcome::Cancelled,
                () = tokio::time::sleep_until(deadline) => break 'turn TurnOutcome::TimedOut(max_run_time),
                () = agent.wait_idle() => {},
            }

            let cursor = agent.cursor();
            let request_id = agent.submit(input).await?;
            let mut events = agent.subscribe(cursor);
            debug!(channel = %key, agent = agent.name(), %request_id, "input submitted");

            let mut produced_output = false;
            loop {
                let event = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break TurnOutcome::Cancelled,
                    () = tokio::time::sleep_until(deadline) => break TurnOutcome::TimedOut(max_run_time),
                    event = events.next() => event,
                };
                match event {
                    Some(AgentEvent::Chat(text)) => {
                        if !text.is_empty() {
                            produced_output = true;
                            self.aggregator.append(key, &text);
                        }
                    },
                    Some(AgentEvent::System { level, text }) => {
                        let message = self.notices.system(level, &text);
                        if let Err(e) = self.transport.send(key.as_str(), &message).await {
                            warn!(channel = %key, error = %e, "failed to send system message");
                        }
                    },
                    Some(AgentEvent::InputCompleted { request_id: done }) if done == request_id => {
                        break completion(produced_output);
                    },
                    Some(other) => {
                        debug!(channel = %key, event = ?other, "ignoring event for another input");
                    },
                    None => {
                        debug!(channel = %key, "agent event log closed");
                        break completion(produced_output);
                    },
                }
            }
        };

        self.aggregator.finish(key).await;

        match outcome {
            TurnOutcome::NoResponse => {
                self.send_notice(session, self.notices.no_response()).await;
            },
            TurnOutcome::TimedOut(max_run_time) => {
                warn!(channel = %key, ?max_run_time, "agent timed out");
                self.send_notice(session, &self.notices.timeout(max_run_time))
                    .await;
            },
            TurnOutcome::Cancelled => {
                info!(channel = %key, "turn cancelled");
            },
            TurnOutcome::Completed => {},
        }
        Ok(outcome)
    }

    async fn send_notice(&self, session: &Session, text: &str) {
        let key = &session.channel_key;
        if let Err(e) = self.transport.send(key.as_str(), text).await {
            warn!(channel = %key, error = %e, "failed to send notice");
        }
    }
}

fn completion(produced_output: bool) -> TurnOutcome {
    if produced_output {
        TurnOutcome::Completed
    } else {
        TurnOutcome::NoResponse
    }
}
