//! Composition root wiring transport, routing, sessions and output pacing.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    switchboard_agents::AgentFactory,
    switchboard_channels::{ChatTransport, InboundMessage, InboundReceiver},
    switchboard_common::ChannelKey,
    switchboard_config::SwitchboardConfig,
    tokio::task::JoinSet,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    Error, Result,
    aggregator::OutputAggregator,
    channel::CommunicationChannel,
    correlator::ReplyCorrelator,
    notices::Notices,
    registry::SessionRegistry,
    routes::Routes,
    turn::AgentEventBridge,
};

/// Owns every piece of process-wide state: routes, the reply correlator,
/// the session registry and the output aggregator.
pub struct Switchboard {
    routes: Routes,
    transport: Arc<dyn ChatTransport>,
    correlator: Arc<ReplyCorrelator>,
    registry: SessionRegistry,
    aggregator: Arc<OutputAggregator>,
    bridge: AgentEventBridge,
    notices: Arc<Notices>,
    cancel: CancellationToken,
    channel_seq: AtomicU64,
}

impl Switchboard {
    /// Build the engine and start the flush scheduler.
    pub fn new(
        config: &SwitchboardConfig,
        transport: Arc<dyn ChatTransport>,
        factory: Arc<dyn AgentFactory>,
    ) -> Self {
        let notices = Arc::new(Notices::new(config.notices.clone()));
        let aggregator = Arc::new(OutputAggregator::start(
            Arc::clone(&transport),
            config.output.clone(),
        ));
        let bridge = AgentEventBridge::new(
            Arc::clone(&transport),
            Arc::clone(&aggregator),
            Arc::clone(&notices),
        );
        Self {
            routes: Routes::new(&config.channels),
            transport,
            correlator: Arc::new(ReplyCorrelator::new()),
            registry: SessionRegistry::new(factory),
            aggregator,
            bridge,
            notices,
            cancel: CancellationToken::new(),
            channel_seq: AtomicU64::new(0),
        }
    }

    pub fn routes(&self) -> &Routes {
        &self.routes
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Send the startup announcement to every channel bound to a chat.
    /// Returns the number of chats reached.
    pub async fn announce(&self) -> usize {
        let Some(text) = self.notices.announcement() else {
            return 0;
        };
        let mut reached = 0;
        for (route, chat_id) in self.routes.bound() {
            match self.transport.send(chat_id, text).await {
                Ok(_) => reached += 1,
                Err(e) => {
                    warn!(channel = %route.name, chat_id, error = %e, "failed to send announcement");
                },
            }
        }
        info!(reached, "startup announcement sent");
        reached
    }

    /// Open a channel to the chat bound to the configured channel `name`.
    ///
    /// Fails with [`Error::UnknownChannel`] when no such channel exists or
    /// it has no `chat_id`.
    pub fn open_channel(&self, name: &str) -> Result<CommunicationChannel> {
        let chat_id = self
            .routes
            .named(name)
            .and_then(|route| route.chat_id.clone())
            .ok_or_else(|| Error::unknown_channel(name))?;
        let seq = self.channel_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let key = ChannelKey::from(format!("{name}:{seq}"));
        debug!(channel = %key, chat_id = %chat_id, "opening communication channel");
        Ok(CommunicationChannel::open(
            key,
            chat_id,
            Arc::clone(&self.transport),
            Arc::clone(&self.correlator),
        ))
    }

    /// Dispatch inbound messages until the receiver closes or the service
    /// is shut down, then wait for the turns still running.
    ///
    /// Replies to tracked messages are handed to their channel right here,
    /// in arrival order. Every other message is handled on its own task so
    /// a slow or failing channel never holds up the rest.
    pub async fn run(self: Arc<Self>, mut inbound: InboundReceiver) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "inbound task panicked");
                    }
                },
                message = inbound.recv() => {
                    let Some(message) = message else {
                        debug!("inbound stream closed");
                        break;
                    };
                    if self.correlator.deliver(&message) {
                        continue;
                    }
                    let this = Arc::clone(&self);
                    tasks.spawn(async move {
                        let chat_id = message.chat_id.clone();
                        if let Err(e) = this.handle_inbound(message).await {
                            error!(chat_id = %chat_id, error = %e, "failed to handle inbound message");
                        }
                    });
                },
            }
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "inbound task panicked");
            }
        }
    }

    /// Hand replies to tracked messages to their channels and drop
    /// everything else, until the receiver closes or the service is shut
    /// down. No session is created and no turn is run.
    pub async fn deliver_replies(self: Arc<Self>, mut inbound: InboundReceiver) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                message = inbound.recv() => {
                    let Some(message) = message else {
                        debug!("inbound stream closed");
                        break;
                    };
                    if !self.correlator.deliver(&message) {
                        debug!(chat_id = %message.chat_id, "ignoring message that is not a tracked reply");
                    }
                },
            }
        }
    }

    /// Authorize one message and run it as a turn on its channel's session.
    pub async fn handle_inbound(&self, message: InboundMessage) -> Result<()> {
        let route = match self.routes.authorize(&message) {
            Ok(route) => route,
            Err(denied) => {
                warn!(
                    chat_id = %message.chat_id,
                    sender_id = %message.sender_id,
                    reason = denied.reason(),
                    "access denied"
                );
                self.transport
                    .send(&message.chat_id, self.notices.rejection())
                    .await?;
                return Ok(());
            },
        };

        let key = message.channel_key();
        let session = self.registry.get_or_create(&key, &route.agent).await?;
        let outcome = self
            .bridge
            .run_turn(&session, &message.text, &self.cancel.child_token())
            .await?;
        debug!(channel = %key, ?outcome, "turn finished");
        Ok(())
    }

    /// Abort listening turns, stop the scheduler and tear down every
    /// session.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.cancel.cancel();
        self.aggregator.stop().await;
        self.registry.destroy_all().await;
    }
}
