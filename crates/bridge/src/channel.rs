//! Conversation opened by code rather than by a user, used to ask a human
//! and wait for their reply.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    futures::Stream,
    switchboard_channels::ChatTransport,
    switchboard_common::{ChannelKey, MessageId},
    tokio::sync::{Mutex as AsyncMutex, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::{Error, Result, correlator::ReplyCorrelator};

/// Sends messages to one chat and receives the replies to them.
///
/// Only replies to messages sent through this channel are received, in
/// arrival order. Closing is final; a closed channel cannot be reopened.
pub struct CommunicationChannel {
    key: ChannelKey,
    chat_id: String,
    transport: Arc<dyn ChatTransport>,
    correlator: Arc<ReplyCorrelator>,
    inbox: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    tracked: Mutex<HashSet<MessageId>>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl CommunicationChannel {
    pub fn open(
        key: ChannelKey,
        chat_id: impl Into<String>,
        transport: Arc<dyn ChatTransport>,
        correlator: Arc<ReplyCorrelator>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        correlator.attach(key.clone(), tx);
        Self {
            key,
            chat_id: chat_id.into(),
            transport,
            correlator,
            inbox: AsyncMutex::new(rx),
            tracked: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Send `text` and start listening for replies to it.
    pub async fn send(&self, text: &str) -> Result<MessageId> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        let message_id = self.transport.send(&self.chat_id, text).await?;
        // a close that raced the send must not leave the id behind
        if self.is_closed() {
            return Ok(message_id);
        }
        self.correlator.track(
            &self.chat_id,
            message_id,
            self.transport.identity(),
            &self.key,
        );
        self.tracked_ids().insert(message_id);
        debug!(channel = %self.key, %message_id, "tracking sent message");
        Ok(message_id)
    }

    /// Next reply, waiting until one arrives. Returns `None` once the
    /// channel is closed.
    pub async fn recv(&self) -> Option<String> {
        if self.is_closed() {
            return None;
        }
        let mut inbox = self.inbox.lock().await;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            reply = inbox.recv() => reply,
        }
    }

    /// Replies as a stream that ends when the channel closes.
    pub fn replies(&self) -> impl Stream<Item = String> + '_ {
        futures::stream::unfold(self, |channel| async move {
            channel.recv().await.map(|reply| (reply, channel))
        })
    }

    /// Stop receiving and forget every tracked message. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        self.correlator.forget(&self.key);
        self.tracked_ids().clear();
        debug!(channel = %self.key, "communication channel closed");
    }

    pub fn tracked(&self) -> Vec<MessageId> {
        self.tracked_ids().iter().copied().collect()
    }

    fn tracked_ids(&self) -> std::sync::MutexGuard<'_, HashSet<MessageId>> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn closed_error(&self) -> Error {
        Error::ChannelClosed {
            key: self.key.to_string(),
        }
    }
}

impl Drop for CommunicationChannel {
    fn drop(&mut self) {
        self.close();
    }
}
