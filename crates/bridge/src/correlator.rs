//! Correlation of inbound replies with messages sent through a
//! [`crate::CommunicationChannel`].
//!
//! Message ids are only unique within a chat, so entries are keyed by
//! `(chat_id, message_id)`. An entry also remembers which bot identity sent
//! the message; a reply observed by a different bot never resolves.

use std::{collections::HashMap, sync::Mutex};

use {
    switchboard_channels::InboundMessage,
    switchboard_common::{ChannelKey, MessageId},
    tokio::sync::mpsc,
    tracing::debug,
};

/// A sent message remembered so a reply to it can be routed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedMessage {
    pub message_id: MessageId,
    pub origin_identity: String,
    pub channel_key: ChannelKey,
}

#[derive(Default)]
struct Inner {
    tracked: HashMap<(String, MessageId), TrackedMessage>,
    inboxes: HashMap<ChannelKey, mpsc::UnboundedSender<String>>,
}

#[derive(Default)]
pub struct ReplyCorrelator {
    inner: Mutex<Inner>,
}

impl ReplyCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register where replies for `channel_key` are delivered.
    pub(crate) fn attach(&self, channel_key: ChannelKey, inbox: mpsc::UnboundedSender<String>) {
        self.lock().inboxes.insert(channel_key, inbox);
    }

    pub fn track(
        &self,
        chat_id: &str,
        message_id: MessageId,
        origin_identity: &str,
        channel_key: &ChannelKey,
    ) {
        self.lock()
            .tracked
            .insert((chat_id.to_string(), message_id), TrackedMessage {
                message_id,
                origin_identity: origin_identity.to_string(),
                channel_key: channel_key.clone(),
            });
    }

    /// Channel that sent `reply_to` in `chat_id`, if it was sent by
    /// `observing_identity`.
    pub fn resolve(
        &self,
        chat_id: &str,
        reply_to: MessageId,
        observing_identity: &str,
    ) -> Option<ChannelKey> {
        self.lock()
            .tracked
            .get(&(chat_id.to_string(), reply_to))
            .filter(|tracked| tracked.origin_identity == observing_identity)
            .map(|tracked| tracked.channel_key.clone())
    }

    /// Deliver `message` to the channel it replies to.
    ///
    /// Returns `false` when the message is not a reply to a tracked message
    /// and must go through normal handling.
    pub fn deliver(&self, message: &InboundMessage) -> bool {
        let Some(reply_to) = message.reply_to else {
            return false;
        };
        let Some(key) = self.resolve(&message.chat_id, reply_to, &message.observed_by) else {
            return false;
        };
        let inner = self.lock();
        match inner.inboxes.get(&key) {
            Some(inbox) if inbox.send(message.text.clone()).is_ok() => {
                debug!(channel = %key, reply_to = %reply_to, "reply delivered to channel");
                true
            },
            _ => false,
        }
    }

    /// Drop every tracked message and the inbox of `channel_key`.
    pub fn forget(&self, channel_key: &ChannelKey) {
        let mut inner = self.lock();
        inner
            .tracked
            .retain(|_, tracked| &tracked.channel_key != channel_key);
        inner.inboxes.remove(channel_key);
    }

    pub fn tracked_count(&self) -> usize {
        self.lock().tracked.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, switchboard_common::ChatType};

    fn reply(chat_id: &str, reply_to: i64, observed_by: &str, text: &str) -> InboundMessage {
        InboundMessage {
            sender_id: "7".into(),
            sender_username: None,
            chat_id: chat_id.into(),
            chat_type: ChatType::Dm,
            chat_title: None,
            text: text.into(),
            reply_to: Some(MessageId(reply_to)),
            observed_by: observed_by.into(),
        }
    }

    #[test]
    fn resolves_only_for_sending_identity() {
        let correlator = ReplyCorrelator::new();
        let key = ChannelKey::from("ops:1");
        correlator.track("-100", MessageId(5), "bot-a", &key);

        assert_eq!(correlator.resolve("-100", MessageId(5), "bot-a"), Some(key));
        assert_eq!(correlator.resolve("-100", MessageId(5), "bot-b"), None);
        assert_eq!(correlator.resolve("-100", MessageId(6), "bot-a"), None);
        // same message id in another chat is a different message
        assert_eq!(correlator.resolve("-200", MessageId(5), "bot-a"), None);
    }

    #[test]
    fn deliver_routes_text_to_attached_inbox() {
        let correlator = ReplyCorrelator::new();
        let key = ChannelKey::from("ops:1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        correlator.attach(key.clone(), tx);
        correlator.track("-100", MessageId(5), "bot-a", &key);

        assert!(correlator.deliver(&reply("-100", 5, "bot-a", "yes")));
        assert!(correlator.deliver(&reply("-100", 5, "bot-a", "and also")));
        assert_eq!(rx.try_recv().unwrap(), "yes");
        assert_eq!(rx.try_recv().unwrap(), "and also");
    }

    #[test]
    fn deliver_ignores_untracked_and_foreign_replies() {
        let correlator = ReplyCorrelator::new();
        let key = ChannelKey::from("ops:1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        correlator.attach(key.clone(), tx);
        correlator.track("-100", MessageId(5), "bot-a", &key);

        assert!(!correlator.deliver(&reply("-100", 9, "bot-a", "x")));
        assert!(!correlator.deliver(&reply("-100", 5, "bot-b", "x")));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn forget_drops_channel_entries_only() {
        let correlator = ReplyCorrelator::new();
        let a = ChannelKey::from("a");
        let b = ChannelKey::from("b");
        correlator.track("-100", MessageId(1), "bot", &a);
        correlator.track("-100", MessageId(2), "bot", &a);
        correlator.track("-100", MessageId(3), "bot", &b);

        correlator.forget(&a);
        assert_eq!(correlator.tracked_count(), 1);
        assert_eq!(correlator.resolve("-100", MessageId(1), "bot"), None);
        assert_eq!(correlator.resolve("-100", MessageId(3), "bot"), Some(b));
    }
}
