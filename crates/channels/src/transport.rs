use {
    async_trait::async_trait,
    switchboard_common::{ChannelKey, ChatType, MessageId},
    tokio::sync::mpsc,
};

use crate::Result;

/// One inbound chat message, normalized across platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Platform id of the human who sent the message.
    pub sender_id: String,
    pub sender_username: Option<String>,
    /// Chat the message arrived in. Negative for groups.
    pub chat_id: String,
    pub chat_type: ChatType,
    /// Group title, when the chat has one.
    pub chat_title: Option<String>,
    pub text: String,
    /// The message this one replies to, if any.
    pub reply_to: Option<MessageId>,
    /// Identity of the bot that observed this message.
    pub observed_by: String,
}

impl InboundMessage {
    /// Key of the conversation this message belongs to.
    pub fn channel_key(&self) -> ChannelKey {
        ChannelKey::new(self.chat_id.clone())
    }

    /// Identifiers the sender may be allowlisted under.
    pub fn sender_identifiers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.sender_id.as_str()).chain(self.sender_username.as_deref())
    }
}

/// Receiver end of an inbound message stream.
pub type InboundReceiver = mpsc::Receiver<InboundMessage>;

/// Sender end of an inbound message stream.
pub type InboundSender = mpsc::Sender<InboundMessage>;

/// Outbound side of a chat platform.
///
/// Implementations must treat an edit whose content equals what the message
/// already displays as success, or report it as
/// [`crate::Error::MessageNotModified`] so callers can.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Identity of the bot this transport speaks as (e.g. its username).
    fn identity(&self) -> &str;

    /// Send a new plain-text message, returning its platform id.
    async fn send(&self, chat_id: &str, text: &str) -> Result<MessageId>;

    /// Replace the text of a previously sent message.
    async fn edit(&self, chat_id: &str, message_id: MessageId, text: &str) -> Result<()>;
}
