use {
    switchboard_channels::InboundMessage,
    switchboard_common::{ChatType, MessageId},
    teloxide::types::{ChatKind, MediaKind, Message, MessageKind, PublicChatKind},
};

/// Normalize a Telegram message into an [`InboundMessage`].
///
/// Returns `None` for messages without text or caption and for messages
/// with no sender (channel posts).
pub fn to_inbound(msg: &Message, observed_by: &str) -> Option<InboundMessage> {
    let text = extract_text(msg)?;
    let from = msg.from.as_ref()?;
    let (chat_type, chat_title) = classify_chat(msg);
    Some(InboundMessage {
        sender_id: from.id.0.to_string(),
        sender_username: from.username.clone(),
        chat_id: msg.chat.id.0.to_string(),
        chat_type,
        chat_title,
        text,
        reply_to: msg
            .reply_to_message()
            .map(|replied| MessageId(i64::from(replied.id.0))),
        observed_by: observed_by.to_string(),
    })
}

/// Extract text content from a message.
fn extract_text(msg: &Message) -> Option<String> {
    match &msg.kind {
        MessageKind::Common(common) => match &common.media_kind {
            MediaKind::Text(t) => Some(t.text.clone()),
            MediaKind::Photo(p) => p.caption.clone(),
            MediaKind::Document(d) => d.caption.clone(),
            MediaKind::Video(vid) => vid.caption.clone(),
            _ => None,
        },
        _ => None,
    }
}

/// Classify the chat type.
fn classify_chat(msg: &Message) -> (ChatType, Option<String>) {
    match msg.chat.kind {
        ChatKind::Private(_) => (ChatType::Dm, None),
        ChatKind::Public(ref p) => {
            let title = p.title.clone();
            match p.kind {
                PublicChatKind::Channel(_) => (ChatType::Channel, title),
                _ => (ChatType::Group, title),
            }
        },
    }
}
