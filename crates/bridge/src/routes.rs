//! Binding of chats to agents, with access control.

use std::collections::{BTreeMap, HashMap};

use {
    switchboard_channels::{
        InboundMessage,
        gating::{self, AccessPolicy},
    },
    switchboard_config::{ChannelConfig, SwitchboardConfig},
};

/// One configured channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub name: String,
    pub chat_id: Option<String>,
    pub policy: AccessPolicy,
    pub allowlist: Vec<String>,
    /// Name of the agent serving this channel.
    pub agent: String,
}

/// Why an inbound message was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    /// No channel claims the chat and there is no default channel.
    UnknownChat,
    /// The channel's policy is `disabled`.
    Disabled,
    /// The sender is not on the channel's allowlist.
    NotAllowed,
}

impl AccessDenied {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownChat => "unknown chat",
            Self::Disabled => "channel disabled",
            Self::NotAllowed => "sender not allowlisted",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Routes {
    by_name: BTreeMap<String, Route>,
    by_chat: HashMap<String, String>,
}

impl Routes {
    pub fn new(channels: &BTreeMap<String, ChannelConfig>) -> Self {
        let mut by_name = BTreeMap::new();
        let mut by_chat = HashMap::new();
        for (name, channel) in channels {
            let chat_id = channel
                .chat_id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string);
            if let Some(ref chat_id) = chat_id {
                by_chat
                    .entry(chat_id.clone())
                    .or_insert_with(|| name.clone());
            }
            by_name.insert(name.clone(), Route {
                name: name.clone(),
                chat_id,
                policy: channel.policy,
                allowlist: channel.allowlist.clone(),
                agent: channel.agent.clone(),
            });
        }
        Self { by_name, by_chat }
    }

    /// Channel serving `chat_id`: an exact binding, else the default channel.
    pub fn route(&self, chat_id: &str) -> Option<&Route> {
        self.by_chat
            .get(chat_id)
            .and_then(|name| self.by_name.get(name))
            .or_else(|| self.by_name.get(SwitchboardConfig::DEFAULT_CHANNEL))
    }

    pub fn named(&self, name: &str) -> Option<&Route> {
        self.by_name.get(name)
    }

    /// Route an inbound message and check its sender against the route's
    /// policy.
    pub fn authorize(&self, message: &InboundMessage) -> Result<&Route, AccessDenied> {
        let route = self
            .route(&message.chat_id)
            .ok_or(AccessDenied::UnknownChat)?;
        match route.policy {
            AccessPolicy::Disabled => Err(AccessDenied::Disabled),
            policy if gating::admits(policy, &route.allowlist, message.sender_identifiers()) => {
                Ok(route)
            },
            _ => Err(AccessDenied::NotAllowed),
        }
    }

    /// Routes bound to a fixed chat.
    pub fn bound(&self) -> impl Iterator<Item = (&Route, &str)> {
        self.by_name
            .values()
            .filter_map(|route| route.chat_id.as_deref().map(|chat| (route, chat)))
    }
}
