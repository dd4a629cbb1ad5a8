/// Config schema types (telegram account, output pacing, notices, channels, agents).
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use {
    serde::{Deserialize, Serialize},
    switchboard_channels::gating::AccessPolicy,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    /// Telegram bot account settings. Kept as a raw value and deserialized
    /// by the telegram crate, which owns that schema.
    pub telegram: serde_json::Value,
    pub output: OutputConfig,
    pub notices: NoticesConfig,
    /// Chat bindings, keyed by channel name. The name `default` is the
    /// fallback route for chats without an explicit entry.
    pub channels: BTreeMap<String, ChannelConfig>,
    /// Agent definitions, keyed by the name channels refer to.
    pub agents: BTreeMap<String, AgentConfig>,
}

impl SwitchboardConfig {
    /// Name of the channel consulted when no channel claims a chat id.
    pub const DEFAULT_CHANNEL: &'static str = "default";
}

/// Pacing and size limits for streamed output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    /// Per-message ceiling in UTF-16 code units, with headroom under the
    /// platform's 4096 hard limit.
    pub max_message_len: usize,
    /// Minimum spacing between two flush cycles, process-wide.
    pub min_flush_interval_ms: u64,
    /// Consecutive failed flushes after which a buffer is discarded.
    pub max_flush_failures: u32,
}

impl OutputConfig {
    pub fn min_flush_interval(&self) -> Duration {
        Duration::from_millis(self.min_flush_interval_ms)
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            max_message_len: 4090,
            min_flush_interval_ms: 250,
            max_flush_failures: 5,
        }
    }
}

/// Fixed texts sent to users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NoticesConfig {
    /// Sent once to every channel with a `chat_id` when the service starts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announcement: Option<String>,
    pub rejection: String,
    pub no_response: String,
    /// `{duration}` is replaced with the agent's max run time.
    pub timeout: String,
}

impl Default for NoticesConfig {
    fn default() -> Self {
        Self {
            announcement: None,
            rejection: "You are not authorized to use this bot.".into(),
            no_response: "The agent finished without producing a response.".into(),
            timeout: "The agent did not finish within {duration}.".into(),
        }
    }
}

/// Binding of one chat to an access policy and an agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelConfig {
    /// Platform chat id. Negative for groups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    pub policy: AccessPolicy,
    /// Peer ids or usernames, `*` globs allowed.
    pub allowlist: Vec<String>,
    /// Name of the agent in `[agents]` that serves this channel.
    pub agent: String,
}

/// Supported agent implementations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Spawn a local command per input and stream its output.
    #[default]
    Process,
}

/// One agent definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub kind: AgentKind,
    pub command: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// How long a listener waits for one input to complete.
    pub max_run_time_secs: u64,
}

impl AgentConfig {
    pub fn max_run_time(&self) -> Duration {
        Duration::from_secs(self.max_run_time_secs)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            kind: AgentKind::default(),
            command: String::new(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            max_run_time_secs: 300,
        }
    }
}
