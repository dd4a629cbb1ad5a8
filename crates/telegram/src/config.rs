use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::Result;

/// Configuration for the Telegram bot account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramAccountConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Long-poll timeout passed to `getUpdates`, in seconds.
    pub poll_timeout_secs: u32,

    /// Backoff after a failed `getUpdates` call, in seconds.
    pub poll_retry_secs: u64,

    /// How many times a rate-limited request is retried after the
    /// server-provided wait.
    pub retry_after_max_retries: usize,
}

impl TelegramAccountConfig {
    /// Parse the raw `[telegram]` config section.
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// HTTP client timeout, kept above the long-poll timeout so the client
    /// never aborts a poll before Telegram answers.
    pub fn client_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::from(self.poll_timeout_secs) + 15)
    }
}

impl std::fmt::Debug for TelegramAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAccountConfig")
            .field("token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramAccountConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            poll_timeout_secs: 30,
            poll_retry_secs: 5,
            retry_after_max_retries: 4,
        }
    }
}
