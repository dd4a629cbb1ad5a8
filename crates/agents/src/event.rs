use std::fmt;

/// Identifier the agent assigns to one submitted input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the agent can accept a new input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionState {
    #[default]
    Idle,
    Running,
}

/// Severity of a system message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemLevel {
    Info,
    Warning,
    Error,
}

impl SystemLevel {
    /// Upper-case tag used when rendering the message for a chat.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// One entry in an agent's event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// Conversational output for the user, possibly a fragment.
    Chat(String),
    /// Operational message with a level, delivered as-is.
    System { level: SystemLevel, text: String },
    /// The agent accepted an input and started working on it.
    InputStarted { request_id: RequestId },
    /// The agent finished processing an input.
    InputCompleted { request_id: RequestId },
}

impl AgentEvent {
    pub fn chat(text: impl Into<String>) -> Self {
        Self::Chat(text.into())
    }

    pub fn system(level: SystemLevel, text: impl Into<String>) -> Self {
        Self::System {
            level,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn level_tags() {
        assert_eq!(SystemLevel::Info.tag(), "INFO");
        assert_eq!(SystemLevel::Warning.tag(), "WARNING");
        assert_eq!(SystemLevel::Error.tag(), "ERROR");
    }
}
