use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No channel with this name is configured, or it has no chat to talk to.
    #[error("unknown channel: {name}")]
    UnknownChannel { name: String },

    /// A channel refers to an agent that is not configured.
    #[error("unknown agent: {name}")]
    UnknownAgent { name: String },

    #[error("communication channel {key} is closed")]
    ChannelClosed { key: String },

    #[error(transparent)]
    Transport(#[from] switchboard_channels::Error),

    #[error(transparent)]
    Agent(switchboard_agents::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn unknown_channel(name: impl Into<String>) -> Self {
        Self::UnknownChannel { name: name.into() }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl From<switchboard_agents::Error> for Error {
    fn from(err: switchboard_agents::Error) -> Self {
        match err {
            switchboard_agents::Error::UnknownAgent { name } => Self::UnknownAgent { name },
            other => Self::Agent(other),
        }
    }
}

impl switchboard_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

switchboard_common::impl_context!();
