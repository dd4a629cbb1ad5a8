use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// No agent definition exists under this name.
    #[error("unknown agent: {name}")]
    UnknownAgent { name: String },

    /// The agent is still working on a previous input.
    #[error("agent is busy with request {request_id}")]
    Busy { request_id: String },

    /// The agent has been shut down.
    #[error("agent has shut down")]
    ShutDown,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn unknown_agent(name: impl Into<String>) -> Self {
        Self::UnknownAgent { name: name.into() }
    }

    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
