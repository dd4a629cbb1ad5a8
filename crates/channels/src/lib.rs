//! Chat transport contract.
//!
//! A messaging platform plugs into the engine by implementing
//! [`ChatTransport`] for outbound send/edit and by feeding
//! [`InboundMessage`] records into an [`InboundSender`].

pub mod error;
pub mod gating;
pub mod transport;

pub use {
    error::{Error, Result},
    transport::{ChatTransport, InboundMessage, InboundReceiver, InboundSender},
};
