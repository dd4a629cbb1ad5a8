//! Session multiplexing, reply correlation, and paced output streaming
//! between a chat transport and a pool of agents.
//!
//! Inbound flow: a reply to a message sent through a
//! [`CommunicationChannel`] is delivered to that channel. Everything else is
//! authorized against [`Routes`], bound to a [`Session`] in the
//! [`SessionRegistry`], and driven by the [`AgentEventBridge`], whose chat
//! output is paced back to the chat by the [`OutputAggregator`].

pub mod aggregator;
pub mod channel;
pub mod correlator;
pub mod error;
pub mod notices;
pub mod registry;
pub mod routes;
pub mod service;
pub mod turn;

#[cfg(test)]
mod testing;

pub use {
    aggregator::{OutputAggregator, OutputBuffer},
    channel::CommunicationChannel,
    correlator::{ReplyCorrelator, TrackedMessage},
    error::{Error, Result},
    notices::Notices,
    registry::{Session, SessionRegistry},
    routes::{AccessDenied, Route, Routes},
    service::Switchboard,
    turn::{AgentEventBridge, TurnOutcome},
};
