//! Shared types, error definitions, and utilities used across all switchboard crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{ChannelKey, ChatType, MessageId},
};
