//! Telegram transport for switchboard.
//!
//! Uses teloxide to long-poll the Bot API for inbound messages and to send
//! and edit plain-text messages on behalf of the engine.

pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod outbound;

pub use {
    bot::TelegramBot,
    config::TelegramAccountConfig,
    error::{Error, Result},
    outbound::TelegramTransport,
};
