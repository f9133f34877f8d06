//! Channel implementations for various messaging platforms.
//!
//! This module provides concrete implementations of the [`Channel`] trait
//! for different messaging platforms.
//!
//! # Available Channels
//!
//! - [`cli::CliChannel`] - Terminal channel (always available)
//! - [`telegram::TelegramChannel`] - Telegram bot (requires `telegram` feature)
//!
//! # Feature Flags
//!
//! - `telegram` - Enable Telegram support via teloxide
//!
//! [`Channel`]: crate::channel::Channel

pub mod cli;

#[cfg(feature = "telegram")]
pub mod telegram;

pub use cli::{CliChannel, TerminalTransport};

#[cfg(feature = "telegram")]
pub use telegram::{TelegramChannel, TelegramReplier};
