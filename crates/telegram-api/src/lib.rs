//! Minimal Telegram Bot API client.
//!
//! Covers exactly the surface the pipeline needs: identifying the bot,
//! sending (optionally threaded) text replies, admin lookups, webhook
//! registration, and dev-mode long polling. Requests are JSON POSTs to
//! `https://api.telegram.org/bot<token>/<method>`; error strings are
//! scrubbed so the token never reaches logs.

mod client;
mod error;
mod types;

pub use client::BotClient;
pub use error::{scrub_token, TelegramError};
pub use types::{Chat, ChatMember, Message, Update, User};
