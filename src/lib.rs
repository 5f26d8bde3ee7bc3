//! # Receipt Bookkeeping Bot
//!
//! Webhook backend for a corporate messaging platform that turns photographed
//! receipts into ledger entries. Images are recognized, staged per user, and
//! persisted once the user confirms them in chat.

pub mod admin;
pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod crypto;
pub mod dedup;
pub mod deep_link;
pub mod dialogue;
pub mod envelope;
pub mod errors;
pub mod ledger;
pub mod localization;
pub mod media;
pub mod message;
pub mod recognition;
pub mod server;
pub mod wecom;
pub mod workspace;

pub use bot::{Collaborators, DispatchReply, DispatchSettings, Dispatcher};
pub use config::Settings;
pub use server::{router, AppState};
