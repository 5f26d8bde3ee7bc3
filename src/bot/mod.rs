//! Bot module for handling inbound chat messages
//!
//! This module is split into several submodules:
//! - `message_handler`: Dedup, routing by message type and the image pipeline
//! - `callback_handler`: Handles menu click events
//! - `ui_builder`: Formats cards, lists and deep-link messages
//! - `dialogue_manager`: Staging, confirmation and cancellation of transactions

pub mod callback_handler;
pub mod dialogue_manager;
pub mod message_handler;
pub mod ui_builder;

pub use message_handler::{Collaborators, DispatchReply, DispatchSettings, Dispatcher};
pub use ui_builder::{confirmation_card, format_amount};
