//! Callback Handler module for menu click events

use tracing::debug;

use super::message_handler::{DispatchReply, Dispatcher};
use crate::dialogue::ConversationCommand;

/// Event type emitted when a menu button is clicked
pub const CLICK_EVENT: &str = "click";

impl Dispatcher {
    /// Route an event message; only clicks with a known key trigger a command
    pub(super) async fn handle_event(
        &self,
        user_id: &str,
        event: &str,
        event_key: Option<&str>,
    ) -> DispatchReply {
        if !event.eq_ignore_ascii_case(CLICK_EVENT) {
            debug!(user_id = %user_id, event = %event, "Ignoring non-click event");
            return DispatchReply::unsupported();
        }

        let key = event_key.unwrap_or_default();
        match ConversationCommand::from_event_key(key) {
            ConversationCommand::Unknown(_) => {
                debug!(user_id = %user_id, event_key = %key, "Unrecognized click key");
                DispatchReply::success(None)
            }
            command => self.run_command(user_id, command).await,
        }
    }
}
