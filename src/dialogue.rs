//! Conversation commands derived from text messages and card clicks.

use serde::{Deserialize, Serialize};

/// Which canned help text a numbered menu option asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HelpTopic {
    /// Option 1: how to record a receipt
    Recording,
    /// Option 4: general usage
    Usage,
}

/// Everything a user can ask the bot to do
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationCommand {
    Confirm,
    Cancel,
    Menu,
    Help(HelpTopic),
    ShowLedger,
    AdminLink,
    Unknown(String),
}

impl ConversationCommand {
    /// Classify the content of a text message
    pub fn from_text(content: &str) -> Self {
        let trimmed = content.trim();
        match trimmed.to_lowercase().as_str() {
            "确认" | "confirm" => ConversationCommand::Confirm,
            "取消" | "cancel" => ConversationCommand::Cancel,
            "菜单" | "menu" => ConversationCommand::Menu,
            "1" => ConversationCommand::Help(HelpTopic::Recording),
            "2" => ConversationCommand::ShowLedger,
            "3" => ConversationCommand::AdminLink,
            "4" => ConversationCommand::Help(HelpTopic::Usage),
            _ => ConversationCommand::Unknown(content.to_string()),
        }
    }

    /// Classify the key of a card click; only confirm and cancel are wired to buttons
    pub fn from_event_key(event_key: &str) -> Self {
        match event_key.trim() {
            "confirm" => ConversationCommand::Confirm,
            "cancel" => ConversationCommand::Cancel,
            other => ConversationCommand::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_and_cancel_words() {
        assert_eq!(ConversationCommand::from_text("确认"), ConversationCommand::Confirm);
        assert_eq!(ConversationCommand::from_text("Confirm"), ConversationCommand::Confirm);
        assert_eq!(ConversationCommand::from_text(" 取消 "), ConversationCommand::Cancel);
        assert_eq!(ConversationCommand::from_text("CANCEL"), ConversationCommand::Cancel);
    }

    #[test]
    fn test_menu_options() {
        assert_eq!(ConversationCommand::from_text("菜单"), ConversationCommand::Menu);
        assert_eq!(ConversationCommand::from_text("menu"), ConversationCommand::Menu);
        assert_eq!(
            ConversationCommand::from_text("1"),
            ConversationCommand::Help(HelpTopic::Recording)
        );
        assert_eq!(ConversationCommand::from_text("2"), ConversationCommand::ShowLedger);
        assert_eq!(ConversationCommand::from_text("3"), ConversationCommand::AdminLink);
        assert_eq!(
            ConversationCommand::from_text("4"),
            ConversationCommand::Help(HelpTopic::Usage)
        );
    }

    #[test]
    fn test_unknown_keeps_original_text() {
        assert_eq!(
            ConversationCommand::from_text("5 杯咖啡"),
            ConversationCommand::Unknown("5 杯咖啡".to_string())
        );
    }

    #[test]
    fn test_event_keys() {
        assert_eq!(ConversationCommand::from_event_key("confirm"), ConversationCommand::Confirm);
        assert_eq!(ConversationCommand::from_event_key("cancel"), ConversationCommand::Cancel);
        assert_eq!(
            ConversationCommand::from_event_key("menu"),
            ConversationCommand::Unknown("menu".to_string())
        );
    }
}
