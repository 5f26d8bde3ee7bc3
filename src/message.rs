//! Decrypted platform messages.
//!
//! The gateway hands back a flat XML document such as
//! `<xml><ToUserName>..</ToUserName><MsgType>text</MsgType><Content>..</Content></xml>`;
//! this module turns it into a typed [`InboundMessage`].

use anyhow::{Context, Result};
use serde::Deserialize;

/// Signature components carried on every callback query string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub msg_signature: String,
    pub timestamp: String,
    pub nonce: String,
}

/// Fields shared by every message type
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageHeader {
    pub to_user: String,
    pub from_user: String,
    pub create_time: i64,
    pub msg_id: Option<String>,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text { content: String },
    Image { pic_url: Option<String>, media_id: String },
    Event { event: String, event_key: Option<String> },
    Unsupported { msg_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl InboundMessage {
    /// User the message came from; replies go back to this id
    pub fn user_id(&self) -> &str {
        &self.header.from_user
    }

    pub fn msg_type(&self) -> &str {
        match &self.body {
            MessageBody::Text { .. } => "text",
            MessageBody::Image { .. } => "image",
            MessageBody::Event { .. } => "event",
            MessageBody::Unsupported { msg_type } => msg_type,
        }
    }

    /// Parse the decrypted XML payload
    pub fn from_xml(xml: &str) -> Result<Self> {
        let raw: RawMessage =
            quick_xml::de::from_str(xml).context("Decrypted payload is not valid message XML")?;
        Ok(raw.into())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct RawMessage {
    to_user_name: Option<String>,
    from_user_name: Option<String>,
    create_time: Option<String>,
    msg_type: Option<String>,
    msg_id: Option<String>,
    #[serde(rename = "AgentID")]
    agent_id: Option<String>,
    content: Option<String>,
    pic_url: Option<String>,
    media_id: Option<String>,
    event: Option<String>,
    event_key: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl From<RawMessage> for InboundMessage {
    fn from(raw: RawMessage) -> Self {
        let header = MessageHeader {
            to_user: non_empty(raw.to_user_name).unwrap_or_default(),
            from_user: non_empty(raw.from_user_name).unwrap_or_default(),
            create_time: non_empty(raw.create_time)
                .and_then(|t| t.parse().ok())
                .unwrap_or(0),
            msg_id: non_empty(raw.msg_id),
            agent_id: non_empty(raw.agent_id),
        };

        let msg_type = non_empty(raw.msg_type).unwrap_or_default();
        let body = match msg_type.as_str() {
            // Content is kept verbatim; command parsing decides how to trim it
            "text" => MessageBody::Text {
                content: raw.content.unwrap_or_default(),
            },
            "image" => match non_empty(raw.media_id) {
                Some(media_id) => MessageBody::Image {
                    pic_url: non_empty(raw.pic_url),
                    media_id,
                },
                None => MessageBody::Unsupported { msg_type },
            },
            "event" => MessageBody::Event {
                event: non_empty(raw.event).unwrap_or_default(),
                event_key: non_empty(raw.event_key),
            },
            _ => MessageBody::Unsupported { msg_type },
        };

        InboundMessage { header, body }
    }
}
