//! # Response Envelope Builder
//!
//! Wraps a plain reply payload into the encrypted XML envelope the platform
//! expects back from a message callback.

use anyhow::{Context, Result};
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use tracing::error;

use crate::crypto::EnvelopeCrypto;
use crate::message::SignatureParams;

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_UNSUPPORTED: &str = "unsupported message type";
pub const ALREADY_PROCESSED: &str = "Message already processed";

/// Ordered field/value mapping sent back inside the encrypted envelope
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReplyPayload {
    fields: Vec<(String, String)>,
}

impl ReplyPayload {
    pub fn status(status: &str) -> Self {
        Self::default().with("status", status)
    }

    pub fn success() -> Self {
        Self::status(STATUS_SUCCESS)
    }

    pub fn unsupported() -> Self {
        Self::status(STATUS_UNSUPPORTED)
    }

    pub fn already_processed() -> Self {
        Self::success().with("message", ALREADY_PROCESSED)
    }

    /// Set a field, replacing an earlier value under the same name
    pub fn with(mut self, name: &str, value: &str) -> Self {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Serialize as `<xml><name>value</name>...</xml>`
    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<xml>");
        for (name, value) in &self.fields {
            xml.push_str(&format!("<{name}>{}</{name}>", escape(value.as_str())));
        }
        xml.push_str("</xml>");
        xml
    }

    /// Parse a payload produced by [`ReplyPayload::to_xml`]
    pub fn from_xml(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut payload = ReplyPayload::default();
        let mut depth = 0usize;
        let mut current: Option<String> = None;
        let mut value = String::new();

        loop {
            match reader.read_event().context("Malformed reply payload")? {
                Event::Start(start) => {
                    depth += 1;
                    if depth == 2 {
                        current = Some(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                        value.clear();
                    }
                }
                Event::Text(text) if current.is_some() => {
                    value.push_str(&text.unescape().context("Bad escape in reply payload")?);
                }
                Event::CData(data) if current.is_some() => {
                    value.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
                Event::Empty(empty) if depth == 1 => {
                    let name = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                    payload = payload.with(&name, "");
                }
                Event::End(_) => {
                    if depth == 2 {
                        if let Some(name) = current.take() {
                            payload = payload.with(&name, &value);
                        }
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(payload)
    }
}

/// The four-field XML envelope returned on the message endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "Encrypt")]
    pub encrypt: String,
    #[serde(rename = "MsgSignature")]
    pub msg_signature: String,
    #[serde(rename = "TimeStamp")]
    pub timestamp: String,
    #[serde(rename = "Nonce")]
    pub nonce: String,
}

impl ResponseEnvelope {
    pub fn to_xml(&self) -> String {
        format!(
            "<xml>\n<Encrypt>{}</Encrypt>\n<MsgSignature>{}</MsgSignature>\n<TimeStamp>{}</TimeStamp>\n<Nonce>{}</Nonce>\n</xml>",
            cdata(&self.encrypt),
            cdata(&self.msg_signature),
            escape(self.timestamp.as_str()),
            cdata(&self.nonce)
        )
    }

    pub fn from_xml(xml: &str) -> Result<Self> {
        quick_xml::de::from_str(xml).context("Malformed response envelope")
    }
}

/// Wrap text in a CDATA section, splitting any embedded terminator
fn cdata(text: &str) -> String {
    format!("<![CDATA[{}]]>", text.replace("]]>", "]]]]><![CDATA[>"))
}

/// Encrypt `payload` and wrap it with the request's signature parameters.
///
/// Signature, timestamp and nonce are echoed exactly as received. An encryption
/// failure still yields a well-formed envelope with an empty `Encrypt` field.
pub async fn build_response(
    crypto: &dyn EnvelopeCrypto,
    payload: &ReplyPayload,
    params: &SignatureParams,
) -> ResponseEnvelope {
    let plaintext = payload.to_xml();
    let encrypt = match crypto.encrypt_envelope(&plaintext).await {
        Ok(ciphertext) => ciphertext,
        Err(e) => {
            error!(error = %e, "Failed to encrypt reply payload");
            String::new()
        }
    };

    ResponseEnvelope {
        encrypt,
        msg_signature: params.msg_signature.clone(),
        timestamp: params.timestamp.clone(),
        nonce: params.nonce.clone(),
    }
}
