//! Shared fakes for the integration tests
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bookkeeper::admin::AdminLinkIssuer;
use bookkeeper::crypto::EnvelopeCrypto;
use bookkeeper::dedup::DedupGuard;
use bookkeeper::errors::{CryptoError, UpstreamError};
use bookkeeper::ledger::{Ledger, LedgerEntry};
use bookkeeper::message::SignatureParams;
use bookkeeper::recognition::{RecognitionResult, Recognizer};
use bookkeeper::wecom::{ConfirmationCard, MediaSource, Messenger};
use bookkeeper::workspace::{PendingWorkspace, TransactionFields};
use bookkeeper::{Collaborators, DispatchSettings, Dispatcher};

/// Smallest byte string the format sniffer accepts as PNG
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub const VALID_SIGNATURE: &str = "valid-signature";

/// Crypto whose "encryption" is the identity; any other signature is rejected
pub struct PassthroughCrypto;

impl PassthroughCrypto {
    fn check(params: &SignatureParams) -> Result<(), CryptoError> {
        if params.msg_signature == VALID_SIGNATURE {
            Ok(())
        } else {
            Err(CryptoError::Signature("signature mismatch".to_string()))
        }
    }
}

#[async_trait]
impl EnvelopeCrypto for PassthroughCrypto {
    async fn verify_and_decrypt_echo(
        &self,
        params: &SignatureParams,
        echostr: &str,
    ) -> Result<String, CryptoError> {
        Self::check(params)?;
        Ok(echostr.to_string())
    }

    async fn decrypt_envelope(
        &self,
        params: &SignatureParams,
        body: &str,
    ) -> Result<String, CryptoError> {
        Self::check(params)?;
        Ok(body.to_string())
    }

    async fn encrypt_envelope(&self, plaintext: &str) -> Result<String, CryptoError> {
        Ok(plaintext.to_string())
    }
}

/// Recognizer that always answers with the configured result
pub struct ScriptedRecognizer {
    result: Mutex<RecognitionResult>,
    pub calls: AtomicUsize,
}

impl ScriptedRecognizer {
    pub fn new(result: RecognitionResult) -> Self {
        Self {
            result: Mutex::new(result),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn receipt(amount: f64, vendor: &str) -> Self {
        Self::new(RecognitionResult {
            success: true,
            amount: Some(amount),
            vendor: Some(vendor.to_string()),
            category: Some("餐饮".to_string()),
            transaction_date: Some("2024-05-01".to_string()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn recognize(&self, _image: &[u8], _image_path: Option<&Path>) -> RecognitionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone()
    }
}

/// Messenger that records everything it is asked to send
#[derive(Default)]
pub struct RecordingMessenger {
    pub texts: Mutex<Vec<(String, String)>>,
    pub cards: Mutex<Vec<(String, ConfirmationCard)>>,
    pub fail_cards: AtomicBool,
}

impl RecordingMessenger {
    pub fn texts_for(&self, user_id: &str) -> Vec<String> {
        self.texts
            .lock()
            .unwrap()
            .iter()
            .filter(|(user, _)| user == user_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.texts.lock().unwrap().last().map(|(_, text)| text.clone())
    }

    pub fn card_count(&self) -> usize {
        self.cards.lock().unwrap().len()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), UpstreamError> {
        self.texts
            .lock()
            .unwrap()
            .push((user_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_confirmation_card(
        &self,
        user_id: &str,
        card: &ConfirmationCard,
    ) -> Result<(), UpstreamError> {
        if self.fail_cards.load(Ordering::SeqCst) {
            return Err(UpstreamError::Messaging("card rejected".to_string()));
        }
        self.cards
            .lock()
            .unwrap()
            .push((user_id.to_string(), card.clone()));
        Ok(())
    }
}

/// Media source serving fixed bytes, or failing when none are set
pub struct StaticMedia {
    bytes: Option<Vec<u8>>,
}

impl StaticMedia {
    pub fn png() -> Self {
        Self {
            bytes: Some(PNG_BYTES.to_vec()),
        }
    }

    pub fn with_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: Some(bytes.to_vec()),
        }
    }

    pub fn failing() -> Self {
        Self { bytes: None }
    }
}

#[async_trait]
impl MediaSource for StaticMedia {
    async fn download(&self, media_id: &str) -> Result<Vec<u8>, UpstreamError> {
        self.bytes
            .clone()
            .ok_or_else(|| UpstreamError::Media(format!("no media for {media_id}")))
    }
}

/// In-memory ledger that records created entries
#[derive(Default)]
pub struct MemoryLedger {
    pub entries: Mutex<Vec<LedgerEntry>>,
    pub fail: AtomicBool,
    next_id: AtomicI64,
}

impl MemoryLedger {
    pub fn created(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create(&self, user_id: &str, fields: &TransactionFields) -> Result<LedgerEntry> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("database unavailable"));
        }
        let entry = LedgerEntry {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id: user_id.to_string(),
            amount: fields.amount,
            vendor: fields.vendor.clone(),
            category: fields.category.clone(),
            transaction_date: fields.date,
            description: fields.description.clone(),
            image_url: fields.image_ref.clone(),
            created_at: Utc::now(),
        };
        self.entries.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn recent(&self, user_id: &str, limit: i64) -> Result<Vec<LedgerEntry>> {
        let mut entries: Vec<LedgerEntry> = self
            .created()
            .into_iter()
            .filter(|entry| entry.user_id == user_id)
            .collect();
        entries.reverse();
        entries.truncate(limit.max(0) as usize);
        Ok(entries)
    }
}

/// Recognizer whose call never completes
pub struct StalledRecognizer;

#[async_trait]
impl Recognizer for StalledRecognizer {
    async fn recognize(&self, _image: &[u8], _image_path: Option<&Path>) -> RecognitionResult {
        std::future::pending().await
    }
}

/// Ledger whose calls never complete
pub struct StalledLedger;

#[async_trait]
impl Ledger for StalledLedger {
    async fn create(&self, _user_id: &str, _fields: &TransactionFields) -> Result<LedgerEntry> {
        std::future::pending().await
    }

    async fn recent(&self, _user_id: &str, _limit: i64) -> Result<Vec<LedgerEntry>> {
        std::future::pending().await
    }
}

/// Admin link issuer returning a fixed URL, or failing without one
pub struct StubAdminLinks {
    pub url: Option<String>,
}

#[async_trait]
impl AdminLinkIssuer for StubAdminLinks {
    async fn issue(&self, user_id: &str, _valid_for: Duration) -> Result<String> {
        self.url
            .clone()
            .ok_or_else(|| anyhow!("token service unavailable for {user_id}"))
    }
}

/// Dispatcher over arbitrary collaborators with a custom call budget
pub fn dispatcher_with(
    collaborators: Collaborators,
    collaborator_timeout: Duration,
) -> (Arc<Dispatcher>, Arc<PendingWorkspace>) {
    let workspace = Arc::new(PendingWorkspace::new());
    let dispatcher = Dispatcher::new(
        Arc::clone(&workspace),
        Arc::new(DedupGuard::default()),
        collaborators,
        None,
        DispatchSettings {
            collaborator_timeout,
            ..DispatchSettings::default()
        },
    );
    (Arc::new(dispatcher), workspace)
}

/// A dispatcher wired to fakes, with handles to inspect them
pub struct Harness {
    pub dispatcher: Arc<Dispatcher>,
    pub workspace: Arc<PendingWorkspace>,
    pub recognizer: Arc<ScriptedRecognizer>,
    pub messenger: Arc<RecordingMessenger>,
    pub ledger: Arc<MemoryLedger>,
}

impl Harness {
    pub fn new(recognizer: ScriptedRecognizer) -> Self {
        Self::build(recognizer, StaticMedia::png(), false)
    }

    pub fn build(recognizer: ScriptedRecognizer, media: StaticMedia, deep_link_enabled: bool) -> Self {
        let workspace = Arc::new(PendingWorkspace::new());
        let recognizer = Arc::new(recognizer);
        let messenger = Arc::new(RecordingMessenger::default());
        let ledger = Arc::new(MemoryLedger::default());

        let collaborators = Collaborators {
            recognizer: recognizer.clone(),
            messenger: messenger.clone(),
            media: Arc::new(media),
            ledger: ledger.clone(),
            admin_links: None,
        };
        let dispatcher = Dispatcher::new(
            Arc::clone(&workspace),
            Arc::new(DedupGuard::default()),
            collaborators,
            None,
            DispatchSettings {
                deep_link_enabled,
                collaborator_timeout: Duration::from_secs(5),
                ..DispatchSettings::default()
            },
        );

        Self {
            dispatcher: Arc::new(dispatcher),
            workspace,
            recognizer,
            messenger,
            ledger,
        }
    }
}

fn header(user: &str, msg_id: &str, msg_type: &str) -> String {
    format!(
        "<ToUserName><![CDATA[corp]]></ToUserName>\
         <FromUserName><![CDATA[{user}]]></FromUserName>\
         <CreateTime>1714521600</CreateTime>\
         <MsgType><![CDATA[{msg_type}]]></MsgType>\
         <MsgId>{msg_id}</MsgId>\
         <AgentID>1000002</AgentID>"
    )
}

pub fn text_xml(user: &str, msg_id: &str, content: &str) -> String {
    format!(
        "<xml>{}<Content><![CDATA[{content}]]></Content></xml>",
        header(user, msg_id, "text")
    )
}

pub fn image_xml(user: &str, msg_id: &str, media_id: &str) -> String {
    format!(
        "<xml>{}<PicUrl><![CDATA[http://example.com/p.png]]></PicUrl>\
         <MediaId><![CDATA[{media_id}]]></MediaId></xml>",
        header(user, msg_id, "image")
    )
}

pub fn event_xml(user: &str, msg_id: &str, event: &str, key: &str) -> String {
    format!(
        "<xml>{}<Event><![CDATA[{event}]]></Event><EventKey><![CDATA[{key}]]></EventKey></xml>",
        header(user, msg_id, "event")
    )
}

pub fn voice_xml(user: &str, msg_id: &str) -> String {
    format!(
        "<xml>{}<MediaId><![CDATA[v1]]></MediaId><Format><![CDATA[amr]]></Format></xml>",
        header(user, msg_id, "voice")
    )
}
