//! Message Handler module: entry point of the conversation state machine
//!
//! Every decrypted message passes through [`Dispatcher::dispatch`], which filters
//! retried deliveries, routes by message type and answers with the payload that
//! goes back inside the encrypted envelope. User-facing answers are sent through
//! the messaging collaborator; whatever happens downstream, the dispatcher itself
//! never fails.

use chrono::{DateTime, Local, Utc};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::admin::AdminLinkIssuer;
use crate::dedup::{DedupGuard, Observation};
use crate::dialogue::{ConversationCommand, HelpTopic};
use crate::envelope::ReplyPayload;
use crate::errors::UpstreamError;
use crate::ledger::Ledger;
use crate::localization::{t, t_args};
use crate::media::{sniff_format, ImageArchive};
use crate::message::{InboundMessage, MessageBody};
use crate::recognition::{RecognitionResult, Recognizer};
use crate::wecom::{MediaSource, Messenger};
use crate::workspace::PendingWorkspace;

/// External services the dispatcher calls into
#[derive(Clone)]
pub struct Collaborators {
    pub recognizer: Arc<dyn Recognizer>,
    pub messenger: Arc<dyn Messenger>,
    pub media: Arc<dyn MediaSource>,
    pub ledger: Arc<dyn Ledger>,
    pub admin_links: Option<Arc<dyn AdminLinkIssuer>>,
}

/// Behaviour switches for the dispatcher
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Reply with app deep links instead of staging transactions
    pub deep_link_enabled: bool,
    /// Upper bound for every collaborator call
    pub collaborator_timeout: Duration,
    /// Target of the confirmation card's detail button
    pub card_url: String,
    /// Public URL prefix under which archived images are served
    pub image_base_url: Option<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            deep_link_enabled: false,
            collaborator_timeout: Duration::from_secs(crate::config::DEFAULT_COLLABORATOR_TIMEOUT_SECS),
            card_url: "javascript:void(0);".to_string(),
            image_base_url: None,
        }
    }
}

/// What the dispatcher did with one message
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReply {
    /// Payload for the encrypted response envelope
    pub payload: ReplyPayload,
    /// Text delivered to the user, if any
    pub notice: Option<String>,
}

impl DispatchReply {
    pub fn success(notice: Option<String>) -> Self {
        Self {
            payload: ReplyPayload::success(),
            notice,
        }
    }

    pub fn unsupported() -> Self {
        Self {
            payload: ReplyPayload::unsupported(),
            notice: None,
        }
    }
}

/// Conversation state machine over the pending-transaction workspace
pub struct Dispatcher {
    pub(super) workspace: Arc<PendingWorkspace>,
    pub(super) dedup: Arc<DedupGuard>,
    pub(super) collaborators: Collaborators,
    pub(super) archive: Option<ImageArchive>,
    pub(super) settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        workspace: Arc<PendingWorkspace>,
        dedup: Arc<DedupGuard>,
        collaborators: Collaborators,
        archive: Option<ImageArchive>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            workspace,
            dedup,
            collaborators,
            archive,
            settings,
        }
    }

    pub fn workspace(&self) -> &Arc<PendingWorkspace> {
        &self.workspace
    }

    pub async fn dispatch(&self, msg: &InboundMessage) -> DispatchReply {
        self.dispatch_at(msg, Utc::now()).await
    }

    /// Dispatch with an explicit clock, used for dedup bookkeeping
    pub async fn dispatch_at(&self, msg: &InboundMessage, now: DateTime<Utc>) -> DispatchReply {
        let msg_id = msg.header.msg_id.as_deref();
        if self.dedup.observe(msg_id, now).await == Observation::Duplicate {
            info!(msg_id = ?msg_id, "Message already processed, skipping");
            return DispatchReply {
                payload: ReplyPayload::already_processed(),
                notice: None,
            };
        }

        let user_id = msg.user_id();
        debug!(user_id = %user_id, msg_type = %msg.msg_type(), msg_id = ?msg_id, "Dispatching message");

        match &msg.body {
            MessageBody::Text { content } => {
                let command = ConversationCommand::from_text(content);
                self.run_command(user_id, command).await
            }
            MessageBody::Image { media_id, .. } => self.handle_image(user_id, media_id, now).await,
            MessageBody::Event { event, event_key } => {
                self.handle_event(user_id, event, event_key.as_deref()).await
            }
            MessageBody::Unsupported { msg_type } => {
                debug!(user_id = %user_id, msg_type = %msg_type, "Unsupported message type");
                DispatchReply::unsupported()
            }
        }
    }

    /// Execute a conversation command and deliver its answer
    pub(super) async fn run_command(&self, user_id: &str, command: ConversationCommand) -> DispatchReply {
        debug!(user_id = %user_id, command = ?command, "Running command");
        let text = match command {
            ConversationCommand::Confirm => self.confirm_latest(user_id).await,
            ConversationCommand::Cancel => self.cancel_latest(user_id).await,
            ConversationCommand::Menu => t("menu"),
            ConversationCommand::Help(HelpTopic::Recording) => t("help-recording"),
            ConversationCommand::Help(HelpTopic::Usage) => t("help-usage"),
            ConversationCommand::ShowLedger => self.ledger_summary(user_id).await,
            ConversationCommand::AdminLink => self.admin_link(user_id).await,
            ConversationCommand::Unknown(content) => {
                t_args("unknown-command", &[("content", content.as_str())])
            }
        };
        self.reply(user_id, text).await
    }

    /// Send `text` to the user; delivery failures are logged, never propagated
    pub(super) async fn reply(&self, user_id: &str, text: String) -> DispatchReply {
        let messenger = Arc::clone(&self.collaborators.messenger);
        if let Err(e) = self
            .bounded("send text", messenger.send_text(user_id, &text))
            .await
        {
            error!(user_id = %user_id, error = %e, "Failed to deliver reply text");
        }
        DispatchReply::success(Some(text))
    }

    /// Run a collaborator call under the configured time budget
    pub(super) async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, UpstreamError>
    where
        F: Future<Output = Result<T, UpstreamError>>,
    {
        match tokio::time::timeout(self.settings.collaborator_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation = operation, timeout_secs = self.settings.collaborator_timeout.as_secs(), "Collaborator call timed out");
                Err(UpstreamError::Timeout(operation.to_string()))
            }
        }
    }

    async fn handle_image(&self, user_id: &str, media_id: &str, now: DateTime<Utc>) -> DispatchReply {
        debug!(user_id = %user_id, media_id = %media_id, "Received image message");

        let media = Arc::clone(&self.collaborators.media);
        let bytes = match self.bounded("media download", media.download(media_id)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to download image for user");
                return self.reply(user_id, t("download-failed")).await;
            }
        };

        let format = match sniff_format(&bytes) {
            Ok(format) => format,
            Err(rejection) => {
                warn!(user_id = %user_id, reason = %rejection, "Receipt image rejected");
                return self.reply(user_id, t("unsupported-image")).await;
            }
        };

        let archived = match &self.archive {
            Some(archive) => match archive.save(user_id, now.timestamp(), format, &bytes).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Could not archive receipt image");
                    None
                }
            },
            None => None,
        };

        let recognizer = Arc::clone(&self.collaborators.recognizer);
        let recognition = match tokio::time::timeout(
            self.settings.collaborator_timeout,
            recognizer.recognize(&bytes, archived.as_deref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(user_id = %user_id, "Recognition timed out");
                RecognitionResult::failure(t("recognition-timeout"))
            }
        };

        if !recognition.success {
            let reason = recognition
                .error
                .clone()
                .unwrap_or_else(|| t("recognition-failed-default"));
            warn!(user_id = %user_id, reason = %reason, "Recognition failed");
            return self
                .reply(user_id, t_args("recognition-failed", &[("error", reason.as_str())]))
                .await;
        }

        if self.settings.deep_link_enabled && recognition.deep_link_enabled {
            info!(user_id = %user_id, "Deep-link mode, skipping confirmation workflow");
            let text = super::ui_builder::deep_link_message(&recognition);
            return self.reply(user_id, text).await;
        }

        let image_ref = archived.map(|path| self.image_ref(&path));
        let today = now.with_timezone(&Local).date_naive();
        match recognition.to_fields(image_ref, today) {
            Some(fields) => self.stage_and_request_confirmation(user_id, fields).await,
            None => {
                let reason = t("recognition-missing-amount");
                warn!(user_id = %user_id, "Recognition succeeded without an amount");
                self.reply(user_id, t_args("recognition-failed", &[("error", reason.as_str())]))
                    .await
            }
        }
    }

    /// Public URL of an archived image, or its local path without a base URL
    fn image_ref(&self, path: &Path) -> String {
        let file_name = path.file_name().map(|name| name.to_string_lossy());
        match (&self.settings.image_base_url, file_name) {
            (Some(base), Some(name)) => format!("{}/{name}", base.trim_end_matches('/')),
            _ => path.display().to_string(),
        }
    }
}
