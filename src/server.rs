//! # Webhook Server
//!
//! HTTP surface of the bot: the platform's URL verification handshake, the
//! encrypted message callback, a health check and the archived receipt images
//! that ledger entries link to.

use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::bot::Dispatcher;
use crate::crypto::EnvelopeCrypto;
use crate::envelope::{build_response, ReplyPayload};
use crate::errors::WebhookError;
use crate::message::{InboundMessage, SignatureParams};

/// Path the platform calls for both verification and messages
pub const CALLBACK_PATH: &str = "/api/v1/wecom/callback";

/// Route under which archived receipt images are served
pub const ARCHIVE_ROUTE: &str = "/log";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub crypto: Arc<dyn EnvelopeCrypto>,
    pub dispatcher: Arc<Dispatcher>,
    /// Directory served under [`ARCHIVE_ROUTE`]
    pub archive_dir: Option<PathBuf>,
}

/// Signature parameters as they arrive on the query string
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    msg_signature: Option<String>,
    timestamp: Option<String>,
    nonce: Option<String>,
    echostr: Option<String>,
}

impl CallbackQuery {
    /// Names of the required parameters that are absent or empty
    fn missing(&self, require_echo: bool) -> Vec<&'static str> {
        let absent = |value: &Option<String>| value.as_deref().map_or(true, str::is_empty);

        let mut missing = Vec::new();
        if absent(&self.msg_signature) {
            missing.push("msg_signature");
        }
        if absent(&self.timestamp) {
            missing.push("timestamp");
        }
        if absent(&self.nonce) {
            missing.push("nonce");
        }
        if require_echo && absent(&self.echostr) {
            missing.push("echostr");
        }
        missing
    }

    fn signature_params(&self) -> Result<SignatureParams, WebhookError> {
        let missing = self.missing(false);
        if !missing.is_empty() {
            return Err(WebhookError::MissingParameters(missing));
        }

        Ok(SignatureParams {
            msg_signature: self.msg_signature.clone().unwrap_or_default(),
            timestamp: self.timestamp.clone().unwrap_or_default(),
            nonce: self.nonce.clone().unwrap_or_default(),
        })
    }
}

/// Build the HTTP router
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route(CALLBACK_PATH, get(verify_url).post(receive_message))
        .route("/health", get(health_check));
    if let Some(dir) = &state.archive_dir {
        app = app.nest_service(ARCHIVE_ROUTE, ServeDir::new(dir));
    }
    app.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// URL verification handshake: answer with the decrypted `echostr`
async fn verify_url(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<String, WebhookError> {
    let missing = query.missing(true);
    if !missing.is_empty() {
        warn!(missing = ?missing, "URL verification missing parameters");
        return Err(WebhookError::MissingParameters(missing));
    }
    let params = query.signature_params()?;
    let echostr = query.echostr.unwrap_or_default();

    let echo = state
        .crypto
        .verify_and_decrypt_echo(&params, &echostr)
        .await
        .map_err(|e| {
            error!(error = %e, "URL verification failed");
            WebhookError::from(e)
        })?;

    if echo.is_empty() {
        warn!("URL verification produced an empty echo");
        return Err(WebhookError::EmptyEcho);
    }

    info!("URL verification succeeded");
    Ok(echo)
}

/// Encrypted message callback
async fn receive_message(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    body: String,
) -> Result<Response, WebhookError> {
    let params = query.signature_params().inspect_err(|e| {
        warn!(error = %e, "Message callback missing parameters");
    })?;

    let plaintext = state
        .crypto
        .decrypt_envelope(&params, &body)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to decrypt message callback");
            WebhookError::from(e)
        })?;

    let payload = match InboundMessage::from_xml(&plaintext) {
        Ok(msg) => {
            debug!(user_id = %msg.user_id(), msg_type = %msg.msg_type(), "Decrypted inbound message");
            let dispatcher = Arc::clone(&state.dispatcher);
            // Detached so a dropped connection cannot abort a half-done dispatch
            let task = tokio::spawn(async move { dispatcher.dispatch(&msg).await });
            match task.await {
                Ok(reply) => reply.payload,
                Err(e) => {
                    error!(error = %e, "Dispatch task failed");
                    ReplyPayload::success()
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not parse decrypted message");
            ReplyPayload::unsupported()
        }
    };

    let envelope = build_response(state.crypto.as_ref(), &payload, &params).await;
    Ok(([(header::CONTENT_TYPE, "application/xml")], envelope.to_xml()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(signature: Option<&str>, timestamp: Option<&str>, nonce: Option<&str>) -> CallbackQuery {
        CallbackQuery {
            msg_signature: signature.map(str::to_string),
            timestamp: timestamp.map(str::to_string),
            nonce: nonce.map(str::to_string),
            echostr: None,
        }
    }

    #[test]
    fn test_signature_params_all_present() {
        let params = query(Some("sig"), Some("1700000000"), Some("n1"))
            .signature_params()
            .unwrap();
        assert_eq!(params.msg_signature, "sig");
        assert_eq!(params.timestamp, "1700000000");
        assert_eq!(params.nonce, "n1");
    }

    #[test]
    fn test_verify_requires_echostr() {
        let q = query(Some("sig"), Some("1"), Some("n"));
        assert_eq!(q.missing(true), vec!["echostr"]);
        assert!(q.missing(false).is_empty());
    }

    #[test]
    fn test_signature_params_names_missing() {
        let err = query(Some("sig"), None, Some("")).signature_params().unwrap_err();
        assert_eq!(err.to_string(), "Missing required parameters: timestamp, nonce");
    }
}
