//! # Error Types Module
//!
//! Error types shared by the webhook transport and the collaborator adapters.
//! Transport and crypto errors surface as HTTP statuses; upstream errors never
//! leave the dispatcher and are turned into canned replies for the user.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Failures of the platform crypto gateway
#[derive(Debug, Clone)]
pub enum CryptoError {
    /// Signature did not verify against the request parameters
    Signature(String),
    /// Envelope or echo string could not be decrypted
    Decrypt(String),
    /// Reply payload could not be encrypted
    Encrypt(String),
    /// Gateway unreachable or answered garbage
    Gateway(String),
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::Signature(msg) => write!(f, "Signature error: {msg}"),
            CryptoError::Decrypt(msg) => write!(f, "Decrypt error: {msg}"),
            CryptoError::Encrypt(msg) => write!(f, "Encrypt error: {msg}"),
            CryptoError::Gateway(msg) => write!(f, "Crypto gateway error: {msg}"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Errors that end a webhook request before dispatch begins
#[derive(Debug)]
pub enum WebhookError {
    /// Required signature query parameters were absent
    MissingParameters(Vec<&'static str>),
    /// Verification or decryption failed
    Crypto(CryptoError),
    /// The gateway verified the echo but returned nothing
    EmptyEcho,
}

impl std::fmt::Display for WebhookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookError::MissingParameters(names) => {
                write!(f, "Missing required parameters: {}", names.join(", "))
            }
            WebhookError::Crypto(err) => write!(f, "{err}"),
            WebhookError::EmptyEcho => write!(f, "URL verification failed"),
        }
    }
}

impl std::error::Error for WebhookError {}

impl From<CryptoError> for WebhookError {
    fn from(err: CryptoError) -> Self {
        WebhookError::Crypto(err)
    }
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingParameters(_) => StatusCode::BAD_REQUEST,
            WebhookError::Crypto(_) | WebhookError::EmptyEcho => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Crypto details stay in the logs
        let body = match &self {
            WebhookError::MissingParameters(_) => self.to_string(),
            WebhookError::Crypto(_) | WebhookError::EmptyEcho => {
                "URL verification failed".to_string()
            }
        };
        (status, body).into_response()
    }
}

/// Failures of the remote collaborators called during dispatch
#[derive(Debug, Clone)]
pub enum UpstreamError {
    /// A collaborator call exceeded its time budget
    Timeout(String),
    /// The recognition service failed or returned an unusable answer
    Recognition(String),
    /// Outbound messaging failed
    Messaging(String),
    /// Media download failed
    Media(String),
    /// Ledger persistence failed
    Ledger(String),
    /// Admin link issuance failed
    AdminLink(String),
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamError::Timeout(msg) => write!(f, "Timeout error: {msg}"),
            UpstreamError::Recognition(msg) => write!(f, "Recognition error: {msg}"),
            UpstreamError::Messaging(msg) => write!(f, "Messaging error: {msg}"),
            UpstreamError::Media(msg) => write!(f, "Media error: {msg}"),
            UpstreamError::Ledger(msg) => write!(f, "Ledger error: {msg}"),
            UpstreamError::AdminLink(msg) => write!(f, "Admin link error: {msg}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err.to_string())
        } else {
            UpstreamError::Messaging(err.to_string())
        }
    }
}
