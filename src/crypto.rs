//! # Crypto Gateway
//!
//! Signature checks and AES envelope handling belong to the platform's official
//! crypto library. The bot only sees them through [`EnvelopeCrypto`]; the shipped
//! adapter forwards every call to that library running as a local sidecar.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::CryptoError;
use crate::message::SignatureParams;

/// Verify/decrypt/encrypt operations on platform envelopes
#[async_trait]
pub trait EnvelopeCrypto: Send + Sync {
    /// Verify the URL-check signature and return the decrypted `echostr`
    async fn verify_and_decrypt_echo(
        &self,
        params: &SignatureParams,
        echostr: &str,
    ) -> Result<String, CryptoError>;

    /// Verify the request signature and decrypt the posted XML envelope
    async fn decrypt_envelope(
        &self,
        params: &SignatureParams,
        body: &str,
    ) -> Result<String, CryptoError>;

    /// Encrypt a plaintext reply payload
    async fn encrypt_envelope(&self, plaintext: &str) -> Result<String, CryptoError>;
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    msg_signature: &'a str,
    timestamp: &'a str,
    nonce: &'a str,
    echostr: &'a str,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    msg_signature: &'a str,
    timestamp: &'a str,
    nonce: &'a str,
    post_data: &'a str,
}

#[derive(Serialize)]
struct EncryptRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

/// HTTP client for the crypto sidecar
pub struct CryptoSidecar {
    http: reqwest::Client,
    base_url: String,
}

impl CryptoSidecar {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        operation: &str,
        body: &B,
    ) -> Result<GatewayResponse, CryptoError> {
        let url = format!("{}/{operation}", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CryptoError::Gateway(format!("{operation}: {e}")))?;

        if !response.status().is_success() {
            return Err(CryptoError::Gateway(format!(
                "{operation}: gateway answered {}",
                response.status()
            )));
        }

        let parsed: GatewayResponse = response
            .json()
            .await
            .map_err(|e| CryptoError::Gateway(format!("{operation}: {e}")))?;
        debug!(operation = operation, errcode = parsed.errcode, "Crypto gateway call finished");
        Ok(parsed)
    }
}

fn into_payload(
    response: GatewayResponse,
    on_error: fn(String) -> CryptoError,
) -> Result<String, CryptoError> {
    if response.errcode != 0 {
        let detail = format!(
            "errcode {}: {}",
            response.errcode,
            response.errmsg.unwrap_or_default()
        );
        warn!(detail = %detail, "Crypto gateway rejected request");
        return Err(on_error(detail));
    }
    response
        .data
        .ok_or_else(|| CryptoError::Gateway("response carried no data".to_string()))
}

#[async_trait]
impl EnvelopeCrypto for CryptoSidecar {
    async fn verify_and_decrypt_echo(
        &self,
        params: &SignatureParams,
        echostr: &str,
    ) -> Result<String, CryptoError> {
        let response = self
            .call(
                "verify_url",
                &VerifyRequest {
                    msg_signature: &params.msg_signature,
                    timestamp: &params.timestamp,
                    nonce: &params.nonce,
                    echostr,
                },
            )
            .await?;
        into_payload(response, CryptoError::Signature)
    }

    async fn decrypt_envelope(
        &self,
        params: &SignatureParams,
        body: &str,
    ) -> Result<String, CryptoError> {
        let response = self
            .call(
                "decrypt",
                &DecryptRequest {
                    msg_signature: &params.msg_signature,
                    timestamp: &params.timestamp,
                    nonce: &params.nonce,
                    post_data: body,
                },
            )
            .await?;
        into_payload(response, CryptoError::Decrypt)
    }

    async fn encrypt_envelope(&self, plaintext: &str) -> Result<String, CryptoError> {
        let response = self
            .call("encrypt", &EncryptRequest { message: plaintext })
            .await?;
        into_payload(response, CryptoError::Encrypt)
    }
}
