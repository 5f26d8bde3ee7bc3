//! # Platform API Client
//!
//! Outbound messages and media downloads go through the platform's REST API with a
//! cached access token.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::WeComConfig;
use crate::errors::UpstreamError;

/// Refresh the token this long before the platform says it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Text card asking the user to confirm a staged transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationCard {
    pub title: String,
    pub description: String,
    pub url: String,
    pub button_text: String,
}

/// Outbound messaging collaborator
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), UpstreamError>;

    async fn send_confirmation_card(
        &self,
        user_id: &str,
        card: &ConfirmationCard,
    ) -> Result<(), UpstreamError>;
}

/// Source of media attached to inbound messages
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn download(&self, media_id: &str) -> Result<Vec<u8>, UpstreamError>;
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// REST client for the messaging platform
pub struct WeComClient {
    http: reqwest::Client,
    config: WeComConfig,
    token: Mutex<Option<CachedToken>>,
}

impl WeComClient {
    pub fn new(config: WeComConfig, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base.trim_end_matches('/'))
    }

    /// Current access token, fetching a new one when the cached one is stale
    async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response: TokenResponse = self
            .http
            .get(self.endpoint("/cgi-bin/gettoken"))
            .query(&[
                ("corpid", self.config.corp_id.as_str()),
                ("corpsecret", self.config.secret.as_str()),
            ])
            .send()
            .await?
            .json()
            .await?;

        if response.errcode != 0 {
            return Err(UpstreamError::Messaging(format!(
                "Failed to get access token: {}",
                response.errmsg
            )));
        }

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        info!(expires_in = response.expires_in, "Fetched platform access token");
        *cached = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    async fn send(&self, payload: serde_json::Value) -> Result<(), UpstreamError> {
        let token = self.access_token().await?;
        let response: ApiResponse = self
            .http
            .post(self.endpoint("/cgi-bin/message/send"))
            .query(&[("access_token", token.as_str())])
            .json(&payload)
            .send()
            .await?
            .json()
            .await?;

        if response.errcode != 0 {
            return Err(UpstreamError::Messaging(format!(
                "message/send errcode {}: {}",
                response.errcode, response.errmsg
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for WeComClient {
    async fn send_text(&self, user_id: &str, text: &str) -> Result<(), UpstreamError> {
        debug!(user_id = %user_id, length = text.len(), "Sending text message");
        self.send(json!({
            "touser": user_id,
            "msgtype": "text",
            "agentid": self.config.agent_id,
            "text": { "content": text }
        }))
        .await
    }

    async fn send_confirmation_card(
        &self,
        user_id: &str,
        card: &ConfirmationCard,
    ) -> Result<(), UpstreamError> {
        debug!(user_id = %user_id, "Sending confirmation card");
        self.send(json!({
            "touser": user_id,
            "msgtype": "textcard",
            "agentid": self.config.agent_id,
            "textcard": {
                "title": card.title,
                "description": card.description,
                "url": card.url,
                "btntxt": card.button_text
            }
        }))
        .await
    }
}

#[async_trait]
impl MediaSource for WeComClient {
    async fn download(&self, media_id: &str) -> Result<Vec<u8>, UpstreamError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(self.endpoint("/cgi-bin/media/get"))
            .query(&[("access_token", token.as_str()), ("media_id", media_id)])
            .send()
            .await
            .map_err(|e| UpstreamError::Media(e.to_string()))?;

        if !response.status().is_success() {
            return Err(UpstreamError::Media(format!(
                "Failed to download media: {}",
                response.status()
            )));
        }

        // Errors come back as JSON with a 200 status
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Media(e.to_string()))?;
        if is_json {
            let body = String::from_utf8_lossy(&bytes);
            warn!(media_id = %media_id, body = %body, "Media download returned an error document");
            return Err(UpstreamError::Media(format!("media/get failed: {body}")));
        }

        Ok(bytes.to_vec())
    }
}
