//! # Receipt Recognition
//!
//! The recognition service is an OpenAI-compatible multimodal chat endpoint. The
//! image goes in as a base64 data URL and the model is asked for a single JSON
//! object with the bookkeeping fields.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::config::{AiConfig, DeepLinkConfig};
use crate::deep_link::{build_addbill_url, BillDraft};
use crate::ledger::{CATEGORY_MAX_CHARS, VENDOR_MAX_CHARS};
use crate::localization::t;
use crate::media::{mime_for, sniff_format};
use crate::workspace::TransactionFields;

const SYSTEM_PROMPT: &str = "你是一名专业的记账助手，负责从收据、小票和支付截图中提取记账信息。只输出 JSON，不要输出任何解释。";

const EXTRACTION_PROMPT: &str = r#"请识别图片中的消费信息，并返回如下 JSON：
{"success": true, "amount": 金额数字, "vendor": "商家名称", "category": "类别", "transaction_date": "YYYY-MM-DD", "description": "简要备注"}
类别从以下选项中选择：餐饮、交通、购物、娱乐、居住、医疗、教育、其他。
如果图片中没有可识别的消费信息，返回 {"success": false, "error": "原因"}。"#;

lazy_static! {
    // First '{' to last '}' of the model output
    static ref JSON_OBJECT: Regex =
        Regex::new(r"(?s)\{.*\}").expect("JSON object pattern should be valid");
}

fn default_true() -> bool {
    true
}

/// Accept amounts written as numbers or as strings such as "¥42.50"
fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse().ok()
        }
        _ => None,
    })
}

/// Outcome of recognizing one receipt image
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecognitionResult {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, alias = "transactionDate")]
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Set by the recognizer when it produced an app deep link
    #[serde(skip)]
    pub deep_link_enabled: bool,
    #[serde(skip)]
    pub deep_link_url: Option<String>,
    /// Whether the deep link lets the app prompt for a category
    #[serde(skip)]
    pub category_choose: Option<bool>,
}

impl RecognitionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Transaction fields for staging; `None` without an amount.
    ///
    /// A missing or unparseable date falls back to `today`.
    pub fn to_fields(&self, image_ref: Option<String>, today: NaiveDate) -> Option<TransactionFields> {
        let amount = self.amount?;
        let date = self
            .transaction_date
            .as_deref()
            .and_then(parse_receipt_date)
            .unwrap_or(today);

        Some(TransactionFields {
            amount,
            vendor: truncate_chars(
                non_blank(&self.vendor).unwrap_or_else(|| t("card-unknown-vendor")),
                VENDOR_MAX_CHARS,
            ),
            category: truncate_chars(
                non_blank(&self.category).unwrap_or_else(|| t("card-default-category")),
                CATEGORY_MAX_CHARS,
            ),
            date,
            description: non_blank(&self.description),
            image_ref,
        })
    }
}

/// Cut `value` to at most `max` characters so it fits its ledger column
fn truncate_chars(value: String, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((cut, _)) => value[..cut].to_string(),
        None => value,
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parse the dates models tend to produce for receipts
pub fn parse_receipt_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split([' ', 'T']).next().unwrap_or(raw);
    ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y年%m月%d日"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Pull the JSON object out of a model reply that may wrap it in prose or fences
pub fn extract_json_object(reply: &str) -> Option<&str> {
    JSON_OBJECT.find(reply).map(|m| m.as_str())
}

/// Image recognition collaborator
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize a receipt; failures are reported inside the result
    async fn recognize(&self, image: &[u8], image_path: Option<&Path>) -> RecognitionResult;
}

/// Failure of one attempt against the completion API
enum Attempt {
    Retryable(String),
    Fatal(String),
}

/// Recognizer backed by an OpenAI-compatible chat-completions API
pub struct AiRecognizer {
    http: reqwest::Client,
    config: AiConfig,
    deep_link: DeepLinkConfig,
    breaker: CircuitBreaker,
}

impl AiRecognizer {
    pub fn new(config: AiConfig, deep_link: DeepLinkConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.recovery.operation_timeout_secs))
            .build()?;
        let breaker = CircuitBreaker::new(&config.recovery);
        Ok(Self {
            http,
            config,
            deep_link,
            breaker,
        })
    }

    fn request_body(&self, image: &[u8]) -> Value {
        let mime = sniff_format(image).map(mime_for).unwrap_or("image/jpeg");
        json!({
            "model": self.config.model_name,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": EXTRACTION_PROMPT },
                        {
                            "type": "image_url",
                            "image_url": { "url": format!("data:{mime};base64,{}", B64.encode(image)) }
                        }
                    ]
                }
            ],
            "temperature": 0.1,
            "max_tokens": 500
        })
    }

    async fn attempt(&self, body: &Value) -> Result<String, Attempt> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| Attempt::Retryable(format!("request failed: {e}")))?;

        let status = response.status();
        info!(model = %self.config.model_name, status = %status, "Recognition API responded");
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::Retryable(format!("status {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %text, "Recognition API rejected request");
            return Err(Attempt::Fatal(t("recognition-api-config")));
        }

        let completion: Value = response
            .json()
            .await
            .map_err(|e| Attempt::Retryable(format!("unreadable body: {e}")))?;
        if let Some(error) = completion.get("error") {
            warn!(error = %error, "Recognition API returned an error object");
            return Err(Attempt::Fatal(t("recognition-api-error")));
        }

        completion["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_string())
            .ok_or_else(|| Attempt::Fatal(t("recognition-bad-format")))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let recovery = &self.config.recovery;
        let exp = recovery
            .base_retry_delay_ms
            .saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(recovery.max_retry_delay_ms);
        let jitter = rand::thread_rng().gen_range(0..=capped / 4);
        Duration::from_millis(capped + jitter)
    }

    fn parse_reply(&self, reply: &str) -> RecognitionResult {
        let json = match extract_json_object(reply) {
            Some(json) => json,
            None => {
                warn!(reply = %reply, "Model reply contains no JSON object");
                return RecognitionResult::failure(t("recognition-bad-format"));
            }
        };

        let mut result: RecognitionResult = match serde_json::from_str(json) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, reply = %reply, "Model reply JSON did not parse");
                return RecognitionResult::failure(t("recognition-parse-error"));
            }
        };

        if result.success && self.deep_link.enabled {
            let draft = BillDraft {
                amount: result.amount,
                time: result.transaction_date.clone(),
                remark: non_blank(&result.description).or_else(|| non_blank(&result.vendor)),
                category: result.category.clone(),
            };
            result.deep_link_url = build_addbill_url(&draft, self.deep_link.category_choose);
            result.deep_link_enabled = true;
            result.category_choose = Some(self.deep_link.category_choose);
        }
        result
    }
}

#[async_trait]
impl Recognizer for AiRecognizer {
    async fn recognize(&self, image: &[u8], image_path: Option<&Path>) -> RecognitionResult {
        if let Some(path) = image_path {
            info!(path = %path.display(), size = image.len(), "Recognizing archived receipt");
        }

        if self.breaker.is_open() {
            warn!("Recognition circuit breaker is open, failing fast");
            return RecognitionResult::failure(t("recognition-unavailable"));
        }

        let body = self.request_body(image);
        let max_retries = self.config.recovery.max_retries;
        let mut attempt = 0;
        loop {
            match self.attempt(&body).await {
                Ok(reply) => {
                    self.breaker.record_success();
                    debug!(reply = %reply, "Model reply received");
                    return self.parse_reply(&reply);
                }
                Err(Attempt::Fatal(message)) => return RecognitionResult::failure(message),
                Err(Attempt::Retryable(reason)) => {
                    self.breaker.record_failure();
                    if attempt >= max_retries || self.breaker.is_open() {
                        warn!(reason = %reason, attempts = attempt + 1, "Recognition gave up");
                        return RecognitionResult::failure(t("recognition-service-down"));
                    }
                    let delay = self.backoff(attempt);
                    warn!(reason = %reason, delay_ms = delay.as_millis() as u64, "Retrying recognition");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
