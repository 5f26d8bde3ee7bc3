//! # Configuration Module
//!
//! Runtime settings read from the environment (after `.env` is loaded), plus the
//! recovery knobs used by the recognition client.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WECOM_API_BASE: &str = "https://qyapi.weixin.qq.com";
pub const DEFAULT_AI_API_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AI_MODEL_NAME: &str = "gpt-4o-mini";
pub const DEFAULT_PENETRATE_URL: &str = "http://localhost:8000";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
pub const DEFAULT_IMAGE_ARCHIVE_DIR: &str = "log";
pub const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DEDUP_CAPACITY: usize = 100_000;
pub const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024; // 10MB limit for receipt images

/// Recovery configuration for calls to the recognition service
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single recognition request in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
            operation_timeout_secs: 25,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Credentials and endpoint of the messaging platform API
#[derive(Debug, Clone)]
pub struct WeComConfig {
    pub corp_id: String,
    pub secret: String,
    pub agent_id: String,
    pub api_base: String,
}

/// Recognition service settings
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub model_name: String,
    pub recovery: RecoveryConfig,
}

/// Deep-link mode settings
#[derive(Debug, Clone, Default)]
pub struct DeepLinkConfig {
    /// Bypass the confirm workflow and reply with an app deep link
    pub enabled: bool,
    /// Let the app prompt for a category instead of pre-filling it
    pub category_choose: bool,
}

/// Top-level application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    pub crypto_gateway_url: String,
    pub penetrate_url: String,
    pub image_archive_dir: PathBuf,
    pub collaborator_timeout: Duration,
    pub dedup_capacity: usize,
    pub wecom: WeComConfig,
    pub ai: AiConfig,
    pub deep_link: DeepLinkConfig,
}

impl Settings {
    /// Read settings from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{key} must be set"))
        };
        let or_default = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let collaborator_timeout_secs = match lookup("COLLABORATOR_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("COLLABORATOR_TIMEOUT_SECS is not a number: {raw}"))?,
            None => DEFAULT_COLLABORATOR_TIMEOUT_SECS,
        };
        let dedup_capacity = match lookup("DEDUP_CAPACITY") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .with_context(|| format!("DEDUP_CAPACITY is not a number: {raw}"))?,
            None => DEFAULT_DEDUP_CAPACITY,
        };

        Ok(Self {
            bind_addr: or_default("BIND_ADDR", DEFAULT_BIND_ADDR),
            database_url: required("DATABASE_URL")?,
            crypto_gateway_url: required("CRYPTO_GATEWAY_URL")?,
            penetrate_url: or_default("PENETRATE_URL", DEFAULT_PENETRATE_URL),
            image_archive_dir: PathBuf::from(or_default(
                "IMAGE_ARCHIVE_DIR",
                DEFAULT_IMAGE_ARCHIVE_DIR,
            )),
            collaborator_timeout: Duration::from_secs(collaborator_timeout_secs),
            dedup_capacity,
            wecom: WeComConfig {
                corp_id: required("WECOM_CORP_ID")?,
                secret: required("WECOM_SECRET")?,
                agent_id: required("WECOM_AGENT_ID")?,
                api_base: or_default("WECOM_API_BASE", DEFAULT_WECOM_API_BASE),
            },
            ai: AiConfig {
                api_key: required("AI_API_KEY")?,
                api_base_url: or_default("AI_API_BASE_URL", DEFAULT_AI_API_BASE_URL),
                model_name: or_default("AI_MODEL_NAME", DEFAULT_AI_MODEL_NAME),
                recovery: RecoveryConfig::default(),
            },
            deep_link: DeepLinkConfig {
                enabled: parse_flag(lookup("QIANJI_ENABLED").as_deref(), false),
                category_choose: parse_flag(lookup("QIANJI_CATE_CHOOSE").as_deref(), true),
            },
        })
    }
}

/// Interpret a boolean environment flag, falling back to `default` when unset
pub fn parse_flag(raw: Option<&str>, default: bool) -> bool {
    match raw.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}
