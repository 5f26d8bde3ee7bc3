//! # Localization Module
//!
//! Canned replies live in a Fluent resource compiled into the binary, so the bot
//! answers the same way regardless of the working directory it was started from.

use anyhow::{anyhow, Result};
use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use lazy_static::lazy_static;
use tracing::warn;
use unic_langid::LanguageIdentifier;

pub const DEFAULT_LOCALE: &str = "zh-CN";

const ZH_CN_RESOURCE: &str = include_str!("../locales/zh-CN/main.ftl");

/// Localization manager for the bookkeeping bot
pub struct LocalizationManager {
    bundle: FluentBundle<FluentResource>,
}

impl LocalizationManager {
    /// Create a manager over the embedded default locale
    pub fn new() -> Result<Self> {
        Self::from_source(DEFAULT_LOCALE, ZH_CN_RESOURCE)
    }

    /// Create a manager from an arbitrary Fluent source
    pub fn from_source(locale: &str, source: &str) -> Result<Self> {
        let langid: LanguageIdentifier = locale.parse()?;
        let mut bundle = FluentBundle::new_concurrent(vec![langid]);
        // Replies go straight into chat text; bidi isolation marks would leak into it
        bundle.set_use_isolating(false);

        let resource = FluentResource::try_new(source.to_string())
            .map_err(|(_, errors)| anyhow!("Failed to parse {locale} resource: {errors:?}"))?;
        bundle
            .add_resource(resource)
            .map_err(|errors| anyhow!("Failed to add {locale} resource: {errors:?}"))?;

        Ok(Self { bundle })
    }

    /// Get a localized message
    pub fn get_message(&self, key: &str, args: Option<&FluentArgs>) -> String {
        let msg = match self.bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {key}"),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {key}"),
        };

        let mut errors = vec![];
        let value = self.bundle.format_pattern(pattern, args, &mut errors);
        if !errors.is_empty() {
            warn!(key = key, errors = ?errors, "Fluent formatting reported errors");
        }
        value.into_owned()
    }

    /// Get a localized message with simple string arguments
    pub fn get_message_with_args(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (name, value) in args {
            fluent_args.set(*name, FluentValue::from(*value));
        }
        self.get_message(key, Some(&fluent_args))
    }
}

lazy_static! {
    static ref LOCALIZATION_MANAGER: Option<LocalizationManager> = match LocalizationManager::new() {
        Ok(manager) => Some(manager),
        Err(e) => {
            tracing::error!(error = %e, "Embedded localization resource failed to load");
            None
        }
    };
}

/// Convenience function to get a localized message
pub fn t(key: &str) -> String {
    match LOCALIZATION_MANAGER.as_ref() {
        Some(manager) => manager.get_message(key, None),
        None => format!("Missing translation: {key}"),
    }
}

/// Convenience function to get a localized message with arguments
pub fn t_args(key: &str, args: &[(&str, &str)]) -> String {
    match LOCALIZATION_MANAGER.as_ref() {
        Some(manager) => manager.get_message_with_args(key, args),
        None => format!("Missing translation: {key}"),
    }
}
