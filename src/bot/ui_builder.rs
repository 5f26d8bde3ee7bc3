//! UI Builder module for cards and formatted replies

use crate::ledger::LedgerEntry;
use crate::localization::{t, t_args};
use crate::recognition::RecognitionResult;
use crate::wecom::ConfirmationCard;
use crate::workspace::TransactionFields;

/// Render an amount the way receipts show it
pub fn format_amount(amount: f64) -> String {
    format!("¥{amount:.2}")
}

/// Build the confirmation card for a staged transaction
pub fn confirmation_card(fields: &TransactionFields, url: &str) -> ConfirmationCard {
    let amount = format_amount(fields.amount);
    let date = fields.date.format("%Y-%m-%d").to_string();
    let description = fields
        .description
        .clone()
        .unwrap_or_else(|| t("card-no-description"));

    ConfirmationCard {
        title: t("card-title"),
        description: t_args(
            "card-description",
            &[
                ("amount", amount.as_str()),
                ("vendor", fields.vendor.as_str()),
                ("category", fields.category.as_str()),
                ("date", date.as_str()),
                ("description", description.as_str()),
            ],
        ),
        url: url.to_string(),
        button_text: t("card-button"),
    }
}

/// Text sent in deep-link mode
pub fn deep_link_message(result: &RecognitionResult) -> String {
    match result.deep_link_url.as_deref() {
        Some(url) if result.category_choose == Some(false) => {
            t_args("deep-link-ready-skip-category", &[("url", url)])
        }
        Some(url) => t_args("deep-link-ready", &[("url", url)]),
        None => t("deep-link-failed"),
    }
}

/// Most recent ledger entries as a short list
pub fn format_ledger_summary(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return t("ledger-empty");
    }

    let count = entries.len().to_string();
    let mut lines = vec![t_args("ledger-header", &[("count", count.as_str())])];
    for entry in entries {
        let date = entry.transaction_date.format("%Y-%m-%d").to_string();
        let amount = format_amount(entry.amount);
        lines.push(t_args(
            "ledger-line",
            &[
                ("date", date.as_str()),
                ("vendor", entry.vendor.as_str()),
                ("amount", amount.as_str()),
                ("category", entry.category.as_str()),
            ],
        ));
    }
    lines.join("\n")
}
