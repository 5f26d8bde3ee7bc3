//! Dialogue Manager module: the confirm / cancel workflow
//!
//! A recognized receipt is staged in the pending workspace and the user is asked
//! to confirm it. Confirmation and cancellation always act on the user's most
//! recently staged entry.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::message_handler::{DispatchReply, Dispatcher};
use super::ui_builder::{confirmation_card, format_ledger_summary};
use crate::admin::ADMIN_LINK_VALIDITY;
use crate::errors::UpstreamError;
use crate::localization::{t, t_args};
use crate::workspace::TransactionFields;

/// Number of entries listed by the ledger view
pub const LEDGER_SUMMARY_LIMIT: i64 = 5;

impl Dispatcher {
    /// Stage recognized fields and send the confirmation card
    pub(super) async fn stage_and_request_confirmation(
        &self,
        user_id: &str,
        fields: TransactionFields,
    ) -> DispatchReply {
        let card = confirmation_card(&fields, &self.settings.card_url);
        let key = self.workspace.stage(user_id, fields).await;
        info!(user_id = %user_id, key = %key, "Staged transaction awaiting confirmation");

        let messenger = Arc::clone(&self.collaborators.messenger);
        if let Err(e) = self
            .bounded("send card", messenger.send_confirmation_card(user_id, &card))
            .await
        {
            // The entry stays staged; the user can still confirm by text
            warn!(user_id = %user_id, key = %key, error = %e, "Failed to deliver confirmation card");
        }

        DispatchReply::success(Some(card.description))
    }

    /// Confirm the user's latest staged transaction into the ledger
    pub(super) async fn confirm_latest(&self, user_id: &str) -> String {
        let Some(key) = self.workspace.latest_key(user_id).await else {
            info!(user_id = %user_id, "Confirm requested with nothing pending");
            return t("no-pending-transaction");
        };

        let Some(fields) = self.workspace.confirm(user_id, key).await else {
            // Lost the race against a concurrent confirm or cancel
            info!(user_id = %user_id, key = %key, "Pending entry vanished before confirmation");
            return t("confirm-not-found");
        };

        let ledger = Arc::clone(&self.collaborators.ledger);
        let saved = self
            .bounded("ledger create", async {
                ledger
                    .create(user_id, &fields)
                    .await
                    .map_err(|e| UpstreamError::Ledger(format!("{e:#}")))
            })
            .await;

        match saved {
            Ok(entry) => {
                info!(user_id = %user_id, key = %key, entry_id = entry.id, "Transaction confirmed");
                t("confirm-success")
            }
            Err(e) => {
                error!(user_id = %user_id, key = %key, error = %e, "Failed to save confirmed transaction");
                t("ledger-save-failed")
            }
        }
    }

    /// Drop the user's latest staged transaction; a no-op when nothing is pending
    pub(super) async fn cancel_latest(&self, user_id: &str) -> String {
        match self.workspace.latest_key(user_id).await {
            Some(key) if self.workspace.cancel(user_id, key).await => {
                info!(user_id = %user_id, key = %key, "Transaction cancelled");
            }
            _ => info!(user_id = %user_id, "Cancel requested with nothing pending"),
        }
        t("transaction-cancelled")
    }

    pub(super) async fn ledger_summary(&self, user_id: &str) -> String {
        let ledger = Arc::clone(&self.collaborators.ledger);
        let recent = self
            .bounded("ledger recent", async {
                ledger
                    .recent(user_id, LEDGER_SUMMARY_LIMIT)
                    .await
                    .map_err(|e| UpstreamError::Ledger(format!("{e:#}")))
            })
            .await;

        match recent {
            Ok(entries) => format_ledger_summary(&entries),
            Err(e) => {
                error!(user_id = %user_id, error = %e, "Failed to read ledger");
                t("ledger-unavailable")
            }
        }
    }

    pub(super) async fn admin_link(&self, user_id: &str) -> String {
        let Some(issuer) = self.collaborators.admin_links.clone() else {
            return t("admin-link-unavailable");
        };

        let issued = self
            .bounded("admin link", async {
                issuer
                    .issue(user_id, ADMIN_LINK_VALIDITY)
                    .await
                    .map_err(|e| UpstreamError::AdminLink(format!("{e:#}")))
            })
            .await;

        match issued {
            Ok(url) => t_args("admin-link", &[("url", url.as_str())]),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to issue admin link");
                t("admin-link-unavailable")
            }
        }
    }
}
