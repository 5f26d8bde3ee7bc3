//! # Pending Transaction Workspace
//!
//! Per-user staging area for receipts that were recognized but not yet confirmed.
//! Keys come from a process-wide sequence, so the latest entry for a user is simply
//! the largest key in that user's bucket.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Identifier of a staged transaction, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PendingKey(u64);

impl PendingKey {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PendingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bookkeeping fields extracted from a receipt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionFields {
    pub amount: f64,
    pub vendor: String,
    pub category: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    /// Where the source image was archived, if it was
    pub image_ref: Option<String>,
}

/// A recognized receipt waiting for the user's confirmation
#[derive(Debug, Clone, PartialEq)]
pub struct PendingTransaction {
    pub user_id: String,
    pub key: PendingKey,
    pub created_at: DateTime<Utc>,
    pub fields: TransactionFields,
}

/// Concurrent staging area keyed by user id
#[derive(Debug, Default)]
pub struct PendingWorkspace {
    buckets: Mutex<HashMap<String, BTreeMap<PendingKey, PendingTransaction>>>,
    sequence: AtomicU64,
}

impl PendingWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new transaction for `user_id` and return its key
    pub async fn stage(&self, user_id: &str, fields: TransactionFields) -> PendingKey {
        let mut buckets = self.buckets.lock().await;
        // Drawn under the lock so key order matches insertion order
        let key = PendingKey(self.sequence.fetch_add(1, Ordering::Relaxed) + 1);
        let pending = PendingTransaction {
            user_id: user_id.to_string(),
            key,
            created_at: Utc::now(),
            fields,
        };

        let bucket = buckets.entry(user_id.to_string()).or_default();
        bucket.insert(key, pending);
        info!(user_id = %user_id, key = %key, pending = bucket.len(), "Staged pending transaction");
        key
    }

    /// Key of the most recently staged transaction for the user
    pub async fn latest_key(&self, user_id: &str) -> Option<PendingKey> {
        let buckets = self.buckets.lock().await;
        buckets
            .get(user_id)
            .and_then(|bucket| bucket.keys().next_back().copied())
    }

    pub async fn peek(&self, user_id: &str, key: PendingKey) -> Option<TransactionFields> {
        let buckets = self.buckets.lock().await;
        buckets
            .get(user_id)
            .and_then(|bucket| bucket.get(&key))
            .map(|pending| pending.fields.clone())
    }

    /// Remove the entry and hand its fields to the caller for persistence.
    ///
    /// Of several concurrent calls for the same key at most one gets `Some`.
    pub async fn confirm(&self, user_id: &str, key: PendingKey) -> Option<TransactionFields> {
        let removed = self.remove(user_id, key).await?;
        debug!(user_id = %user_id, key = %key, "Pending transaction taken for confirmation");
        Some(removed.fields)
    }

    /// Discard the entry; `false` when nothing was staged under `key`
    pub async fn cancel(&self, user_id: &str, key: PendingKey) -> bool {
        let removed = self.remove(user_id, key).await.is_some();
        if removed {
            debug!(user_id = %user_id, key = %key, "Pending transaction cancelled");
        }
        removed
    }

    /// Number of staged transactions for the user
    pub async fn pending_count(&self, user_id: &str) -> usize {
        let buckets = self.buckets.lock().await;
        buckets.get(user_id).map_or(0, BTreeMap::len)
    }

    /// Number of users with at least one staged transaction
    pub async fn user_count(&self) -> usize {
        self.buckets.lock().await.len()
    }

    async fn remove(&self, user_id: &str, key: PendingKey) -> Option<PendingTransaction> {
        let mut buckets = self.buckets.lock().await;
        let bucket = buckets.get_mut(user_id)?;
        let removed = bucket.remove(&key);
        if bucket.is_empty() {
            buckets.remove(user_id);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(amount: f64) -> TransactionFields {
        TransactionFields {
            amount,
            vendor: "Bakery".to_string(),
            category: "餐饮".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            description: None,
            image_ref: None,
        }
    }

    #[tokio::test]
    async fn test_keys_increase_across_users() {
        let workspace = PendingWorkspace::new();
        let a = workspace.stage("alice", fields(1.0)).await;
        let b = workspace.stage("bob", fields(2.0)).await;
        let c = workspace.stage("alice", fields(3.0)).await;

        assert!(a < b && b < c);
        assert_eq!(workspace.latest_key("alice").await, Some(c));
        assert_eq!(workspace.latest_key("bob").await, Some(b));
    }

    #[tokio::test]
    async fn test_peek_does_not_remove() {
        let workspace = PendingWorkspace::new();
        let key = workspace.stage("alice", fields(9.9)).await;

        assert_eq!(workspace.peek("alice", key).await, Some(fields(9.9)));
        assert_eq!(workspace.peek("bob", key).await, None);
        assert_eq!(workspace.pending_count("alice").await, 1);
    }

    #[tokio::test]
    async fn test_cancelling_older_entry_keeps_latest() {
        let workspace = PendingWorkspace::new();
        let older = workspace.stage("alice", fields(1.0)).await;
        let newer = workspace.stage("alice", fields(2.0)).await;

        assert!(workspace.cancel("alice", older).await);
        assert_eq!(workspace.latest_key("alice").await, Some(newer));
        assert_eq!(workspace.user_count().await, 1);
    }
}
