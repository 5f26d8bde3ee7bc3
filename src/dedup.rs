//! # Delivery Dedup Guard
//!
//! The platform retries a callback when it does not get an answer fast enough, so
//! the same `MsgId` can arrive several times. The guard remembers every id it has
//! seen for a retention window and reports repeats as duplicates.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Outcome of observing a message id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    First,
    Duplicate,
}

#[derive(Debug, Default)]
struct SeenIds {
    first_seen: HashMap<String, DateTime<Utc>>,
    // Insertion order, oldest first; drives the sweep
    order: VecDeque<(DateTime<Utc>, String)>,
}

impl SeenIds {
    fn evict_front(&mut self) {
        if let Some((seen_at, id)) = self.order.pop_front() {
            if self.first_seen.get(&id) == Some(&seen_at) {
                self.first_seen.remove(&id);
            }
        }
    }
}

/// In-memory idempotency filter for retried deliveries
#[derive(Debug)]
pub struct DedupGuard {
    seen: Mutex<SeenIds>,
    retention: Duration,
    capacity: usize,
}

impl DedupGuard {
    /// Create a guard with the default 24 hour retention
    pub fn new(capacity: usize) -> Self {
        Self::with_retention(Duration::hours(DEFAULT_RETENTION_HOURS), capacity)
    }

    pub fn with_retention(retention: Duration, capacity: usize) -> Self {
        Self {
            seen: Mutex::new(SeenIds::default()),
            retention,
            capacity: capacity.max(1),
        }
    }

    /// Record `id` and report whether it was already seen inside the window.
    ///
    /// Ids that are absent or empty are never deduplicated.
    pub async fn observe(&self, id: Option<&str>, now: DateTime<Utc>) -> Observation {
        let mut seen = self.seen.lock().await;

        while let Some((seen_at, _)) = seen.order.front() {
            if now.signed_duration_since(*seen_at) > self.retention {
                seen.evict_front();
            } else {
                break;
            }
        }

        let id = match id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id,
            None => return Observation::First,
        };

        if seen.first_seen.contains_key(id) {
            debug!(msg_id = id, "Duplicate delivery suppressed");
            return Observation::Duplicate;
        }

        while seen.first_seen.len() >= self.capacity {
            seen.evict_front();
        }
        seen.first_seen.insert(id.to_string(), now);
        seen.order.push_back((now, id.to_string()));
        Observation::First
    }

    /// Number of ids currently remembered
    pub async fn len(&self) -> usize {
        self.seen.lock().await.first_seen.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DEDUP_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let guard = DedupGuard::new(2);
        assert_eq!(guard.observe(Some("a"), t0()).await, Observation::First);
        assert_eq!(guard.observe(Some("b"), t0()).await, Observation::First);
        assert_eq!(guard.observe(Some("c"), t0()).await, Observation::First);

        assert_eq!(guard.len().await, 2);
        // "a" was pushed out by the bound
        assert_eq!(guard.observe(Some("a"), t0()).await, Observation::First);
        assert_eq!(guard.observe(Some("c"), t0()).await, Observation::Duplicate);
    }

    #[tokio::test]
    async fn test_whitespace_id_is_not_tracked() {
        let guard = DedupGuard::default();
        assert_eq!(guard.observe(Some("   "), t0()).await, Observation::First);
        assert_eq!(guard.observe(Some("   "), t0()).await, Observation::First);
        assert!(guard.is_empty().await);
    }
}
