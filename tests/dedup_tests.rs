use bookkeeper::dedup::{DedupGuard, Observation};
use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

#[tokio::test]
async fn test_repeat_within_window_is_duplicate() {
    let guard = DedupGuard::default();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    assert_eq!(guard.observe(Some("m1"), t0).await, Observation::First);
    assert_eq!(
        guard.observe(Some("m1"), t0 + Duration::hours(23)).await,
        Observation::Duplicate
    );
    assert_eq!(
        guard.observe(Some("m1"), t0 + Duration::hours(24)).await,
        Observation::Duplicate
    );
}

#[tokio::test]
async fn test_id_is_new_again_after_window() {
    let guard = DedupGuard::default();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    guard.observe(Some("m1"), t0).await;
    let later = t0 + Duration::hours(24) + Duration::seconds(1);
    assert_eq!(guard.observe(Some("m1"), later).await, Observation::First);
}

#[tokio::test]
async fn test_repeat_does_not_extend_window() {
    let guard = DedupGuard::default();
    let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    guard.observe(Some("m1"), t0).await;
    guard.observe(Some("m1"), t0 + Duration::hours(20)).await;
    let later = t0 + Duration::hours(25);
    assert_eq!(guard.observe(Some("m1"), later).await, Observation::First);
}

#[tokio::test]
async fn test_missing_ids_are_never_duplicates() {
    let guard = DedupGuard::default();
    let now = Utc::now();

    assert_eq!(guard.observe(None, now).await, Observation::First);
    assert_eq!(guard.observe(None, now).await, Observation::First);
    assert!(guard.is_empty().await);
}

#[tokio::test]
async fn test_concurrent_observers_see_one_first() {
    let guard = Arc::new(DedupGuard::default());
    let now = Utc::now();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let guard = Arc::clone(&guard);
            tokio::spawn(async move { guard.observe(Some("same"), now).await })
        })
        .collect();

    let mut firsts = 0;
    for handle in handles {
        if handle.await.unwrap() == Observation::First {
            firsts += 1;
        }
    }
    assert_eq!(firsts, 1);
}
