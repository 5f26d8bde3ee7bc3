use bookkeeper::workspace::{PendingWorkspace, TransactionFields};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::Arc;

fn fields(amount: f64) -> TransactionFields {
    TransactionFields {
        amount,
        vendor: "Cafe".to_string(),
        category: "餐饮".to_string(),
        date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        description: None,
        image_ref: None,
    }
}

#[tokio::test]
async fn test_concurrent_stage_keeps_every_entry() {
    let workspace = Arc::new(PendingWorkspace::new());

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let workspace = Arc::clone(&workspace);
            tokio::spawn(async move { workspace.stage("alice", fields(i as f64)).await })
        })
        .collect();

    let mut keys = HashSet::new();
    for handle in handles {
        keys.insert(handle.await.unwrap());
    }

    assert_eq!(keys.len(), 32);
    assert_eq!(workspace.pending_count("alice").await, 32);
    assert_eq!(workspace.latest_key("alice").await, keys.iter().max().copied());
}

#[tokio::test]
async fn test_concurrent_confirm_has_single_winner() {
    let workspace = Arc::new(PendingWorkspace::new());
    let key = workspace.stage("bob", fields(10.0)).await;

    let a = {
        let workspace = Arc::clone(&workspace);
        tokio::spawn(async move { workspace.confirm("bob", key).await })
    };
    let b = {
        let workspace = Arc::clone(&workspace);
        tokio::spawn(async move { workspace.confirm("bob", key).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(workspace.pending_count("bob").await, 0);
}

#[tokio::test]
async fn test_confirm_and_cancel_race() {
    let workspace = Arc::new(PendingWorkspace::new());
    let key = workspace.stage("carol", fields(3.0)).await;

    let confirm = {
        let workspace = Arc::clone(&workspace);
        tokio::spawn(async move { workspace.confirm("carol", key).await.is_some() })
    };
    let cancel = {
        let workspace = Arc::clone(&workspace);
        tokio::spawn(async move { workspace.cancel("carol", key).await })
    };

    let confirmed = confirm.await.unwrap();
    let cancelled = cancel.await.unwrap();
    assert!(confirmed ^ cancelled);
}

#[tokio::test]
async fn test_absent_user_operations() {
    let workspace = PendingWorkspace::new();
    let key = workspace.stage("dave", fields(1.0)).await;

    assert!(workspace.latest_key("nobody").await.is_none());
    assert!(workspace.confirm("nobody", key).await.is_none());
    assert!(!workspace.cancel("nobody", key).await);
    assert_eq!(workspace.pending_count("dave").await, 1);
}

#[tokio::test]
async fn test_latest_moves_back_after_removal() {
    let workspace = PendingWorkspace::new();
    let first = workspace.stage("erin", fields(1.0)).await;
    let second = workspace.stage("erin", fields(2.0)).await;

    assert_eq!(workspace.latest_key("erin").await, Some(second));
    assert!(workspace.cancel("erin", second).await);
    assert_eq!(workspace.latest_key("erin").await, Some(first));

    let taken = workspace.confirm("erin", first).await.unwrap();
    assert_eq!(taken.amount, 1.0);
    assert_eq!(workspace.user_count().await, 0);
}
