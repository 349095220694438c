use super::*;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use serde_json::json;

#[test]
fn row_query_builder_collects_clauses() {
    let query = RowQuery::new()
        .eq("email", "ada@example.com")
        .order_by("created_at", SortOrder::Descending)
        .limit(1);
    assert_eq!(
        query.filters,
        vec![("email".to_string(), "ada@example.com".to_string())]
    );
    assert_eq!(
        query.order,
        Some(("created_at".to_string(), SortOrder::Descending))
    );
    assert_eq!(query.limit, Some(1));
    assert_eq!(query.bearer, None);
}

#[test]
fn row_query_debug_hides_bearer() {
    let query = RowQuery::new().bearer("secret-jwt");
    let printed = format!("{query:?}");
    assert!(printed.contains("<redacted>"));
    assert!(!printed.contains("secret-jwt"));
}

#[tokio::test]
async fn subscription_yields_rows_then_ends_when_feed_closes() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut subscription = InsertSubscription::new("contact_submissions", rx, || {});
    assert_eq!(subscription.table(), "contact_submissions");

    tx.send(json!({ "id": 1 })).expect("send");
    assert_eq!(subscription.next().await, Some(json!({ "id": 1 })));

    drop(tx);
    assert_eq!(subscription.next().await, None);
}

#[test]
fn dropping_subscription_releases_exactly_once() {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let (_tx, rx) = mpsc::unbounded_channel();
    let subscription = InsertSubscription::new("contact_submissions", rx, move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    subscription.unsubscribe();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

#[test]
fn rejected_error_keeps_backend_message() {
    let err = BackendError::Rejected {
        status: 409,
        message: "duplicate key".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "backend rejected request (409): duplicate key"
    );
}
