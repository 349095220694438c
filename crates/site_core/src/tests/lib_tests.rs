use super::*;
use crate::fake_backend::FakeBackend;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn check_backend_reads_one_contact_row() {
    let backend = FakeBackend::new();
    let ctx = SiteContext::new(backend.clone(), "resume");
    ctx.check_backend().await.expect("reachable");
    assert_eq!(backend.selects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn check_backend_reports_connection_error() {
    let backend = FakeBackend::new();
    backend.offline.store(true, Ordering::SeqCst);
    let ctx = SiteContext::new(backend, "resume");
    let err = ctx.check_backend().await.expect_err("offline");
    assert!(matches!(err, SiteError::Network(_)));
    assert_eq!(
        err.to_string(),
        "Could not connect to the database. Please try again later."
    );
}
