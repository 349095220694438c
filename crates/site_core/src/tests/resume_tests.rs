use super::*;
use crate::fake_backend::FakeBackend;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn picks_most_recent_upload() {
    let backend = FakeBackend::new();
    backend.put_object("cv-2023.pdf", "2023-01-01T00:00:00Z", Some("application/pdf"), b"old");
    backend.put_object("cv-2024.pdf", "2024-01-01T00:00:00Z", None, b"new");

    let resume = latest(backend.as_ref(), "resume")
        .await
        .expect("download")
        .expect("present");
    assert_eq!(resume.name, "cv-2024.pdf");
    assert_eq!(resume.content_type, DEFAULT_CONTENT_TYPE);
    assert_eq!(resume.bytes, b"new");
}

#[tokio::test]
async fn empty_bucket_is_none() {
    let backend = FakeBackend::new();
    assert!(latest(backend.as_ref(), "resume").await.expect("list").is_none());
}

#[tokio::test]
async fn storage_failure_is_a_network_error() {
    let backend = FakeBackend::new();
    backend.offline.store(true, Ordering::SeqCst);
    let err = latest(backend.as_ref(), "resume").await.expect_err("offline");
    assert!(matches!(err, SiteError::Network(_)));
}
