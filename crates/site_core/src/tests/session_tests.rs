use super::*;
use crate::fake_backend::{FakeBackend, ADMIN_EMAIL, ADMIN_PASSWORD, EXPIRED_EMAIL};
use std::sync::atomic::Ordering;

#[tokio::test]
async fn sign_in_publishes_session_to_subscribers() {
    let backend = FakeBackend::new();
    let provider = SessionProvider::new(backend.clone());
    let watcher = provider.subscribe();
    assert!(watcher.borrow().is_none());

    let session = provider
        .sign_in(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .expect("sign in");
    assert_eq!(session.email, ADMIN_EMAIL);
    assert_eq!(watcher.borrow().as_ref(), Some(&session));
    assert_eq!(provider.current(), Some(session));
}

#[tokio::test]
async fn invalid_credentials_are_an_auth_error() {
    let backend = FakeBackend::new();
    let provider = SessionProvider::new(backend);
    let err = provider
        .sign_in(ADMIN_EMAIL, "wrong-horse")
        .await
        .expect_err("bad password");
    match err {
        SiteError::Auth(message) => assert_eq!(message, "Invalid login credentials"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(provider.current().is_none());
}

#[tokio::test]
async fn connectivity_failure_during_sign_in_is_an_auth_error() {
    let backend = FakeBackend::new();
    backend.offline.store(true, Ordering::SeqCst);
    let provider = SessionProvider::new(backend);
    let err = provider
        .sign_in(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .expect_err("offline");
    assert!(matches!(err, SiteError::Auth(_)));
}

#[tokio::test]
async fn malformed_login_never_reaches_backend() {
    let backend = FakeBackend::new();
    let provider = SessionProvider::new(backend.clone());
    let err = provider
        .sign_in("not-an-email", "12345")
        .await
        .expect_err("invalid");
    let SiteError::Validation(errors) = err else {
        panic!("expected validation error");
    };
    assert_eq!(errors.for_field("email"), Some("Invalid email address"));
    assert_eq!(
        errors.for_field("password"),
        Some("Password must be at least 6 characters")
    );
    assert_eq!(backend.sign_in_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sign_out_clears_locally_even_when_backend_fails() {
    let backend = FakeBackend::new();
    backend.fail_sign_out.store(true, Ordering::SeqCst);
    let provider = SessionProvider::new(backend.clone());
    let watcher = provider.subscribe();
    provider
        .sign_in(ADMIN_EMAIL, ADMIN_PASSWORD)
        .await
        .expect("sign in");

    let err = provider.sign_out().await.expect_err("backend down");
    assert!(matches!(err, SiteError::Network(_)));
    assert!(provider.current().is_none());
    assert!(watcher.borrow().is_none());
    assert_eq!(backend.sign_out_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sign_out_without_session_is_a_no_op() {
    let backend = FakeBackend::new();
    let provider = SessionProvider::new(backend.clone());
    provider.sign_out().await.expect("nothing to do");
    assert_eq!(backend.sign_out_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_session_reads_as_absent() {
    let backend = FakeBackend::new();
    let provider = SessionProvider::new(backend);
    let watcher = provider.subscribe();
    provider
        .sign_in(EXPIRED_EMAIL, ADMIN_PASSWORD)
        .await
        .expect("sign in");

    assert!(provider.current().is_none());
    assert!(!provider.is_signed_in());
    assert!(watcher.borrow().is_none());
}
