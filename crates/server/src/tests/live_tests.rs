use super::*;
use std::{sync::Arc, time::Duration};

use backend::{AuthProvider, TableStore};
use chrono::TimeZone;
use serde_json::json;
use shared::domain::{MessageId, CONTACT_TABLE, RESUME_BUCKET};
use site_core::MessageList;
use storage::Storage;

fn message(id: &str, minute: u32) -> ContactMessage {
    ContactMessage {
        id: MessageId::from(id),
        name: format!("Visitor {id}"),
        email: "visitor@example.com".to_string(),
        message: "Hello there, nice portfolio".to_string(),
        created_at: Utc
            .with_ymd_and_hms(2024, 6, 1, 12, minute, 0)
            .single()
            .expect("timestamp"),
    }
}

async fn site() -> (SiteContext, Storage, Session) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .create_admin("admin@example.com", "correct-horse")
        .await
        .expect("admin");
    let session = storage
        .sign_in_with_password("admin@example.com", "correct-horse")
        .await
        .expect("sign in");
    (
        SiteContext::new(Arc::new(storage.clone()), RESUME_BUCKET),
        storage,
        session,
    )
}

async fn send_message(storage: &Storage, name: &str) -> ContactMessage {
    let row = storage
        .insert(
            CONTACT_TABLE,
            json!({
                "name": name,
                "email": format!("{}@example.com", name.to_lowercase()),
                "message": "I would like to talk about a role",
            }),
        )
        .await
        .expect("insert");
    serde_json::from_value(row).expect("message")
}

async fn next_name(events: &mut (impl Stream<Item = Update> + Unpin)) -> String {
    let update = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("event in time")
        .expect("stream open");
    match update.event {
        LiveEvent::MessageInserted { message } => message.name,
        other => panic!("unexpected event: {other:?}"),
    }
}

#[test]
fn watermark_admits_only_messages_past_it() {
    let mark = Watermark::covering(&[message("a", 1), message("b", 3), message("c", 3)]);
    assert!(!mark.admits(&message("a", 1)));
    assert!(!mark.admits(&message("b", 3)));
    assert!(mark.admits(&message("d", 3)));
    assert!(mark.admits(&message("e", 4)));

    assert!(Watermark::default().admits(&message("a", 1)));
}

#[test]
fn watermark_round_trips_through_its_text_form() {
    let mark = Watermark::covering(&[message("b", 3), message("a", 3)]);
    assert_eq!(mark.encode(), "2024-06-01T12:03:00Z~a,b");
    assert_eq!(Watermark::parse(&mark.encode()), Some(mark));

    assert_eq!(Watermark::default().encode(), "");
    assert_eq!(Watermark::parse(""), Some(Watermark::default()));
    assert_eq!(Watermark::parse("not a position"), None);
}

#[tokio::test]
async fn fresh_yields_unseen_messages_oldest_first_once() {
    let (site, _storage, session) = site().await;
    let mut feed = LiveFeed::open(&site, &session, None).await;

    let state = ListState::Ready(MessageList::from_snapshot(vec![
        message("a", 1),
        message("b", 2),
        message("c", 3),
    ]));
    let ids: Vec<String> = feed
        .fresh(&state)
        .into_iter()
        .map(|message| message.id.to_string())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!(feed.fresh(&state).is_empty());
    assert!(feed.fresh(&ListState::Loading).is_empty());
}

#[tokio::test]
async fn snapshot_messages_are_not_replayed() {
    let (site, storage, session) = site().await;
    send_message(&storage, "Old").await;

    let feed = LiveFeed::open(&site, &session, None).await;
    let mut events = Box::pin(feed.into_events());

    send_message(&storage, "New").await;
    assert_eq!(next_name(&mut events).await, "New");
}

#[tokio::test]
async fn resumed_feed_delivers_messages_sent_before_it_opened() {
    let (site, storage, session) = site().await;
    let shown = send_message(&storage, "Shown").await;
    let page = Watermark::covering(std::slice::from_ref(&shown));

    send_message(&storage, "Gap").await;
    let feed = LiveFeed::open(&site, &session, Some(page)).await;
    let mut events = Box::pin(feed.into_events());
    send_message(&storage, "Later").await;

    assert_eq!(next_name(&mut events).await, "Gap");
    assert_eq!(next_name(&mut events).await, "Later");
}

#[tokio::test]
async fn each_update_carries_the_position_after_it() {
    let (site, storage, session) = site().await;
    let feed = LiveFeed::open(&site, &session, None).await;
    let mut events = Box::pin(feed.into_events());

    let sent = send_message(&storage, "Ada").await;
    let update = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("event in time")
        .expect("stream open");
    assert_eq!(update.resume, Watermark::covering(std::slice::from_ref(&sent)));
    assert!(!update.resume.admits(&sent));
}
