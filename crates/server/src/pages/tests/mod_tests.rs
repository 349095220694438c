use super::*;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{ContactMessage, MessageId},
    protocol::NoticeKind,
};

fn message(id: &str, second: u32) -> ContactMessage {
    ContactMessage {
        id: MessageId::from(id),
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        message: "Hello there, nice portfolio".to_string(),
        created_at: Utc
            .with_ymd_and_hms(2024, 6, 1, 12, 0, second)
            .single()
            .expect("timestamp"),
    }
}

#[test]
fn attachment_names_are_reduced_to_safe_characters() {
    assert_eq!(attachment_name("Colin Melville CV.pdf"), "Colin Melville CV.pdf");
    assert_eq!(attachment_name("2024/cv\"; x.pdf"), "cv x.pdf");
    assert_eq!(attachment_name("uploads/"), "resume.pdf");
}

#[test]
fn failure_events_serialize() {
    let event = sse_event(LiveEvent::Error(ApiError::from(SiteError::Network(
        "down".to_string(),
    ))));
    assert!(event.is_ok());
}

#[test]
fn failures_become_error_notices() {
    let notice = failure_notice(&SiteError::Auth("Invalid login credentials".to_string()));
    assert_eq!(notice.kind, NoticeKind::Error);
    assert_eq!(notice.title, "Error");
    assert_eq!(notice.description, "Invalid login credentials");
}

#[test]
fn stream_url_carries_the_rendered_position() {
    let mark = Watermark::covering(&[message("7", 30)]);
    assert_eq!(
        stream_url(&mark),
        "/admin/messages/stream?after=2024-06-01T12%3A00%3A30Z%7E7"
    );
    assert_eq!(stream_url(&Watermark::default()), "/admin/messages/stream?after=");
}

#[test]
fn last_event_id_wins_over_page_position() {
    let page = StreamQuery {
        after: Some("2024-06-01T12:00:30Z~7".to_string()),
    };
    let mut headers = HeaderMap::new();
    assert_eq!(
        resume_point(&headers, &page),
        Some(Watermark::covering(&[message("7", 30)]))
    );

    headers.insert(LAST_EVENT_ID, "2024-06-01T12:00:45Z~9".parse().expect("header"));
    assert_eq!(
        resume_point(&headers, &page),
        Some(Watermark::covering(&[message("9", 45)]))
    );

    assert_eq!(resume_point(&HeaderMap::new(), &StreamQuery::default()), None);
    let garbled = StreamQuery {
        after: Some("yesterday".to_string()),
    };
    assert_eq!(resume_point(&HeaderMap::new(), &garbled), None);
}

#[test]
fn inserted_events_carry_their_resume_position() {
    let message = message("7", 30);
    let update = Update {
        resume: Watermark::covering(std::slice::from_ref(&message)),
        event: LiveEvent::MessageInserted { message },
    };
    assert!(live_update(update).is_ok());
}
