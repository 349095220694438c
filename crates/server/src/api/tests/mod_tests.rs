use super::*;
use shared::error::ValidationErrors;

#[test]
fn error_codes_map_to_http_statuses() {
    assert_eq!(status_for(ErrorCode::Validation), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(status_for(ErrorCode::Unauthorized), StatusCode::UNAUTHORIZED);
    assert_eq!(status_for(ErrorCode::NotFound), StatusCode::NOT_FOUND);
    assert_eq!(status_for(ErrorCode::Unavailable), StatusCode::BAD_GATEWAY);
    assert_eq!(status_for(ErrorCode::Internal), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn site_errors_agree_with_their_api_codes() {
    let mut fields = ValidationErrors::default();
    fields.push("email", "Invalid email address");
    for err in [
        SiteError::Validation(fields),
        SiteError::Auth("Invalid login credentials".to_string()),
        SiteError::Network("Failed to send message. Please try again later.".to_string()),
    ] {
        let status = site_status(&err);
        let (rejected, Json(body)) = reject(err);
        assert_eq!(status, rejected);
        assert_eq!(status_for(body.code), status);
    }
}

#[test]
fn rejected_validation_keeps_field_messages() {
    let mut fields = ValidationErrors::default();
    fields.push("name", "Name is required");
    let (_, Json(body)) = reject(SiteError::Validation(fields));
    assert_eq!(body.code, ErrorCode::Validation);
    assert_eq!(body.fields.len(), 1);
    assert_eq!(body.fields[0].message, "Name is required");
}
