/*!
 * Tests for the public error surface
 */

use pahedl::errors::{ErrorResponse, ResolveStage, ServiceError};

#[test]
fn test_errorResponse_shouldSerializeStableShape() {
    let response = ServiceError::RangeExceeded("Episode 25 exceeds the known episode count 24".into())
        .to_response();

    let json = serde_json::to_value(&response).expect("serialize failed");
    assert_eq!(json["status"], 422);
    assert!(json["message"]
        .as_str()
        .expect("message missing")
        .contains("25"));
}

#[test]
fn test_errorResponse_shouldRoundTripJson() {
    let response = ErrorResponse {
        status: 404,
        message: "Not found: Session not found".to_string(),
    };

    let json = serde_json::to_string(&response).expect("serialize failed");
    let back: ErrorResponse = serde_json::from_str(&json).expect("deserialize failed");
    assert_eq!(back.status, 404);
    assert_eq!(back.message, response.message);
}

#[test]
fn test_display_stageError_shouldNameTheStage() {
    let err = ServiceError::stage(ResolveStage::TokenExtraction, "no packed script");
    let message = err.to_string();

    assert!(message.contains("token-extraction"));
    assert!(message.contains("no packed script"));
}

#[test]
fn test_status_upstreamUnavailable_shouldSuggestRetry() {
    let err = ServiceError::UpstreamUnavailable("origin down".into());

    assert_eq!(err.status(), 503);
    assert!(err.to_string().contains("Try again later"));
}
