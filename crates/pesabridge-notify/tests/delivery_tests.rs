//! Transport-level delivery behavior against a mock endpoint.

mod common;

use std::time::Duration;

use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use pesabridge_core::NotificationId;
use pesabridge_notify::delivery::post_notification;

use common::{payload_bytes, sample_payload, test_client, FailThenSucceed};

async fn post_to(server: &MockServer, timeout: Duration) -> pesabridge_notify::delivery::AttemptResult {
    let body = payload_bytes(&sample_payload());
    let client = test_client(timeout);
    post_notification(&client, &server.uri(), NotificationId::new(), "sig", body).await
}

#[tokio::test]
async fn two_hundred_response_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("received"))
        .mount(&server)
        .await;

    let result = post_to(&server, Duration::from_secs(5)).await;
    assert!(result.is_success());
    assert_eq!(result.response_code, Some(200));
    assert_eq!(result.response_body.as_deref(), Some("received"));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn any_2xx_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let result = post_to(&server, Duration::from_secs(5)).await;
    assert!(result.is_success());
    assert_eq!(result.response_code, Some(204));
}

#[tokio::test]
async fn server_error_is_failure_with_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = post_to(&server, Duration::from_secs(5)).await;
    assert!(!result.is_success());
    assert_eq!(result.response_code, Some(500));
    assert_eq!(result.response_body.as_deref(), Some("boom"));
    assert_eq!(result.error.as_deref(), Some("HTTP 500"));
}

#[tokio::test]
async fn client_error_is_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let result = post_to(&server, Duration::from_secs(5)).await;
    assert!(!result.is_success());
    assert_eq!(result.response_code, Some(400));
}

#[tokio::test]
async fn redirect_is_not_followed_and_not_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "https://elsewhere.example"),
        )
        .mount(&server)
        .await;

    let result = post_to(&server, Duration::from_secs(5)).await;
    assert!(!result.is_success());
    assert_eq!(result.response_code, Some(302));
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let result = post_to(&server, Duration::from_millis(200)).await;
    assert!(!result.is_success());
    assert!(result.response_code.is_none());
    assert!(result.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_failure() {
    let body = payload_bytes(&sample_payload());
    let client = test_client(Duration::from_secs(2));

    // Reserved port on loopback with nothing listening.
    let result = post_notification(
        &client,
        "http://127.0.0.1:9",
        NotificationId::new(),
        "sig",
        body,
    )
    .await;

    assert!(!result.is_success());
    assert!(result.response_code.is_none());
    assert!(result.error.is_some());
}

#[tokio::test]
async fn oversized_response_body_is_truncated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(10_000)))
        .mount(&server)
        .await;

    let result = post_to(&server, Duration::from_secs(5)).await;
    assert_eq!(result.response_body.as_deref().map(str::len), Some(4096));
}

#[tokio::test]
async fn endpoint_recovers_after_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(FailThenSucceed::new(2, 503))
        .mount(&server)
        .await;

    let first = post_to(&server, Duration::from_secs(5)).await;
    let second = post_to(&server, Duration::from_secs(5)).await;
    let third = post_to(&server, Duration::from_secs(5)).await;

    assert_eq!(first.response_code, Some(503));
    assert_eq!(second.response_code, Some(503));
    assert!(third.is_success());
}
