//! Transport-level behavior against a local HTTP server.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_bytes, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use zhmc_core::{ApiRequest, HmcConnection, RetryTimeoutConfig, Secret, VerifyCert};
use zhmc_http::HttpTransport;

fn transport(server: &MockServer, config: RetryTimeoutConfig) -> HttpTransport {
    HttpTransport::new(server.uri(), config, &VerifyCert::Default).unwrap()
}

#[tokio::test]
async fn get_passes_session_header_and_returns_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cpcs"))
        .and(header("X-API-Session", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cpcs": []})))
        .mount(&server)
        .await;

    let transport = transport(&server, RetryTimeoutConfig::default());
    let request = ApiRequest::get("/api/cpcs").with_session_token(Some(Secret::new("tok-1")));
    let response = transport.execute(request).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.json().unwrap(), json!({"cpcs": []}));
}

#[tokio::test]
async fn logon_request_carries_basic_auth() {
    let server = MockServer::start().await;
    // base64("apiuser:pa55") per RFC 7617.
    Mock::given(method("POST"))
        .and(path("/api/sessions"))
        .and(header("authorization", "Basic YXBpdXNlcjpwYTU1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"api-session": "tok"})))
        .mount(&server)
        .await;

    let transport = transport(&server, RetryTimeoutConfig::default());
    let request = ApiRequest::post(
        "/api/sessions",
        Some(json!({"userid": "apiuser", "password": "pa55"})),
    )
    .with_logon_auth("apiuser", Secret::new("pa55"));
    let response = transport.execute(request).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn binary_body_is_sent_verbatim() {
    let server = MockServer::start().await;
    let image = vec![0xABu8, 0xCD, 0xEF];
    Mock::given(method("POST"))
        .and(path("/api/partitions/1/operations/mount-iso"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_bytes(image.clone()))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let transport = transport(&server, RetryTimeoutConfig::default());
    let request = ApiRequest::post("/api/partitions/1/operations/mount-iso", None)
        .with_binary_body("application/octet-stream", image.into());
    let response = transport.execute(request).await.unwrap();
    assert_eq!(response.status, 204);
    assert!(!response.has_body());
}

#[tokio::test]
async fn error_status_is_returned_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cpcs/nope"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"http-status": 404, "reason": 1, "message": "no such"})),
        )
        .mount(&server)
        .await;

    let transport = transport(&server, RetryTimeoutConfig::default());
    let response = transport
        .execute(ApiRequest::get("/api/cpcs/nope"))
        .await
        .unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(response.json().unwrap()["reason"], json!(1));
}

#[tokio::test]
async fn redirect_loop_exhausts_the_cap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/api/loop"))
        .mount(&server)
        .await;

    let config = RetryTimeoutConfig::default().with_max_redirects(2);
    let transport = transport(&server, config);
    let err = transport
        .execute(ApiRequest::get("/api/loop"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, zhmc_core::Error::RetriesExceeded { attempts: 2, .. }),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn connect_failure_is_a_connection_error() {
    // Nothing listens on this port of the discard prefix.
    let config = RetryTimeoutConfig::default()
        .with_connect_retries(1)
        .with_connect_timeout(Duration::from_millis(500));
    let transport = HttpTransport::new("http://127.0.0.1:9", config, &VerifyCert::Default).unwrap();
    let err = transport
        .execute(ApiRequest::get("/api/version"))
        .await
        .unwrap_err();
    assert!(err.is_connection(), "unexpected error: {err:?}");
}
