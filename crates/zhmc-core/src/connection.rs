//! Transport abstraction.
//!
//! A `Session` talks to an HMC through [`HmcConnection`] for the
//! request-response API and obtains notification streams through
//! [`NotificationBackend`]. The real implementations live in `zhmc-http`
//! and `zhmc-stomp`; the mocked HMC in `zhmc-mock` implements the same
//! traits, so the whole session and resource engine runs unchanged against
//! either.
//!
//! Interpretation of HMC status and reason codes (re-logon, job flow, busy
//! retries) deliberately does NOT happen here; it lives in the session
//! layer, shared by every connection implementation.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::notification::Notification;
use crate::secret::Secret;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET - idempotent, eligible for read retries.
    Get,
    /// POST.
    Post,
    /// DELETE.
    Delete,
}

impl Method {
    /// The method name as it appears on the wire and in errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of an API request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// A structured mapping, serialized as JSON with
    /// `Content-Type: application/json`.
    Json(Value),
    /// An opaque byte sequence sent verbatim with the given content type
    /// (used for ISO image upload).
    Binary {
        /// Value of the `Content-Type` header.
        content_type: String,
        /// The raw body.
        data: Bytes,
    },
}

/// One request against the HMC Web Services API.
///
/// The session token is a [`Secret`], so a derived `Debug` of a request
/// never exposes it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// URI path (and query) below the HMC origin, e.g. `/api/cpcs`.
    pub uri: String,
    /// Request body, if any.
    pub body: Option<RequestBody>,
    /// Session token attached in the session header, for authenticated
    /// requests.
    pub session_token: Option<Secret>,
    /// HTTP basic-auth credentials, attached to logon requests.
    pub logon_auth: Option<(String, Secret)>,
    /// Per-request override of the configured read timeout.
    pub read_timeout: Option<Duration>,
}

impl ApiRequest {
    /// Build a GET request.
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::Get, uri)
    }

    /// Build a POST request with an optional JSON body.
    pub fn post(uri: impl Into<String>, body: Option<Value>) -> Self {
        let mut request = Self::new(Method::Post, uri);
        request.body = body.map(RequestBody::Json);
        request
    }

    /// Build a DELETE request.
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::new(Method::Delete, uri)
    }

    fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            body: None,
            session_token: None,
            logon_auth: None,
            read_timeout: None,
        }
    }

    /// Attach a session token.
    #[must_use]
    pub fn with_session_token(mut self, token: Option<Secret>) -> Self {
        self.session_token = token;
        self
    }

    /// Attach HTTP basic-auth credentials (logon requests).
    #[must_use]
    pub fn with_logon_auth(mut self, userid: impl Into<String>, password: Secret) -> Self {
        self.logon_auth = Some((userid.into(), password));
        self
    }

    /// Attach a binary body.
    #[must_use]
    pub fn with_binary_body(mut self, content_type: impl Into<String>, data: Bytes) -> Self {
        self.body = Some(RequestBody::Binary {
            content_type: content_type.into(),
            data,
        });
        self
    }

    /// Override the read timeout for this request.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }
}

/// One response from the HMC Web Services API, before status-code
/// interpretation.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Value of the `Content-Type` header, if present.
    pub content_type: Option<String>,
    /// Raw response body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body is empty.
    pub fn has_body(&self) -> bool {
        !self.body.is_empty()
    }

    /// Decode the body as JSON.
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.body).map_err(|e| Error::from_json(&e))
    }

    /// The body as lossily-decoded text, truncated to `limit` bytes, for
    /// inclusion in errors and logs.
    pub fn body_text(&self, limit: usize) -> String {
        let end = self.body.len().min(limit);
        String::from_utf8_lossy(&self.body[..end]).into_owned()
    }
}

/// A request-response connection to one HMC (real or mocked).
#[async_trait]
pub trait HmcConnection: Send + Sync + fmt::Debug {
    /// Execute one request and return the raw response.
    ///
    /// Implementations own transport-level concerns: TLS, connect/read
    /// retries, the redirect cap. They return `Ok` for any HTTP response
    /// that was received, whatever its status; an `Err` means no response
    /// was obtained.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;

    /// The host this connection is directed at.
    fn host(&self) -> &str;
}

/// Credentials used to log on to a notification service.
#[derive(Debug, Clone)]
pub struct NotificationAuth {
    /// Userid (or session token, which the HMC accepts in its place).
    pub userid: String,
    /// Password.
    pub password: Secret,
}

/// A live notification subscription.
///
/// The producing side (a STOMP receiver task or the mocked HMC's topic
/// forwarder) feeds the channel and watches both the cancellation token
/// and channel closure, so either [`close`](Self::close) or dropping the
/// handle ends the producer.
#[derive(Debug)]
pub struct NotificationHandle {
    rx: mpsc::Receiver<Result<Notification>>,
    cancel: CancellationToken,
}

impl NotificationHandle {
    /// Pair a receiving channel with the token that cancels its producer.
    pub fn new(rx: mpsc::Receiver<Result<Notification>>, cancel: CancellationToken) -> Self {
        Self { rx, cancel }
    }

    /// Receive the next notification, in arrival order.
    ///
    /// JMS error frames and unparseable bodies are delivered in-band as
    /// `Err` items; `None` means the subscription ended.
    pub async fn recv(&mut self) -> Option<Result<Notification>> {
        self.rx.recv().await
    }

    /// Cancel the subscription. Idempotent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether [`close`](Self::close) was called or the producer was
    /// cancelled.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Split the handle into its channel and cancellation token, for
    /// adapters that need to own them separately.
    pub fn into_parts(self) -> (mpsc::Receiver<Result<Notification>>, CancellationToken) {
        (self.rx, self.cancel)
    }
}

/// Source of notification subscriptions (real STOMP service or the mocked
/// HMC's in-memory topics).
#[async_trait]
pub trait NotificationBackend: Send + Sync + fmt::Debug {
    /// Open a subscription for the given topics on the given host.
    async fn open(
        &self,
        host: &str,
        topics: &[String],
        auth: &NotificationAuth,
    ) -> Result<NotificationHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_debug_elides_token() {
        let request = ApiRequest::get("/api/cpcs")
            .with_session_token(Some(Secret::new("super-secret-token")));
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(rendered.contains("/api/cpcs"));
    }

    #[test]
    fn request_debug_elides_logon_password() {
        let request = ApiRequest::post("/api/sessions", None)
            .with_logon_auth("apiuser", Secret::new("pa55-very-secret"));
        let rendered = format!("{request:?}");
        assert!(rendered.contains("apiuser"));
        assert!(!rendered.contains("pa55-very-secret"));
    }

    #[test]
    fn response_body_truncation() {
        let response = ApiResponse {
            status: 500,
            content_type: Some("text/html".to_string()),
            body: Bytes::from(vec![b'x'; 100]),
        };
        assert_eq!(response.body_text(10).len(), 10);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn handle_close_is_idempotent() {
        let (_tx, rx) = mpsc::channel(1);
        let handle = NotificationHandle::new(rx, CancellationToken::new());
        assert!(!handle.is_closed());
        handle.close();
        handle.close();
        assert!(handle.is_closed());
    }
}
