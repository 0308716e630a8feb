//! Error taxonomy of the zhmc SDK.
//!
//! Every fallible operation across the SDK returns [`Error`]. The variants
//! mirror the failure classes of the HMC Web Services API: transport
//! failures, authentication failures, structured HMC error responses,
//! timeouts while waiting for jobs or status transitions, lookup failures,
//! and notification-service failures. Each variant carries its structured
//! fields; `Display` renders the single-line human form.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// A specialized `Result` type for zhmc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// HMC reason code used for HTML-formatted error bodies that indicate the
/// Web Services interface is disabled.
pub const REASON_WS_DISABLED: i64 = 900;

/// HMC reason code used for any other non-JSON error body.
pub const REASON_OPAQUE_BODY: i64 = 999;

/// Reason code on a 403 response that signals an expired or invalid
/// session token.
pub const REASON_SESSION_EXPIRED: i64 = 5;

/// Reason codes on a 409 response that signal a temporarily busy resource.
pub const REASON_BUSY: [i64; 2] = [1, 2];

/// Errors raised by the zhmc SDK.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A connection-level failure that is neither a timeout nor an
    /// exhausted retry budget (refused, reset, DNS failure, ...).
    #[error("Connection to {host} failed: {detail}")]
    Connection {
        /// Host the connection was directed at.
        host: String,
        /// Underlying failure description.
        detail: String,
    },

    /// Establishing a connection did not succeed within the configured
    /// connect timeout, across all configured connect retries.
    #[error("Connecting to {host} timed out after {timeout:?} ({attempts} attempts)")]
    ConnectTimeout {
        /// Host the connection was directed at.
        host: String,
        /// The connect timeout that was exceeded.
        timeout: Duration,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A response was not received within the configured read timeout,
    /// across all configured read retries.
    #[error("Reading from {host} timed out after {timeout:?} ({attempts} attempts)")]
    ReadTimeout {
        /// Host the request was directed at.
        host: String,
        /// The read timeout that was exceeded.
        timeout: Duration,
        /// Number of attempts made.
        attempts: u32,
    },

    /// The retry budget (including the redirect cap) was exhausted.
    #[error("Retries exhausted talking to {host} after {attempts} attempts: {detail}")]
    RetriesExceeded {
        /// Host the request was directed at.
        host: String,
        /// Number of attempts made.
        attempts: u32,
        /// Underlying failure description.
        detail: String,
    },

    /// Client-side authentication failed, e.g. the server certificate did
    /// not validate against the trust store.
    #[error("Client authentication failed: {0}")]
    ClientAuth(String),

    /// The HMC rejected the credentials or the session token.
    #[error("HMC {host} rejected authentication for userid {userid:?}: {detail}")]
    ServerAuth {
        /// Host that rejected the logon.
        host: String,
        /// Userid used for the logon.
        userid: String,
        /// HMC-provided failure description.
        detail: String,
    },

    /// A structured HMC error response.
    ///
    /// `reason` is the HMC reason code; [`REASON_WS_DISABLED`] and
    /// [`REASON_OPAQUE_BODY`] are synthesized locally for non-JSON error
    /// bodies. This variant is also synthesized from the error fields of a
    /// failed asynchronous job.
    #[error("{method} {uri} failed with {status}.{reason}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// HMC reason code.
        reason: i64,
        /// HMC error message.
        message: String,
        /// Request method.
        method: String,
        /// Request URI.
        uri: String,
        /// Server-side stack trace, when the HMC provides one.
        stack: Option<String>,
    },

    /// A response body could not be decoded as its expected content type.
    #[error("Cannot parse response body: {detail} (line {line}, column {column})")]
    Parse {
        /// Parser failure description.
        detail: String,
        /// 1-based line of the failure.
        line: usize,
        /// 1-based column of the failure.
        column: usize,
    },

    /// The HMC's API version is below the minimum required by an operation.
    #[error(
        "HMC API version {}.{} is below the required {}.{}",
        actual.0, actual.1, required.0, required.1
    )]
    Version {
        /// Minimum (major, minor) API version required by the operation.
        required: (u64, u64),
        /// (major, minor) API version reported by the HMC.
        actual: (u64, u64),
    },

    /// An asynchronous job did not reach a terminal status within the
    /// operation timeout.
    #[error("Job {job_uri} did not complete within {timeout:?}")]
    OperationTimeout {
        /// URI of the job that was being polled.
        job_uri: String,
        /// The operation timeout that was exceeded.
        timeout: Duration,
    },

    /// A resource did not reach any of the desired status values within
    /// the status timeout.
    #[error(
        "Resource {resource_uri} stayed in status {actual:?} instead of reaching \
         one of {desired:?} within {timeout:?}"
    )]
    StatusTimeout {
        /// URI of the resource that was being watched.
        resource_uri: String,
        /// Last observed status value, if any.
        actual: Option<String>,
        /// The set of acceptable status values.
        desired: Vec<String>,
        /// The status timeout that was exceeded.
        timeout: Duration,
    },

    /// A lookup by filter matched no resource.
    #[error("No {class} found matching {filters}")]
    NotFound {
        /// Resource class that was searched.
        class: String,
        /// Rendered filter arguments.
        filters: String,
    },

    /// A lookup by filter matched more than one resource.
    #[error(
        "Found {} {class} resources matching {filters}: {matching_uris:?}",
        matching_uris.len()
    )]
    NoUniqueMatch {
        /// Resource class that was searched.
        class: String,
        /// Rendered filter arguments.
        filters: String,
        /// URIs of all matching resources.
        matching_uris: Vec<String>,
    },

    /// An operation was attempted on an auto-updated resource whose
    /// underlying HMC resource no longer exists.
    #[error("Resource {uri} no longer exists on the HMC")]
    CeasedExistence {
        /// Object URI of the vanished resource.
        uri: String,
    },

    /// The HMC response violated an invariant the client relies on.
    #[error("Inconsistent HMC response: {0}")]
    Consistency(String),

    /// A filter match value could not be converted to the type of the
    /// property it is matched against.
    #[error("Filter value {value} for property {property:?} cannot be converted to {target}")]
    FilterConversion {
        /// Property name the filter refers to.
        property: String,
        /// The match value as given.
        value: Value,
        /// Target type name the conversion aimed for.
        target: &'static str,
    },

    /// The HMC notification service reported a JMS-level error frame.
    #[error("HMC notification service reported an error: {message}")]
    NotificationJms {
        /// Message from the error frame headers.
        message: String,
        /// Body of the error frame, if any.
        details: Value,
    },

    /// A notification body could not be parsed.
    #[error("Cannot parse notification: {0}")]
    NotificationParse(String),
}

impl Error {
    /// Whether this error is a transport-level connection failure
    /// (connect/read timeout, retries exhausted, or other connection
    /// failure).
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. }
                | Error::ConnectTimeout { .. }
                | Error::ReadTimeout { .. }
                | Error::RetriesExceeded { .. }
        )
    }

    /// Whether this error is an authentication failure (client- or
    /// server-side).
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::ClientAuth(_) | Error::ServerAuth { .. })
    }

    /// Whether this error originated from the notification service.
    pub fn is_notification(&self) -> bool {
        matches!(
            self,
            Error::NotificationJms { .. } | Error::NotificationParse(_)
        )
    }

    /// Whether this is an HMC error response with the given HTTP status
    /// and reason code.
    pub fn is_http_reason(&self, status: u16, reason: i64) -> bool {
        matches!(
            self,
            Error::Http { status: s, reason: r, .. } if *s == status && *r == reason
        )
    }

    /// Build an [`Error::Http`] from the error fields of a failed
    /// asynchronous job.
    pub fn from_job_failure(job_uri: &str, job_status: &Value) -> Self {
        let status = job_status
            .get("job-status-code")
            .and_then(Value::as_u64)
            .unwrap_or(500) as u16;
        let reason = job_status
            .get("job-reason-code")
            .and_then(Value::as_i64)
            .unwrap_or(REASON_OPAQUE_BODY);
        let message = job_status
            .get("job-results")
            .and_then(|r| r.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("Job failed without a message")
            .to_string();
        Error::Http {
            status,
            reason,
            message,
            method: "POST".to_string(),
            uri: job_uri.to_string(),
            stack: None,
        }
    }

    /// Build an [`Error::Parse`] from a serde_json decode failure.
    pub fn from_json(err: &serde_json::Error) -> Self {
        Error::Parse {
            detail: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::from_json(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_grouping() {
        let err = Error::ConnectTimeout {
            host: "hmc1".into(),
            timeout: Duration::from_secs(30),
            attempts: 3,
        };
        assert!(err.is_connection());
        assert!(!err.is_auth());
    }

    #[test]
    fn http_reason_predicate() {
        let err = Error::Http {
            status: 403,
            reason: 5,
            message: "expired".into(),
            method: "GET".into(),
            uri: "/api/cpcs".into(),
            stack: None,
        };
        assert!(err.is_http_reason(403, 5));
        assert!(!err.is_http_reason(409, 5));
    }

    #[test]
    fn job_failure_synthesis() {
        let status = serde_json::json!({
            "status": "complete-with-error",
            "job-status-code": 500,
            "job-reason-code": 263,
            "job-results": {"message": "LPAR is not active"},
        });
        let err = Error::from_job_failure("/api/jobs/1", &status);
        match err {
            Error::Http {
                status: 500,
                reason: 263,
                ref message,
                ..
            } => assert_eq!(message, "LPAR is not active"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_error_carries_location() {
        let bad = serde_json::from_str::<Value>("{\"a\": ").unwrap_err();
        let err = Error::from(bad);
        match err {
            Error::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn display_is_single_line() {
        let err = Error::StatusTimeout {
            resource_uri: "/api/partitions/1".into(),
            actual: Some("stopped".into()),
            desired: vec!["active".into(), "degraded".into()],
            timeout: Duration::from_secs(900),
        };
        assert!(!err.to_string().contains('\n'));
    }
}
