//! Core types shared by all zhmc crates.
//!
//! This crate carries the pieces every other layer depends on:
//!
//! - [`Error`] - the single error taxonomy of the SDK
//! - [`RetryTimeoutConfig`] - connect/read/operation/status timeout policy
//! - [`PropertyMap`] and the typed accessors over it
//! - [`Notification`] and the typed [`HmcNotification`] view
//! - [`VerifyCert`] - the certificate verification policy
//! - [`HmcConnection`] / [`NotificationBackend`] - the traits that decouple
//!   the session and resource engine from a real HMC vs. the mocked one
//!
//! It deliberately knows nothing about HTTP or STOMP; those live in
//! `zhmc-http` and `zhmc-stomp`.

pub mod connection;
pub mod error;
pub mod notification;
pub mod retry;
pub mod secret;
pub mod tls;
pub mod values;

pub use connection::{
    ApiRequest, ApiResponse, HmcConnection, Method, NotificationAuth, NotificationBackend,
    NotificationHandle, RequestBody,
};
pub use error::{Error, Result};
pub use notification::{
    HmcNotification, InventoryAction, Notification, PropertyChangeReport, header,
};
pub use retry::RetryTimeoutConfig;
pub use secret::Secret;
pub use tls::{CA_BUNDLE_ENV, VerifyCert};
pub use values::{PropertyMap, PropertyMapExt};

/// Default port of the HMC Web Services API.
pub const DEFAULT_HMC_PORT: u16 = 6794;

/// Default port of the HMC STOMP notification service.
pub const DEFAULT_STOMP_PORT: u16 = 61612;

/// HTTP header carrying the session token on authenticated requests.
pub const SESSION_HEADER: &str = "X-API-Session";
