//! STOMP notification receiver for the IBM Z HMC notification service.
//!
//! The HMC publishes JMS notifications over STOMP on a TLS port (default
//! 61612). [`NotificationReceiver`] connects, logs on with basic
//! credentials, subscribes to a set of topics, and delivers notifications
//! through a bounded queue fed by one background reader task:
//!
//! - notifications arrive in per-topic order
//! - HMC ERROR frames and unparseable bodies are delivered in-band as
//!   `Err` items; the connection keeps running
//! - a lost connection is re-established with bounded backoff; exhausted
//!   reconnects end the stream
//! - [`NotificationReceiver::close`] is idempotent and tears down within
//!   seconds
//!
//! [`StompBackend`] adapts a receiver to the `zhmc_core`
//! [`NotificationBackend`](zhmc_core::NotificationBackend) trait for the
//! auto-update engine.

mod backend;
mod codec;
mod receiver;

pub use backend::StompBackend;
pub use codec::{StompCodec, StompFrame};
pub use receiver::{NotificationReceiver, NotificationStream, StompConfig};
