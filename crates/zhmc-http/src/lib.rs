//! HTTPS transport to the IBM Z HMC Web Services API.
//!
//! [`HttpTransport`] implements [`zhmc_core::HmcConnection`] over reqwest
//! with rustls. It owns the transport-level concerns of the SDK:
//!
//! - TLS with the session's certificate verification policy
//! - connect timeout/retries and read timeout/retries (GET only)
//! - the redirect cap
//! - JSON and opaque binary request bodies
//! - structured request/response logging with credentials elided
//!
//! HMC status and reason code interpretation (re-logon, jobs, busy
//! retries) lives in the session layer of the `zhmc` crate, so that the
//! mocked HMC shares it.

mod transport;

pub use transport::HttpTransport;
