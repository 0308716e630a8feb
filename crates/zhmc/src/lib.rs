//! Client SDK for the IBM Z Hardware Management Console (HMC) Web
//! Services API.
//!
//! The HMC exposes a resource tree (CPCs, partitions, LPARs, adapters,
//! storage groups, users, ...) over an HTTPS request-response API and a
//! STOMP notification bus. This crate makes that API ergonomic for a
//! long-running program:
//!
//! - [`Session`] - logon/logoff, transparent re-logon on session-token
//!   expiry, multi-HMC logon failover, asynchronous job polling, busy
//!   retries
//! - [`Client`] - entry point to the resource tree
//! - [`Resource`] / [`Manager`] - the uniform base every resource type is
//!   a specialization of: property access, listing with server- and
//!   client-side filtering, name-to-URI caching, create/update/delete
//! - auto-update: resources and managers that opt in are kept in sync
//!   with the HMC from object notifications, sharing one subscription per
//!   session
//!
//! # Example
//!
//! ```rust,no_run
//! use zhmc::{Client, Session, SessionConfig};
//! use zhmc_core::Secret;
//!
//! # async fn example() -> zhmc_core::Result<()> {
//! let session = Session::new(SessionConfig::new(
//!     "hmc1.example.com",
//!     "apiuser",
//!     Secret::new("password"),
//! ))?;
//! let client = Client::new(session);
//! for cpc in client.cpcs().list(None, false).await? {
//!     println!("{}", cpc.name()?);
//! }
//! # Ok(())
//! # }
//! ```

mod autoupdate;
mod cache;
mod client;
mod filter;
mod job;
mod manager;
mod resource;
pub mod resources;
mod session;

pub use client::Client;
pub use job::Job;
pub use manager::{Manager, ResourceClass};
pub use resource::Resource;
pub use session::{DeleteOptions, PostOptions, PostResult, Session, SessionConfig};

pub use zhmc_core::{Error, Notification, PropertyMap, PropertyMapExt, Result, Secret, VerifyCert};
