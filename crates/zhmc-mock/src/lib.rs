//! In-memory faked IBM Z HMC.
//!
//! [`MockHmc`] implements the same external contract as a real HMC behind
//! the `zhmc_core` transport traits: a URI handler tree that mirrors the
//! REST surface (status codes, reason codes, the 202/job flow, documented
//! operation preconditions), session-token validation, and notification
//! publication on in-memory topics. The whole session and resource engine
//! of the `zhmc` crate runs against it unchanged, which is what the
//! end-to-end tests and examples do.
//!
//! The faked resource tree can be built programmatically (`add_cpc`,
//! `add_partition`, ...) or loaded from a YAML mock-definition file
//! ([`MockHmcDefinition`]). [`HmcInventory`] and [`HmcVault`] implement
//! the inventory/vault file formats that test environments use to
//! describe real and mocked HMCs.

mod backend;
mod connection;
mod definition;
mod handlers;
mod hmc;
mod inventory;
mod topics;
mod vault;

pub use backend::MockNotificationBackend;
pub use connection::MockConnection;
pub use definition::{
    ConsoleDefinition, CpcDefinition, MockHmcDefinition, ResourceDefinition,
};
pub use hmc::{JOB_TOPIC, MockHmc, OBJECT_TOPIC};
pub use inventory::{HmcInventory, HostEntry, HostGroup};
pub use vault::{HmcCredentials, HmcVault};
