//! Concrete resource types.
//!
//! Each type is a uniform specialization of the generic
//! [`Resource`](crate::Resource)/[`Manager`](crate::Manager) pair: a
//! class descriptor, a typed manager, and a typed resource wrapper with
//! the operations of that class. The typed wrappers deref to the generic
//! resource, so the base property/update/delete/auto-update surface is
//! available on all of them.

pub mod adapter;
pub mod console;
pub mod cpc;
pub mod lpar;
pub mod nic;
pub mod partition;
pub mod storage_group;
pub mod user;

pub use adapter::{Adapter, AdapterManager};
pub use console::{Console, ConsoleManager};
pub use cpc::{Cpc, CpcManager};
pub use lpar::{Lpar, LparManager};
pub use nic::{Nic, NicManager};
pub use partition::{Partition, PartitionManager};
pub use storage_group::{StorageGroup, StorageGroupManager};
pub use user::{User, UserManager};
