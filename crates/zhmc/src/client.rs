//! Entry point to the HMC resource tree.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use zhmc_core::Result;

use crate::resources::console::ConsoleManager;
use crate::resources::cpc::CpcManager;
use crate::resources::storage_group::StorageGroupManager;
use crate::session::Session;

/// Top-level client over a [`Session`]; owns the root resource managers.
#[derive(Debug, Clone)]
pub struct Client {
    session: Arc<Session>,
}

impl Client {
    /// Create a client for the given session.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// The underlying session.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Manager of the CPCs managed by this HMC.
    pub fn cpcs(&self) -> CpcManager {
        CpcManager::new(self.session.clone())
    }

    /// Manager of the HMC's console resource.
    pub fn consoles(&self) -> ConsoleManager {
        ConsoleManager::new(self.session.clone())
    }

    /// Manager of the storage groups defined on this HMC.
    pub fn storage_groups(&self) -> StorageGroupManager {
        StorageGroupManager::new(self.session.clone())
    }

    /// The raw version response of the HMC; needs no logon.
    pub async fn query_api_version(&self) -> Result<Value> {
        self.session.query_api_version().await
    }

    /// Probe the HMC until it answers version queries again, for use
    /// after an HMC restart.
    pub async fn wait_for_available(&self, timeout: Option<Duration>) -> Result<()> {
        self.session.wait_for_available(timeout).await
    }
}
