//! CPCs (Central Processor Complexes) managed by the HMC.

use std::ops::Deref;
use std::sync::Arc;

use zhmc_core::{PropertyMap, Result};

use crate::manager::{Manager, ResourceClass};
use crate::resource::Resource;
use crate::resources::adapter::AdapterManager;
use crate::resources::lpar::LparManager;
use crate::resources::partition::PartitionManager;
use crate::session::Session;

static CPC_CLASS: ResourceClass = ResourceClass {
    name: "cpc",
    base_uri: "/api/cpcs",
    list_key: "cpcs",
    name_prop: "name",
    case_insensitive_names: false,
    server_filter_props: &["name"],
    is_element: false,
    cacheable_names: true,
    list_requires_api_version: None,
    uris_prop: None,
};

/// Manager of the CPCs managed by this HMC.
#[derive(Debug, Clone)]
pub struct CpcManager {
    base: Manager,
}

impl CpcManager {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self {
            base: Manager::new(session, &CPC_CLASS, None, "/api/cpcs".to_string()),
        }
    }

    /// The generic manager underneath.
    pub fn base(&self) -> &Manager {
        &self.base
    }

    /// List CPCs; see [`Manager::list`].
    pub async fn list(
        &self,
        filters: Option<&PropertyMap>,
        full_properties: bool,
    ) -> Result<Vec<Cpc>> {
        Ok(self
            .base
            .list(filters, full_properties)
            .await?
            .into_iter()
            .map(Cpc::from_resource)
            .collect())
    }

    /// Find exactly one CPC; see [`Manager::find`].
    pub async fn find(&self, filters: &PropertyMap) -> Result<Cpc> {
        self.base.find(filters).await.map(Cpc::from_resource)
    }

    /// Find a CPC by name, consulting the name cache.
    pub async fn find_by_name(&self, name: &str) -> Result<Cpc> {
        self.base.find_by_name(name).await.map(Cpc::from_resource)
    }

    /// List with filters, allowing any number of matches.
    pub async fn findall(&self, filters: Option<&PropertyMap>) -> Result<Vec<Cpc>> {
        Ok(self
            .base
            .findall(filters)
            .await?
            .into_iter()
            .map(Cpc::from_resource)
            .collect())
    }

    /// Drop cached CPC name entries.
    pub fn invalidate_cache(&self) {
        self.base.invalidate_cache();
    }

    /// See [`Manager::enable_auto_update`].
    pub async fn enable_auto_update(&self) -> Result<()> {
        self.base.enable_auto_update().await
    }

    /// See [`Manager::disable_auto_update`].
    pub async fn disable_auto_update(&self) {
        self.base.disable_auto_update().await;
    }
}

/// One CPC.
#[derive(Debug, Clone)]
pub struct Cpc {
    resource: Resource,
}

impl Deref for Cpc {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl Cpc {
    pub(crate) fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    /// The generic resource underneath.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Whether the CPC runs in DPM mode (exposing partitions) rather
    /// than classic mode (exposing LPARs).
    pub async fn dpm_enabled(&self) -> Result<bool> {
        Ok(self
            .resource
            .get_property("dpm-enabled")
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Manager of this CPC's partitions (DPM mode).
    pub fn partitions(&self) -> PartitionManager {
        PartitionManager::new(self.resource.session().clone(), self.resource.uri())
    }

    /// Manager of this CPC's LPARs (classic mode).
    pub fn lpars(&self) -> LparManager {
        LparManager::new(self.resource.session().clone(), self.resource.uri())
    }

    /// Manager of this CPC's adapters.
    pub fn adapters(&self) -> AdapterManager {
        AdapterManager::new(self.resource.session().clone(), self.resource.uri())
    }
}
