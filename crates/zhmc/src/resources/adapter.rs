//! Adapters of a CPC.

use std::ops::Deref;
use std::sync::Arc;

use zhmc_core::{PropertyMap, Result};

use crate::manager::{Manager, ResourceClass};
use crate::resource::Resource;
use crate::session::Session;

static ADAPTER_CLASS: ResourceClass = ResourceClass {
    name: "adapter",
    base_uri: "/api/adapters",
    list_key: "adapters",
    name_prop: "name",
    case_insensitive_names: false,
    server_filter_props: &["name", "adapter-id", "adapter-family", "type"],
    is_element: false,
    cacheable_names: true,
    list_requires_api_version: None,
    uris_prop: None,
};

/// Manager of the adapters of one CPC.
#[derive(Debug, Clone)]
pub struct AdapterManager {
    base: Manager,
}

impl AdapterManager {
    pub(crate) fn new(session: Arc<Session>, cpc_uri: &str) -> Self {
        Self {
            base: Manager::new(
                session,
                &ADAPTER_CLASS,
                Some(cpc_uri.to_string()),
                format!("{cpc_uri}/adapters"),
            ),
        }
    }

    /// The generic manager underneath.
    pub fn base(&self) -> &Manager {
        &self.base
    }

    /// List adapters; see [`Manager::list`].
    pub async fn list(
        &self,
        filters: Option<&PropertyMap>,
        full_properties: bool,
    ) -> Result<Vec<Adapter>> {
        Ok(self
            .base
            .list(filters, full_properties)
            .await?
            .into_iter()
            .map(Adapter::from_resource)
            .collect())
    }

    /// Find exactly one adapter; see [`Manager::find`].
    pub async fn find(&self, filters: &PropertyMap) -> Result<Adapter> {
        self.base.find(filters).await.map(Adapter::from_resource)
    }

    /// Find an adapter by name, consulting the name cache.
    pub async fn find_by_name(&self, name: &str) -> Result<Adapter> {
        self.base
            .find_by_name(name)
            .await
            .map(Adapter::from_resource)
    }

    /// List with filters, allowing any number of matches.
    pub async fn findall(&self, filters: Option<&PropertyMap>) -> Result<Vec<Adapter>> {
        Ok(self
            .base
            .findall(filters)
            .await?
            .into_iter()
            .map(Adapter::from_resource)
            .collect())
    }

    /// Drop cached adapter name entries.
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

/// One adapter of a CPC.
#[derive(Debug, Clone)]
pub struct Adapter {
    resource: Resource,
}

impl Deref for Adapter {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl Adapter {
    pub(crate) fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    /// The generic resource underneath.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}
