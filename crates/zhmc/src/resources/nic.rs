//! NICs (network interfaces) of a partition.
//!
//! NICs are element resources: they live under their partition's URI,
//! carry `element-uri`, and have no list operation of their own - the
//! partition's `nic-uris` property enumerates them.

use std::ops::Deref;
use std::sync::Arc;

use zhmc_core::{PropertyMap, Result};

use crate::manager::{Manager, ResourceClass};
use crate::resource::Resource;
use crate::session::Session;

static NIC_CLASS: ResourceClass = ResourceClass {
    name: "nic",
    base_uri: "/api/partitions",
    list_key: "nics",
    name_prop: "name",
    case_insensitive_names: false,
    server_filter_props: &[],
    is_element: true,
    cacheable_names: false,
    list_requires_api_version: None,
    uris_prop: Some("nic-uris"),
};

/// Manager of the NICs of one partition.
#[derive(Debug, Clone)]
pub struct NicManager {
    base: Manager,
    create_uri: String,
}

impl NicManager {
    pub(crate) fn new(session: Arc<Session>, partition_uri: &str) -> Self {
        let create_uri = format!("{partition_uri}/nics");
        Self {
            base: Manager::new(
                session,
                &NIC_CLASS,
                Some(partition_uri.to_string()),
                create_uri.clone(),
            ),
            create_uri,
        }
    }

    /// The generic manager underneath.
    pub fn base(&self) -> &Manager {
        &self.base
    }

    /// List NICs by following the partition's `nic-uris` property; the
    /// elements arrive with their full property set.
    pub async fn list(&self, filters: Option<&PropertyMap>) -> Result<Vec<Nic>> {
        Ok(self
            .base
            .list(filters, false)
            .await?
            .into_iter()
            .map(Nic::from_resource)
            .collect())
    }

    /// Find exactly one NIC; see [`Manager::find`].
    pub async fn find(&self, filters: &PropertyMap) -> Result<Nic> {
        self.base.find(filters).await.map(Nic::from_resource)
    }

    /// Find a NIC by name.
    pub async fn find_by_name(&self, name: &str) -> Result<Nic> {
        self.base.find_by_name(name).await.map(Nic::from_resource)
    }

    /// List with filters, allowing any number of matches.
    pub async fn findall(&self, filters: Option<&PropertyMap>) -> Result<Vec<Nic>> {
        Ok(self
            .base
            .findall(filters)
            .await?
            .into_iter()
            .map(Nic::from_resource)
            .collect())
    }

    /// Create a NIC on this partition.
    pub async fn create(&self, props: &PropertyMap) -> Result<Nic> {
        self.base
            .create(&self.create_uri, props)
            .await
            .map(Nic::from_resource)
    }
}

/// One NIC of a partition.
#[derive(Debug, Clone)]
pub struct Nic {
    resource: Resource,
}

impl Deref for Nic {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl Nic {
    pub(crate) fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    /// The generic resource underneath.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}
