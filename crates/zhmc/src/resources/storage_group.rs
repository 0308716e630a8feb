//! Storage groups (DPM storage management).
//!
//! Storage groups are a root-level resource associated with a CPC via
//! their `cpc-uri` property. Listing them requires DPM storage management
//! support on the HMC (API version 2.23 or later).

use std::ops::Deref;
use std::sync::Arc;

use zhmc_core::{PropertyMap, Result};

use crate::manager::{Manager, ResourceClass};
use crate::resource::Resource;
use crate::session::Session;

static STORAGE_GROUP_CLASS: ResourceClass = ResourceClass {
    name: "storage-group",
    base_uri: "/api/storage-groups",
    list_key: "storage-groups",
    name_prop: "name",
    case_insensitive_names: false,
    server_filter_props: &["name", "cpc-uri", "type"],
    is_element: false,
    cacheable_names: true,
    list_requires_api_version: Some((2, 23)),
    uris_prop: None,
};

/// Manager of the storage groups defined on this HMC.
#[derive(Debug, Clone)]
pub struct StorageGroupManager {
    base: Manager,
}

impl StorageGroupManager {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self {
            base: Manager::new(
                session,
                &STORAGE_GROUP_CLASS,
                None,
                "/api/storage-groups".to_string(),
            ),
        }
    }

    /// The generic manager underneath.
    pub fn base(&self) -> &Manager {
        &self.base
    }

    /// List storage groups; see [`Manager::list`]. Use a `cpc-uri` filter
    /// to narrow to one CPC (applied server-side).
    pub async fn list(
        &self,
        filters: Option<&PropertyMap>,
        full_properties: bool,
    ) -> Result<Vec<StorageGroup>> {
        Ok(self
            .base
            .list(filters, full_properties)
            .await?
            .into_iter()
            .map(StorageGroup::from_resource)
            .collect())
    }

    /// Find exactly one storage group; see [`Manager::find`].
    pub async fn find(&self, filters: &PropertyMap) -> Result<StorageGroup> {
        self.base
            .find(filters)
            .await
            .map(StorageGroup::from_resource)
    }

    /// Find a storage group by name, consulting the name cache.
    pub async fn find_by_name(&self, name: &str) -> Result<StorageGroup> {
        self.base
            .find_by_name(name)
            .await
            .map(StorageGroup::from_resource)
    }

    /// List with filters, allowing any number of matches.
    pub async fn findall(&self, filters: Option<&PropertyMap>) -> Result<Vec<StorageGroup>> {
        Ok(self
            .base
            .findall(filters)
            .await?
            .into_iter()
            .map(StorageGroup::from_resource)
            .collect())
    }

    /// Drop cached storage group name entries.
    pub fn invalidate_cache(&self) {
        self.base.invalidate_cache();
    }
}

/// One storage group.
#[derive(Debug, Clone)]
pub struct StorageGroup {
    resource: Resource,
}

impl Deref for StorageGroup {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl StorageGroup {
    pub(crate) fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    /// The generic resource underneath.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Object URI of the CPC this storage group is associated with.
    pub async fn cpc_uri(&self) -> Result<Option<String>> {
        Ok(self
            .resource
            .get_property("cpc-uri")
            .await?
            .and_then(|v| v.as_str().map(str::to_string)))
    }
}
