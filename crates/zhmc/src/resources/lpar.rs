//! LPARs (logical partitions) of a CPC in classic mode.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::json;

use zhmc_core::{PropertyMap, Result};

use crate::manager::{Manager, ResourceClass};
use crate::resource::Resource;
use crate::session::{PostOptions, PostResult, Session};

static LPAR_CLASS: ResourceClass = ResourceClass {
    name: "logical-partition",
    base_uri: "/api/logical-partitions",
    list_key: "logical-partitions",
    name_prop: "name",
    case_insensitive_names: false,
    server_filter_props: &["name"],
    is_element: false,
    cacheable_names: true,
    list_requires_api_version: None,
    uris_prop: None,
};

/// Manager of the LPARs of one CPC in classic mode.
#[derive(Debug, Clone)]
pub struct LparManager {
    base: Manager,
}

impl LparManager {
    pub(crate) fn new(session: Arc<Session>, cpc_uri: &str) -> Self {
        Self {
            base: Manager::new(
                session,
                &LPAR_CLASS,
                Some(cpc_uri.to_string()),
                format!("{cpc_uri}/logical-partitions"),
            ),
        }
    }

    /// The generic manager underneath.
    pub fn base(&self) -> &Manager {
        &self.base
    }

    /// List LPARs; see [`Manager::list`].
    pub async fn list(
        &self,
        filters: Option<&PropertyMap>,
        full_properties: bool,
    ) -> Result<Vec<Lpar>> {
        Ok(self
            .base
            .list(filters, full_properties)
            .await?
            .into_iter()
            .map(Lpar::from_resource)
            .collect())
    }

    /// Find exactly one LPAR; see [`Manager::find`].
    pub async fn find(&self, filters: &PropertyMap) -> Result<Lpar> {
        self.base.find(filters).await.map(Lpar::from_resource)
    }

    /// Find an LPAR by name, consulting the name cache.
    pub async fn find_by_name(&self, name: &str) -> Result<Lpar> {
        self.base.find_by_name(name).await.map(Lpar::from_resource)
    }

    /// List with filters, allowing any number of matches.
    pub async fn findall(&self, filters: Option<&PropertyMap>) -> Result<Vec<Lpar>> {
        Ok(self
            .base
            .findall(filters)
            .await?
            .into_iter()
            .map(Lpar::from_resource)
            .collect())
    }

    /// Drop cached LPAR name entries.
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

/// One LPAR of a CPC in classic mode.
///
/// The activate/deactivate/load operations are asynchronous on the HMC
/// and are known to report 409.1/409.2 while the LPAR is busy; pass
/// [`PostOptions::with_busy_retries`] to ride that out.
#[derive(Debug, Clone)]
pub struct Lpar {
    resource: Resource,
}

impl Deref for Lpar {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl Lpar {
    pub(crate) fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    /// The generic resource underneath.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Activate the LPAR. Permitted from `not-activated`.
    pub async fn activate(&self, options: &PostOptions) -> Result<PostResult> {
        let uri = format!("{}/operations/activate", self.resource.uri());
        self.resource.session().post(&uri, None, options).await
    }

    /// Deactivate the LPAR.
    pub async fn deactivate(&self, options: &PostOptions) -> Result<PostResult> {
        let uri = format!("{}/operations/deactivate", self.resource.uri());
        self.resource.session().post(&uri, None, options).await
    }

    /// Load (IPL) the LPAR. Permitted from `not-operating`.
    pub async fn load(
        &self,
        load_address: Option<&str>,
        options: &PostOptions,
    ) -> Result<PostResult> {
        let uri = format!("{}/operations/load", self.resource.uri());
        let body = load_address.map(|address| json!({ "load-address": address }));
        self.resource
            .session()
            .post(&uri, body.as_ref(), options)
            .await
    }
}
