//! Partitions of a CPC in DPM mode.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use zhmc_core::{PropertyMap, Result};

use crate::job::Job;
use crate::manager::{Manager, ResourceClass};
use crate::resource::Resource;
use crate::session::{PostOptions, Session};

static PARTITION_CLASS: ResourceClass = ResourceClass {
    name: "partition",
    base_uri: "/api/partitions",
    list_key: "partitions",
    name_prop: "name",
    case_insensitive_names: false,
    server_filter_props: &["name", "status", "type"],
    is_element: false,
    cacheable_names: true,
    list_requires_api_version: None,
    uris_prop: None,
};

/// Manager of the partitions of one CPC.
#[derive(Debug, Clone)]
pub struct PartitionManager {
    base: Manager,
    create_uri: String,
}

impl PartitionManager {
    pub(crate) fn new(session: Arc<Session>, cpc_uri: &str) -> Self {
        let list_uri = format!("{cpc_uri}/partitions");
        Self {
            create_uri: list_uri.clone(),
            base: Manager::new(
                session,
                &PARTITION_CLASS,
                Some(cpc_uri.to_string()),
                list_uri,
            ),
        }
    }

    /// The generic manager underneath.
    pub fn base(&self) -> &Manager {
        &self.base
    }

    /// List partitions; see [`Manager::list`].
    pub async fn list(
        &self,
        filters: Option<&PropertyMap>,
        full_properties: bool,
    ) -> Result<Vec<Partition>> {
        Ok(self
            .base
            .list(filters, full_properties)
            .await?
            .into_iter()
            .map(Partition::from_resource)
            .collect())
    }

    /// Find exactly one partition; see [`Manager::find`].
    pub async fn find(&self, filters: &PropertyMap) -> Result<Partition> {
        self.base.find(filters).await.map(Partition::from_resource)
    }

    /// Find a partition by name, consulting the name cache.
    pub async fn find_by_name(&self, name: &str) -> Result<Partition> {
        self.base
            .find_by_name(name)
            .await
            .map(Partition::from_resource)
    }

    /// List with filters, allowing any number of matches.
    pub async fn findall(&self, filters: Option<&PropertyMap>) -> Result<Vec<Partition>> {
        Ok(self
            .base
            .findall(filters)
            .await?
            .into_iter()
            .map(Partition::from_resource)
            .collect())
    }

    /// Create a partition on this CPC.
    pub async fn create(&self, props: &PropertyMap) -> Result<Partition> {
        self.base
            .create(&self.create_uri, props)
            .await
            .map(Partition::from_resource)
    }

    /// Drop cached partition name entries.
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

/// One partition of a CPC in DPM mode.
#[derive(Debug, Clone)]
pub struct Partition {
    resource: Resource,
}

impl Deref for Partition {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl Partition {
    pub(crate) fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    /// The generic resource underneath.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Manager of this partition's NICs.
    pub fn nics(&self) -> crate::resources::nic::NicManager {
        crate::resources::nic::NicManager::new(self.resource.session().clone(), self.resource.uri())
    }

    /// Start the partition (asynchronous HMC operation).
    ///
    /// With `wait_for_completion` the job is polled under
    /// `operation_timeout` and `None` is returned; otherwise the [`Job`]
    /// handle is returned for the caller to poll.
    pub async fn start(
        &self,
        wait_for_completion: bool,
        operation_timeout: Option<Duration>,
    ) -> Result<Option<Job>> {
        self.operation("start", wait_for_completion, operation_timeout)
            .await
    }

    /// Stop the partition (asynchronous HMC operation). Only permitted
    /// from the `active`, `degraded`, or `paused` statuses.
    pub async fn stop(
        &self,
        wait_for_completion: bool,
        operation_timeout: Option<Duration>,
    ) -> Result<Option<Job>> {
        self.operation("stop", wait_for_completion, operation_timeout)
            .await
    }

    async fn operation(
        &self,
        name: &str,
        wait_for_completion: bool,
        operation_timeout: Option<Duration>,
    ) -> Result<Option<Job>> {
        let mut options = PostOptions::default();
        if let Some(timeout) = operation_timeout {
            options = options.with_operation_timeout(timeout);
        }
        if !wait_for_completion {
            options = options.no_wait();
        }
        let uri = format!("{}/operations/{name}", self.resource.uri());
        let result = self
            .resource
            .session()
            .post(&uri, None, &options)
            .await?;
        Ok(result.into_job())
    }

    /// Upload a boot ISO image for this partition. The image bytes are
    /// sent verbatim as an opaque body.
    pub async fn mount_iso(&self, image_name: &str, image: Bytes) -> Result<()> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("image-name", image_name)
            .finish();
        let uri = format!("{}/operations/mount-iso?{query}", self.resource.uri());
        self.resource
            .session()
            .post_binary(&uri, "application/octet-stream", image, &PostOptions::default())
            .await?;
        Ok(())
    }
}
