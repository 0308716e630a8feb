//! Users defined on the HMC console.

use std::ops::Deref;
use std::sync::Arc;

use zhmc_core::{PropertyMap, Result};

use crate::manager::{Manager, ResourceClass};
use crate::resource::Resource;
use crate::session::Session;

static USER_CLASS: ResourceClass = ResourceClass {
    name: "user",
    base_uri: "/api/users",
    list_key: "users",
    name_prop: "name",
    case_insensitive_names: true,
    server_filter_props: &["name", "type"],
    is_element: false,
    cacheable_names: true,
    list_requires_api_version: None,
    uris_prop: None,
};

const USERS_URI: &str = "/api/console/users";

/// Manager of the users defined on the HMC console.
#[derive(Debug, Clone)]
pub struct UserManager {
    base: Manager,
}

impl UserManager {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self {
            base: Manager::new(
                session,
                &USER_CLASS,
                Some("/api/console".to_string()),
                USERS_URI.to_string(),
            ),
        }
    }

    /// The generic manager underneath.
    pub fn base(&self) -> &Manager {
        &self.base
    }

    /// List users; see [`Manager::list`].
    pub async fn list(
        &self,
        filters: Option<&PropertyMap>,
        full_properties: bool,
    ) -> Result<Vec<User>> {
        Ok(self
            .base
            .list(filters, full_properties)
            .await?
            .into_iter()
            .map(User::from_resource)
            .collect())
    }

    /// Find exactly one user; see [`Manager::find`].
    pub async fn find(&self, filters: &PropertyMap) -> Result<User> {
        self.base.find(filters).await.map(User::from_resource)
    }

    /// Find a user by name (case-insensitive), consulting the name cache.
    pub async fn find_by_name(&self, name: &str) -> Result<User> {
        self.base.find_by_name(name).await.map(User::from_resource)
    }

    /// List with filters, allowing any number of matches.
    pub async fn findall(&self, filters: Option<&PropertyMap>) -> Result<Vec<User>> {
        Ok(self
            .base
            .findall(filters)
            .await?
            .into_iter()
            .map(User::from_resource)
            .collect())
    }

    /// Create a user on the console.
    pub async fn create(&self, props: &PropertyMap) -> Result<User> {
        self.base
            .create(USERS_URI, props)
            .await
            .map(User::from_resource)
    }

    /// Drop cached user name entries.
    pub fn invalidate_cache(&self) {
        self.base.invalidate_cache();
    }
}

/// One HMC user.
#[derive(Debug, Clone)]
pub struct User {
    resource: Resource,
}

impl Deref for User {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl User {
    pub(crate) fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    /// The generic resource underneath.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }
}
