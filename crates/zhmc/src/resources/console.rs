//! The HMC's own console resource.

use std::ops::Deref;
use std::sync::Arc;

use serde_json::json;

use zhmc_core::{Error, Result};

use crate::manager::{Manager, ResourceClass};
use crate::resource::Resource;
use crate::resources::user::UserManager;
use crate::session::{PostOptions, Session};

static CONSOLE_CLASS: ResourceClass = ResourceClass {
    name: "console",
    base_uri: "/api/console",
    list_key: "consoles",
    name_prop: "name",
    case_insensitive_names: false,
    server_filter_props: &[],
    is_element: false,
    cacheable_names: false,
    list_requires_api_version: None,
    uris_prop: None,
};

/// Manager of the (single) console resource of the HMC.
#[derive(Debug, Clone)]
pub struct ConsoleManager {
    base: Manager,
}

impl ConsoleManager {
    pub(crate) fn new(session: Arc<Session>) -> Self {
        Self {
            base: Manager::new(session, &CONSOLE_CLASS, None, "/api/console".to_string()),
        }
    }

    /// The generic manager underneath.
    pub fn base(&self) -> &Manager {
        &self.base
    }

    /// The console resource. There is exactly one per HMC.
    pub async fn get(&self) -> Result<Console> {
        let value = self.base.session().get("/api/console").await?;
        let props = value.as_object().cloned().ok_or_else(|| {
            Error::Consistency("GET /api/console returned a non-object body".to_string())
        })?;
        self.base
            .resource_from_props(props)
            .map(Console::from_resource)
    }

    /// The console as a one-element list, for symmetry with the other
    /// managers.
    pub async fn list(&self) -> Result<Vec<Console>> {
        Ok(vec![self.get().await?])
    }
}

/// The HMC console.
#[derive(Debug, Clone)]
pub struct Console {
    resource: Resource,
}

impl Deref for Console {
    type Target = Resource;

    fn deref(&self) -> &Resource {
        &self.resource
    }
}

impl Console {
    pub(crate) fn from_resource(resource: Resource) -> Self {
        Self { resource }
    }

    /// The generic resource underneath.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Manager of the users defined on this console.
    pub fn users(&self) -> UserManager {
        UserManager::new(self.resource.session().clone())
    }

    /// Restart the HMC itself. The response carries no job to track;
    /// follow up with
    /// [`Session::wait_for_available`](crate::Session::wait_for_available).
    pub async fn restart(&self, force: bool) -> Result<()> {
        let uri = format!("{}/operations/restart", self.resource.uri());
        let body = json!({ "force": force });
        self.resource
            .session()
            .post(&uri, Some(&body), &PostOptions::default())
            .await?;
        Ok(())
    }
}
