//! The faked HMC: resource store, sessions, jobs, notification
//! publication.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

use zhmc_core::{
    HmcConnection, Notification, NotificationBackend, PropertyMap, notification::header,
};

use crate::backend::MockNotificationBackend;
use crate::connection::MockConnection;
use crate::topics::TopicRegistry;

/// Object notification topic of the faked HMC, reported at logon.
pub const OBJECT_TOPIC: &str = "mock.object-notifications";

/// Job notification topic of the faked HMC, reported at logon.
pub const JOB_TOPIC: &str = "mock.job-notifications";

/// One faked resource in the store.
#[derive(Debug, Clone)]
pub(crate) struct MockResource {
    pub uri: String,
    pub class: String,
    pub parent: Option<String>,
    pub properties: PropertyMap,
}

/// One faked asynchronous job.
#[derive(Debug, Clone)]
pub(crate) struct MockJob {
    pub status: String,
    pub status_code: Option<u64>,
    pub reason_code: Option<i64>,
    pub results: Value,
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    pub resources: Vec<MockResource>,
    pub sessions: HashMap<String, String>,
    pub jobs: HashMap<String, MockJob>,
    pub credentials: Option<(String, String)>,
    pub logon_count: u64,
    pub hold_jobs: bool,
    pub available: bool,
    pub force_expired_responses: u32,
    pub force_busy_responses: u32,
}

#[derive(Debug)]
pub(crate) struct MockHmcInner {
    pub name: String,
    pub hmc_version: String,
    pub api_version: (u64, u64),
    pub state: Mutex<MockState>,
    pub topics: TopicRegistry,
}

/// An in-memory faked HMC.
///
/// Cheap to clone; all clones share the same state. Obtain a
/// [`MockConnection`] and a [`MockNotificationBackend`] from it and hand
/// them to `Session::with_connection`.
#[derive(Debug, Clone)]
pub struct MockHmc {
    pub(crate) inner: Arc<MockHmcInner>,
}

impl MockHmc {
    /// A faked HMC with the given name, HMC version (e.g. `"2.16.0"`),
    /// and (major, minor) Web Services API version.
    pub fn new(name: &str, hmc_version: &str, api_version: (u64, u64)) -> Self {
        Self {
            inner: Arc::new(MockHmcInner {
                name: name.to_string(),
                hmc_version: hmc_version.to_string(),
                api_version,
                state: Mutex::new(MockState {
                    available: true,
                    ..MockState::default()
                }),
                topics: TopicRegistry::default(),
            }),
        }
    }

    /// The faked HMC's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// A request-response connection to this faked HMC.
    pub fn connection(&self) -> Arc<dyn HmcConnection> {
        Arc::new(MockConnection::new(self.clone()))
    }

    /// A notification backend over this faked HMC's in-memory topics.
    pub fn notification_backend(&self) -> Arc<dyn NotificationBackend> {
        Arc::new(MockNotificationBackend::new(self.clone()))
    }

    // ---------------------------------------------------------------
    // Test knobs
    // ---------------------------------------------------------------

    /// Restrict logon to one accepted userid/password pair. Without
    /// this, any credentials are accepted.
    pub fn set_credentials(&self, userid: &str, password: &str) {
        self.inner.state.lock().credentials = Some((userid.to_string(), password.to_string()));
    }

    /// Invalidate every session token, as an idle-timeout would.
    pub fn expire_all_sessions(&self) {
        self.inner.state.lock().sessions.clear();
    }

    /// Answer the next `count` authenticated requests with 403.5
    /// regardless of token validity.
    pub fn force_session_expiry(&self, count: u32) {
        self.inner.state.lock().force_expired_responses = count;
    }

    /// Answer the next `count` authenticated POST/DELETE requests with
    /// 409.1 (busy).
    pub fn force_busy_responses(&self, count: u32) {
        self.inner.state.lock().force_busy_responses = count;
    }

    /// Keep jobs in `running` until [`complete_job`](Self::complete_job)
    /// is called, instead of completing them at operation time.
    pub fn hold_jobs(&self, hold: bool) {
        self.inner.state.lock().hold_jobs = hold;
    }

    /// Make the HMC reachable or unreachable (connection failures), as a
    /// restart would.
    pub fn set_available(&self, available: bool) {
        self.inner.state.lock().available = available;
    }

    /// Whether the HMC currently accepts connections.
    pub fn is_available(&self) -> bool {
        self.inner.state.lock().available
    }

    /// Number of logons performed against this faked HMC.
    pub fn logon_count(&self) -> u64 {
        self.inner.state.lock().logon_count
    }

    /// Number of currently valid session tokens.
    pub fn session_count(&self) -> usize {
        self.inner.state.lock().sessions.len()
    }

    /// Number of live subscriptions on the object notification topic.
    pub fn object_topic_subscriber_count(&self) -> usize {
        self.inner.topics.subscriber_count(OBJECT_TOPIC)
    }

    // ---------------------------------------------------------------
    // Resource tree construction
    // ---------------------------------------------------------------

    /// Add the console singleton. Its URI is always `/api/console`.
    pub fn add_console(&self, name: &str, props: PropertyMap) -> String {
        self.insert_resource("console", "/api/console".to_string(), None, name, props)
    }

    /// Add a CPC; returns its object URI.
    pub fn add_cpc(&self, name: &str, props: PropertyMap) -> String {
        let uri = format!("/api/cpcs/{}", Uuid::new_v4());
        self.insert_resource("cpc", uri, None, name, props)
    }

    /// Add a partition under a CPC; returns its object URI. The status
    /// defaults to `stopped`.
    pub fn add_partition(&self, cpc_uri: &str, name: &str, mut props: PropertyMap) -> String {
        props
            .entry("status".to_string())
            .or_insert(json!("stopped"));
        let uri = format!("/api/partitions/{}", Uuid::new_v4());
        self.insert_resource("partition", uri, Some(cpc_uri.to_string()), name, props)
    }

    /// Add an LPAR under a CPC; returns its object URI. The status
    /// defaults to `not-activated`.
    pub fn add_lpar(&self, cpc_uri: &str, name: &str, mut props: PropertyMap) -> String {
        props
            .entry("status".to_string())
            .or_insert(json!("not-activated"));
        let uri = format!("/api/logical-partitions/{}", Uuid::new_v4());
        self.insert_resource(
            "logical-partition",
            uri,
            Some(cpc_uri.to_string()),
            name,
            props,
        )
    }

    /// Add an adapter under a CPC; returns its object URI.
    pub fn add_adapter(&self, cpc_uri: &str, name: &str, props: PropertyMap) -> String {
        let uri = format!("/api/adapters/{}", Uuid::new_v4());
        self.insert_resource("adapter", uri, Some(cpc_uri.to_string()), name, props)
    }

    /// Add a storage group; returns its object URI. Storage groups are
    /// root-level; associate them with a CPC via a `cpc-uri` property.
    pub fn add_storage_group(&self, name: &str, props: PropertyMap) -> String {
        let uri = format!("/api/storage-groups/{}", Uuid::new_v4());
        self.insert_resource("storage-group", uri, None, name, props)
    }

    /// Add a console user; returns its object URI.
    pub fn add_user(&self, name: &str, props: PropertyMap) -> String {
        let uri = format!("/api/users/{}", Uuid::new_v4());
        self.insert_resource("user", uri, Some("/api/console".to_string()), name, props)
    }

    /// Add a NIC element under a partition; returns its element URI.
    /// The partition's `nic-uris` property is maintained accordingly.
    pub fn add_nic(&self, partition_uri: &str, name: &str, mut props: PropertyMap) -> String {
        let uri = format!("{partition_uri}/nics/{}", Uuid::new_v4());
        props.insert("element-uri".to_string(), json!(uri));
        props.insert("class".to_string(), json!("nic"));
        props.insert("name".to_string(), json!(name));
        let mut state = self.inner.state.lock();
        state.resources.push(MockResource {
            uri: uri.clone(),
            class: "nic".to_string(),
            parent: Some(partition_uri.to_string()),
            properties: props,
        });
        if let Some(partition) = state
            .resources
            .iter_mut()
            .find(|r| r.uri == partition_uri)
        {
            let uris = partition
                .properties
                .entry("nic-uris".to_string())
                .or_insert(Value::Array(Vec::new()));
            if let Value::Array(uris) = uris {
                uris.push(json!(uri));
            }
        }
        uri
    }

    /// Detach an element from its parent's URI-list property.
    pub(crate) fn detach_from_parent_uris(&self, uri: &str, uris_prop: &str) {
        let mut state = self.inner.state.lock();
        let parent_uri = state
            .resources
            .iter()
            .find(|r| r.uri == uri)
            .and_then(|r| r.parent.clone());
        if let Some(parent_uri) = parent_uri {
            if let Some(parent) = state.resources.iter_mut().find(|r| r.uri == parent_uri) {
                if let Some(Value::Array(uris)) = parent.properties.get_mut(uris_prop) {
                    uris.retain(|u| u.as_str() != Some(uri));
                }
            }
        }
    }

    fn insert_resource(
        &self,
        class: &str,
        uri: String,
        parent: Option<String>,
        name: &str,
        mut props: PropertyMap,
    ) -> String {
        props.insert("object-uri".to_string(), json!(uri));
        props.insert("class".to_string(), json!(class));
        props.insert("name".to_string(), json!(name));
        debug!(class, uri = %uri, name, "adding faked resource");
        self.inner.state.lock().resources.push(MockResource {
            uri: uri.clone(),
            class: class.to_string(),
            parent,
            properties: props,
        });
        uri
    }

    // ---------------------------------------------------------------
    // Store access
    // ---------------------------------------------------------------

    /// Properties of a stored resource.
    pub fn resource_properties(&self, uri: &str) -> Option<PropertyMap> {
        self.inner
            .state
            .lock()
            .resources
            .iter()
            .find(|r| r.uri == uri)
            .map(|r| r.properties.clone())
    }

    /// Set one property of a stored resource without publishing a
    /// notification.
    pub fn set_resource_property(&self, uri: &str, name: &str, value: Value) {
        let mut state = self.inner.state.lock();
        if let Some(resource) = state.resources.iter_mut().find(|r| r.uri == uri) {
            resource.properties.insert(name.to_string(), value);
        }
    }

    pub(crate) fn class_of(&self, uri: &str) -> Option<String> {
        self.inner
            .state
            .lock()
            .resources
            .iter()
            .find(|r| r.uri == uri)
            .map(|r| r.class.clone())
    }

    // ---------------------------------------------------------------
    // Notification publication
    // ---------------------------------------------------------------

    /// Update stored properties and publish a property-change
    /// notification for them.
    pub fn publish_property_change(&self, uri: &str, changes: &[(&str, Value)]) {
        let Some(class) = self.class_of(uri) else { return };
        {
            let mut state = self.inner.state.lock();
            if let Some(resource) = state.resources.iter_mut().find(|r| r.uri == uri) {
                for (name, value) in changes {
                    resource.properties.insert((*name).to_string(), value.clone());
                }
            }
        }
        self.publish_change(uri, &class, "property-change", changes);
    }

    /// Update the stored status and publish a status-change
    /// notification.
    pub fn publish_status_change(&self, uri: &str, status: &str) {
        let Some(class) = self.class_of(uri) else { return };
        self.set_resource_property(uri, "status", json!(status));
        self.publish_change(uri, &class, "status-change", &[("status", json!(status))]);
    }

    /// Publish an inventory-change `add` notification for an existing
    /// stored resource.
    pub fn publish_inventory_add(&self, uri: &str) {
        let Some(class) = self.class_of(uri) else { return };
        self.publish_inventory(uri, &class, "add");
    }

    /// Remove a resource from the store and publish an inventory-change
    /// `remove` notification.
    pub fn publish_inventory_remove(&self, uri: &str) {
        let Some(class) = self.class_of(uri) else { return };
        self.inner.state.lock().resources.retain(|r| r.uri != uri);
        self.publish_inventory(uri, &class, "remove");
    }

    fn publish_change(&self, uri: &str, class: &str, kind: &str, changes: &[(&str, Value)]) {
        let reports: Vec<Value> = changes
            .iter()
            .map(|(name, value)| {
                json!({"property-name": name, "new-value": value})
            })
            .collect();
        let mut headers = PropertyMap::new();
        headers.insert(header::NOTIFICATION_TYPE.to_string(), json!(kind));
        headers.insert(header::OBJECT_URI.to_string(), json!(uri));
        headers.insert(header::CLASS.to_string(), json!(class));
        self.inner.topics.publish(
            OBJECT_TOPIC,
            Notification {
                topic: OBJECT_TOPIC.to_string(),
                headers,
                body: json!({ "change-reports": reports }),
            },
        );
    }

    pub(crate) fn publish_inventory(&self, uri: &str, class: &str, action: &str) {
        let mut headers = PropertyMap::new();
        headers.insert(
            header::NOTIFICATION_TYPE.to_string(),
            json!("inventory-change"),
        );
        headers.insert(header::OBJECT_URI.to_string(), json!(uri));
        headers.insert(header::CLASS.to_string(), json!(class));
        headers.insert(header::ACTION.to_string(), json!(action));
        self.inner.topics.publish(
            OBJECT_TOPIC,
            Notification {
                topic: OBJECT_TOPIC.to_string(),
                headers,
                body: Value::Null,
            },
        );
    }

    /// Publish a job-completion notification on the job topic.
    pub fn publish_job_completion(&self, job_uri: &str, status: Value) {
        let mut headers = PropertyMap::new();
        headers.insert(
            header::NOTIFICATION_TYPE.to_string(),
            json!("job-completion"),
        );
        headers.insert(header::JOB_URI.to_string(), json!(job_uri));
        self.inner.topics.publish(
            JOB_TOPIC,
            Notification {
                topic: JOB_TOPIC.to_string(),
                headers,
                body: status,
            },
        );
    }

    // ---------------------------------------------------------------
    // Jobs
    // ---------------------------------------------------------------

    /// Create a job record; returns its URI. Honors
    /// [`hold_jobs`](Self::hold_jobs).
    pub(crate) fn create_job(&self) -> (String, bool) {
        let uri = format!("/api/jobs/{}", Uuid::new_v4());
        let mut state = self.inner.state.lock();
        let hold = state.hold_jobs;
        state.jobs.insert(
            uri.clone(),
            MockJob {
                status: if hold { "running" } else { "complete" }.to_string(),
                status_code: None,
                reason_code: None,
                results: Value::Null,
            },
        );
        (uri, hold)
    }

    /// Drive a held job to a terminal status.
    pub fn complete_job(&self, job_uri: &str, status: &str, results: Value) {
        let mut state = self.inner.state.lock();
        if let Some(job) = state.jobs.get_mut(job_uri) {
            job.status = status.to_string();
            job.results = results;
        }
    }

    /// Fail a held job with the given job error fields.
    pub fn fail_job(&self, job_uri: &str, status_code: u64, reason_code: i64, message: &str) {
        let mut state = self.inner.state.lock();
        if let Some(job) = state.jobs.get_mut(job_uri) {
            job.status = "complete-with-error".to_string();
            job.status_code = Some(status_code);
            job.reason_code = Some(reason_code);
            job.results = json!({ "message": message });
        }
    }

    pub(crate) fn topics(&self) -> &TopicRegistry {
        &self.inner.topics
    }

    /// Validate a session token.
    pub(crate) fn valid_token(&self, token: &str) -> bool {
        self.inner.state.lock().sessions.contains_key(token)
    }

    /// Validate notification-service credentials: the configured
    /// userid/password, or a valid session token in the userid slot.
    pub(crate) fn notification_auth_ok(&self, userid: &str, password: &str) -> bool {
        let state = self.inner.state.lock();
        if state.sessions.contains_key(userid) {
            return true;
        }
        match &state.credentials {
            Some((expected_userid, expected_password)) => {
                expected_userid == userid && expected_password == password
            }
            None => true,
        }
    }
}
