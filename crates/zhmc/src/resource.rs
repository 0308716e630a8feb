//! The generic resource: stable object URI plus a mutable property map.
//!
//! Every concrete resource type (CPC, partition, LPAR, adapter, ...) is a
//! thin wrapper around [`Resource`]. The property map is an open-ended
//! mapping because the property set varies by HMC and API version.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Weak;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use zhmc_core::{Error, PropertyChangeReport, PropertyMap, PropertyMapExt, Result};

use crate::manager::{ManagerInner, ResourceClass};
use crate::session::{DeleteOptions, PostOptions, Session};

/// Interval between polls in [`Resource::wait_for_status`].
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub(crate) struct ResourceInner {
    session: Arc<Session>,
    class: &'static ResourceClass,
    manager: Weak<ManagerInner>,
    uri: String,
    props: RwLock<PropertyMap>,
    full: AtomicBool,
    ceased: AtomicBool,
    auto: AtomicBool,
}

impl ResourceInner {
    pub(crate) fn uri(&self) -> &str {
        &self.uri
    }

    /// Apply property/status change reports from a notification.
    pub(crate) fn apply_change_reports(&self, changes: &[PropertyChangeReport]) {
        let mut props = self.props.write();
        for change in changes {
            debug!(
                uri = %self.uri,
                property = %change.name,
                "applying property change from notification"
            );
            props.insert(change.name.clone(), change.new_value.clone());
        }
    }

    /// Mark the underlying HMC resource as no longer existing. Terminal.
    pub(crate) fn mark_ceased(&self) {
        self.ceased.store(true, Ordering::SeqCst);
    }

    /// Record that the property map holds the full property set.
    pub(crate) fn mark_full(&self) {
        self.full.store(true, Ordering::SeqCst);
    }
}

/// A resource on the HMC: immutable object URI, mutable property map.
///
/// Handles are cheap to clone and share their state; two handles obtained
/// from separate `list` calls are independent, each reflecting what it
/// last observed.
#[derive(Debug, Clone)]
pub struct Resource {
    pub(crate) inner: Arc<ResourceInner>,
}

impl Resource {
    pub(crate) fn new(
        session: Arc<Session>,
        class: &'static ResourceClass,
        manager: Weak<ManagerInner>,
        uri: String,
        props: PropertyMap,
    ) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                session,
                class,
                manager,
                uri,
                props: RwLock::new(props),
                full: AtomicBool::new(false),
                ceased: AtomicBool::new(false),
                auto: AtomicBool::new(false),
            }),
        }
    }

    /// The object URI. Stable for the lifetime of the resource on the
    /// HMC; unique within a session.
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// The resource class name, e.g. `"partition"`.
    pub fn class_name(&self) -> &'static str {
        self.inner.class.name
    }

    /// The session this resource belongs to.
    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// Snapshot of the current property map.
    pub fn properties(&self) -> PropertyMap {
        self.inner.props.read().clone()
    }

    /// A locally present property value.
    pub fn prop(&self, name: &str) -> Option<Value> {
        self.inner.props.read().get(name).cloned()
    }

    /// A locally present property value, with a fallback.
    pub fn prop_or(&self, name: &str, default: Value) -> Value {
        self.prop(name).unwrap_or(default)
    }

    /// A locally present string property.
    pub fn prop_str(&self, name: &str) -> Option<String> {
        self.inner.props.read().get_str(name).map(str::to_string)
    }

    /// A locally present boolean property.
    pub fn prop_bool(&self, name: &str) -> Option<bool> {
        self.inner.props.read().get_bool(name)
    }

    /// A locally present integer property.
    pub fn prop_i64(&self, name: &str) -> Option<i64> {
        self.inner.props.read().get_i64(name)
    }

    /// The resource name.
    pub fn name(&self) -> Result<String> {
        let name_prop = self.inner.class.name_prop;
        self.prop(name_prop)
            .and_then(|v| v.as_str().map(str::to_string))
            .ok_or_else(|| {
                Error::Consistency(format!(
                    "{} {} carries no {name_prop:?} property",
                    self.class_name(),
                    self.uri()
                ))
            })
    }

    /// Whether the full property set has been retrieved.
    pub fn has_full_properties(&self) -> bool {
        self.inner.full.load(Ordering::SeqCst)
    }

    /// Whether the underlying HMC resource is known to no longer exist.
    /// The local properties then reflect the last observed state.
    pub fn ceased_existence(&self) -> bool {
        self.inner.ceased.load(Ordering::SeqCst)
    }

    /// Whether this handle receives auto-updates.
    pub fn auto_update_enabled(&self) -> bool {
        self.inner.auto.load(Ordering::SeqCst)
    }

    fn ensure_exists(&self) -> Result<()> {
        if self.ceased_existence() {
            return Err(Error::CeasedExistence {
                uri: self.uri().to_string(),
            });
        }
        Ok(())
    }

    /// A property value, retrieving the full property set from the HMC if
    /// the property is not locally present yet.
    pub async fn get_property(&self, name: &str) -> Result<Option<Value>> {
        if let Some(value) = self.prop(name) {
            return Ok(Some(value));
        }
        if self.has_full_properties() {
            return Ok(None);
        }
        self.pull_full_properties().await?;
        Ok(self.prop(name))
    }

    /// GET the resource URI and replace the local property map with the
    /// full property set.
    pub async fn pull_full_properties(&self) -> Result<()> {
        self.ensure_exists()?;
        let value = self.inner.session.get(self.uri()).await?;
        let props = value.as_object().cloned().ok_or_else(|| {
            Error::Consistency(format!(
                "GET {} returned a non-object body",
                self.uri()
            ))
        })?;
        *self.inner.props.write() = props;
        self.inner.full.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// POST a property update and mutate the local map with the diff.
    ///
    /// On auto-update-enabled resources the incoming notification is the
    /// source of truth; the local mutation is redundant but harmless.
    pub async fn update_properties(&self, diff: &PropertyMap) -> Result<()> {
        self.ensure_exists()?;
        let body = Value::Object(diff.clone());
        self.inner
            .session
            .post(self.uri(), Some(&body), &PostOptions::default())
            .await?;
        {
            let mut props = self.inner.props.write();
            for (name, value) in diff {
                props.insert(name.clone(), value.clone());
            }
        }
        let class = self.inner.class;
        if class.cacheable_names && diff.contains_key(class.name_prop) {
            // A rename invalidates whatever names mapped to this URI.
            self.inner.session.cache().remove_uri(class.name, self.uri());
        }
        Ok(())
    }

    /// DELETE the resource on the HMC, drop it from the name cache and
    /// from its manager's live list.
    pub async fn delete(&self) -> Result<()> {
        self.delete_with_options(&DeleteOptions::default()).await
    }

    /// [`delete`](Self::delete) with busy-retry options.
    pub async fn delete_with_options(&self, options: &DeleteOptions) -> Result<()> {
        self.ensure_exists()?;
        self.inner.session.delete(self.uri(), options).await?;
        let class = self.inner.class;
        if class.cacheable_names {
            self.inner.session.cache().remove_uri(class.name, self.uri());
        }
        if let Some(manager) = self.inner.manager.upgrade() {
            manager.live_remove(self.uri());
        }
        self.inner.mark_ceased();
        self.disable_auto_update().await;
        Ok(())
    }

    /// Keep this handle's properties in sync with the HMC from object
    /// notifications. Shares the session's single notification
    /// subscription.
    pub async fn enable_auto_update(&self) -> Result<()> {
        self.ensure_exists()?;
        if self.auto_update_enabled() {
            return Ok(());
        }
        let updater = self.inner.session.auto_updater().await?;
        updater.register_resource(&self.inner);
        self.inner.auto.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stop receiving auto-updates. Tears down the session's subscription
    /// when this was the last subscriber.
    pub async fn disable_auto_update(&self) {
        if !self.inner.auto.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(updater) = self.inner.session.current_auto_updater().await {
            updater.deregister_resource(&self.inner);
            self.inner.session.auto_updater_maybe_teardown().await;
        }
    }

    /// Poll the `status` property until it reaches one of the desired
    /// values, or raise [`Error::StatusTimeout`].
    pub async fn wait_for_status(
        &self,
        desired: &[&str],
        timeout: Option<Duration>,
    ) -> Result<String> {
        let timeout =
            timeout.unwrap_or(self.inner.session.config().retry_timeout.status_timeout);
        let deadline = Instant::now() + timeout;
        let mut actual: Option<String> = None;
        loop {
            let status = if self.auto_update_enabled() {
                self.prop("status")
            } else {
                self.pull_full_properties().await?;
                self.prop("status")
            };
            if let Some(status) = status.as_ref().and_then(Value::as_str) {
                if desired.contains(&status) {
                    return Ok(status.to_string());
                }
                actual = Some(status.to_string());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::StatusTimeout {
                    resource_uri: self.uri().to_string(),
                    actual,
                    desired: desired.iter().map(|s| s.to_string()).collect(),
                    timeout,
                });
            }
            tokio::time::sleep(STATUS_POLL_INTERVAL.min(deadline - now)).await;
        }
    }
}
