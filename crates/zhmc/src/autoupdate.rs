//! Auto-update engine.
//!
//! A per-session singleton, created on the first `enable_auto_update`
//! call and destroyed when the last subscriber disables it. It owns the
//! session's one notification subscription (the built-in object
//! notification topic) and two registries: object URI to subscribed
//! resources, and class to subscribed managers. One background task
//! dispatches every inbound notification:
//!
//! - property-change / status-change mutate the property maps of
//!   subscribed resources with that URI
//! - inventory-change `add` invalidates the name cache entry and appends
//!   a fresh resource to subscribed managers' live lists
//! - inventory-change `remove` invalidates the cache, marks subscribed
//!   resources as ceased, and drops them from live lists
//! - notifications for unsubscribed URIs/classes are dropped without
//!   error

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use zhmc_core::{HmcNotification, InventoryAction, Notification, NotificationHandle};

use crate::manager::ManagerInner;
use crate::resource::ResourceInner;
use crate::session::Session;

#[derive(Debug, Default)]
struct Registries {
    resources: Mutex<HashMap<String, Vec<Weak<ResourceInner>>>>,
    managers: Mutex<HashMap<String, Vec<Weak<ManagerInner>>>>,
}

impl Registries {
    fn resources_for(&self, uri: &str) -> Vec<Arc<ResourceInner>> {
        self.resources
            .lock()
            .get(uri)
            .map(|subscribers| subscribers.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    fn managers_for(&self, class: &str) -> Vec<Arc<ManagerInner>> {
        self.managers
            .lock()
            .get(class)
            .map(|subscribers| subscribers.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    fn prune(&self) {
        let mut resources = self.resources.lock();
        for subscribers in resources.values_mut() {
            subscribers.retain(|w| w.strong_count() > 0);
        }
        resources.retain(|_, subscribers| !subscribers.is_empty());
        let mut managers = self.managers.lock();
        for subscribers in managers.values_mut() {
            subscribers.retain(|w| w.strong_count() > 0);
        }
        managers.retain(|_, subscribers| !subscribers.is_empty());
    }
}

/// The per-session auto-update engine; see the module docs.
#[derive(Debug)]
pub(crate) struct AutoUpdater {
    registries: Arc<Registries>,
    cancel: CancellationToken,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AutoUpdater {
    /// Spawn the dispatch task over an open notification subscription.
    pub(crate) fn start(session: Weak<Session>, handle: NotificationHandle) -> Arc<Self> {
        let registries = Arc::new(Registries::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(dispatch_loop(
            session,
            handle,
            registries.clone(),
            cancel.clone(),
        ));
        Arc::new(Self {
            registries,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    pub(crate) fn register_resource(&self, inner: &Arc<ResourceInner>) {
        let mut resources = self.registries.resources.lock();
        let subscribers = resources.entry(inner.uri().to_string()).or_default();
        if !subscribers
            .iter()
            .any(|w| w.upgrade().is_some_and(|a| Arc::ptr_eq(&a, inner)))
        {
            subscribers.push(Arc::downgrade(inner));
        }
    }

    pub(crate) fn deregister_resource(&self, inner: &Arc<ResourceInner>) {
        let mut resources = self.registries.resources.lock();
        if let Some(subscribers) = resources.get_mut(inner.uri()) {
            subscribers.retain(|w| w.upgrade().is_some_and(|a| !Arc::ptr_eq(&a, inner)));
            if subscribers.is_empty() {
                resources.remove(inner.uri());
            }
        }
    }

    pub(crate) fn register_manager(&self, inner: &Arc<ManagerInner>) {
        let mut managers = self.registries.managers.lock();
        let subscribers = managers.entry(inner.class().name.to_string()).or_default();
        if !subscribers
            .iter()
            .any(|w| w.upgrade().is_some_and(|a| Arc::ptr_eq(&a, inner)))
        {
            subscribers.push(Arc::downgrade(inner));
        }
    }

    pub(crate) fn deregister_manager(&self, inner: &Arc<ManagerInner>) {
        let mut managers = self.registries.managers.lock();
        if let Some(subscribers) = managers.get_mut(inner.class().name) {
            subscribers.retain(|w| w.upgrade().is_some_and(|a| !Arc::ptr_eq(&a, inner)));
            if subscribers.is_empty() {
                managers.remove(inner.class().name);
            }
        }
    }

    /// Whether no live subscribers remain.
    pub(crate) fn is_empty(&self) -> bool {
        self.registries.prune();
        self.registries.resources.lock().is_empty() && self.registries.managers.lock().is_empty()
    }

    /// Cancel the dispatch task and the subscription.
    pub(crate) async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .is_err()
            {
                warn!("auto-update dispatch task did not stop within 5s");
            }
        }
    }
}

async fn dispatch_loop(
    session: Weak<Session>,
    mut handle: NotificationHandle,
    registries: Arc<Registries>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                handle.close();
                debug!("auto-update engine stopped");
                return;
            }
            item = handle.recv() => match item {
                Some(Ok(notification)) => dispatch(&session, &registries, &notification),
                Some(Err(error)) => {
                    warn!(error = %error, "notification error in auto-update stream");
                }
                None => {
                    warn!("auto-update notification stream ended");
                    return;
                }
            }
        }
    }
}

fn dispatch(session: &Weak<Session>, registries: &Registries, notification: &Notification) {
    let parsed = match HmcNotification::try_from(notification) {
        Ok(parsed) => parsed,
        Err(error) => {
            warn!(error = %error, "dropping unparseable object notification");
            return;
        }
    };
    match parsed {
        HmcNotification::PropertyChange {
            object_uri,
            changes,
            ..
        }
        | HmcNotification::StatusChange {
            object_uri,
            changes,
            ..
        } => {
            for resource in registries.resources_for(&object_uri) {
                resource.apply_change_reports(&changes);
            }
        }
        HmcNotification::InventoryChange {
            object_uri,
            class,
            action,
        } => {
            if let Some(session) = session.upgrade() {
                session.cache().remove_uri(&class, &object_uri);
            }
            match action {
                InventoryAction::Add => {
                    for manager in registries.managers_for(&class) {
                        manager.live_add_uri(&object_uri);
                    }
                }
                InventoryAction::Remove => {
                    debug!(uri = %object_uri, "resource ceased existence");
                    for resource in registries.resources_for(&object_uri) {
                        resource.mark_ceased();
                    }
                    for manager in registries.managers_for(&class) {
                        manager.live_remove(&object_uri);
                    }
                }
            }
        }
        HmcNotification::OsMessage { .. }
        | HmcNotification::JobCompletion { .. }
        | HmcNotification::Other { .. } => {}
    }
}
