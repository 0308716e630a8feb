//! The generic resource manager.
//!
//! Class metadata is a value ([`ResourceClass`]), not an inheritance
//! hierarchy: each concrete resource type passes its descriptor to the
//! generic [`Manager`], which implements listing, filtering, lookup with
//! the name-to-URI cache, creation, and the auto-updated live list.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use zhmc_core::{Error, PropertyMap, Result};

use crate::filter::{matches_filters, render_filters, split_filters};
use crate::resource::Resource;
use crate::session::{PostOptions, Session};

/// Descriptor of a resource class: everything the generic manager and
/// resource need to know about a concrete type.
#[derive(Debug)]
pub struct ResourceClass {
    /// Class identifier as the HMC reports it in the `class` property and
    /// in notifications, e.g. `"partition"`. Keys the name cache and the
    /// auto-update manager registry.
    pub name: &'static str,
    /// Base URI under which objects of the class live, e.g.
    /// `"/api/partitions"`.
    pub base_uri: &'static str,
    /// Field of the list response that carries the object array.
    pub list_key: &'static str,
    /// Name property, e.g. `"name"`.
    pub name_prop: &'static str,
    /// Whether name lookup is case-insensitive for this class.
    pub case_insensitive_names: bool,
    /// Properties the HMC can filter server-side on the list operation.
    pub server_filter_props: &'static [&'static str],
    /// Element (nested) resources carry `element-uri` instead of
    /// `object-uri`.
    pub is_element: bool,
    /// Whether names of this class are name-to-URI cacheable.
    pub cacheable_names: bool,
    /// Minimum (major, minor) API version required to list this class.
    pub list_requires_api_version: Option<(u64, u64)>,
    /// For element classes without a list operation: the parent property
    /// holding the element URIs, e.g. `"nic-uris"`. Listing then fetches
    /// the parent and GETs each element.
    pub uris_prop: Option<&'static str>,
}

impl ResourceClass {
    /// The property carrying the resource URI.
    pub fn uri_prop(&self) -> &'static str {
        if self.is_element {
            "element-uri"
        } else {
            "object-uri"
        }
    }

    pub(crate) fn normalize_name(&self, name: &str) -> String {
        if self.case_insensitive_names {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug)]
pub(crate) struct ManagerInner {
    session: Arc<Session>,
    class: &'static ResourceClass,
    parent_uri: Option<String>,
    list_uri: String,
    live: Mutex<Option<Vec<Resource>>>,
    auto: AtomicBool,
}

impl ManagerInner {
    pub(crate) fn class(&self) -> &'static ResourceClass {
        self.class
    }

    /// Append a freshly observed resource to the live list (inventory
    /// add).
    pub(crate) fn live_add_uri(self: &Arc<Self>, uri: &str) {
        if !self.auto.load(Ordering::SeqCst) {
            return;
        }
        let mut live = self.live.lock();
        let Some(list) = live.as_mut() else { return };
        if list.iter().any(|r| r.uri() == uri) {
            return;
        }
        let mut props = PropertyMap::new();
        props.insert("class".to_string(), Value::String(self.class.name.into()));
        props.insert(self.class.uri_prop().to_string(), Value::String(uri.into()));
        debug!(class = self.class.name, uri, "adding resource to live list");
        list.push(Resource::new(
            self.session.clone(),
            self.class,
            Arc::downgrade(self),
            uri.to_string(),
            props,
        ));
    }

    /// Drop a resource from the live list (inventory remove or local
    /// delete).
    pub(crate) fn live_remove(&self, uri: &str) {
        let mut live = self.live.lock();
        if let Some(list) = live.as_mut() {
            list.retain(|r| r.uri() != uri);
        }
    }
}

/// Generic manager of one resource class under one parent.
#[derive(Debug, Clone)]
pub struct Manager {
    pub(crate) inner: Arc<ManagerInner>,
}

impl Manager {
    pub(crate) fn new(
        session: Arc<Session>,
        class: &'static ResourceClass,
        parent_uri: Option<String>,
        list_uri: String,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                session,
                class,
                parent_uri,
                list_uri,
                live: Mutex::new(None),
                auto: AtomicBool::new(false),
            }),
        }
    }

    /// The class descriptor.
    pub fn class(&self) -> &'static ResourceClass {
        self.inner.class
    }

    /// The session this manager belongs to.
    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    /// Object URI of the parent resource; `None` for root managers.
    pub fn parent_uri(&self) -> Option<&str> {
        self.inner.parent_uri.as_deref()
    }

    /// Whether this manager maintains an auto-updated live list.
    pub fn auto_update_enabled(&self) -> bool {
        self.inner.auto.load(Ordering::SeqCst)
    }

    /// List resources, applying filter arguments.
    ///
    /// Server-side-filterable properties go to the list URI as query
    /// parameters; the rest are evaluated locally. Resources carry the
    /// minimum property set of the list operation unless
    /// `full_properties` is set. In auto-update mode the live list is
    /// returned without network I/O (and `full_properties` has no
    /// effect).
    pub async fn list(
        &self,
        filters: Option<&PropertyMap>,
        full_properties: bool,
    ) -> Result<Vec<Resource>> {
        if self.auto_update_enabled() {
            let snapshot = self.inner.live.lock().clone();
            if let Some(live) = snapshot {
                let mut out = Vec::with_capacity(live.len());
                for resource in live {
                    let keep = match filters {
                        Some(filters) => matches_filters(&resource.properties(), filters)?,
                        None => true,
                    };
                    if keep {
                        out.push(resource);
                    }
                }
                return Ok(out);
            }
        }
        self.list_remote(filters, full_properties).await
    }

    /// Like [`list`](Self::list) but never consults the live list.
    async fn list_remote(
        &self,
        filters: Option<&PropertyMap>,
        full_properties: bool,
    ) -> Result<Vec<Resource>> {
        let class = self.inner.class;
        if let Some(required) = class.list_requires_api_version {
            self.inner.session.require_api_version(required).await?;
        }
        if let Some(uris_prop) = class.uris_prop {
            return self.list_via_parent_uris(uris_prop, filters).await;
        }
        let empty = PropertyMap::new();
        let filters = filters.unwrap_or(&empty);
        let (server_filters, client_filters) =
            split_filters(filters, class.server_filter_props);
        let uri = if server_filters.is_empty() {
            self.inner.list_uri.clone()
        } else {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (name, value) in &server_filters {
                query.append_pair(name, value);
            }
            format!("{}?{}", self.inner.list_uri, query.finish())
        };

        let body = self.inner.session.get(&uri).await?;
        let items = body
            .get(class.list_key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let props = item.as_object().cloned().ok_or_else(|| {
                Error::Consistency(format!(
                    "list of {} returned a non-object array element",
                    class.name
                ))
            })?;
            let resource = self.resource_from_props(props)?;
            if matches_filters(&resource.properties(), &client_filters)? {
                out.push(resource);
            }
        }
        if full_properties {
            for resource in &out {
                resource.pull_full_properties().await?;
            }
        }
        Ok(out)
    }

    /// Listing path of element classes: fetch the parent, follow its
    /// element-URI list property, GET each element. Elements arrive with
    /// their full property set; all filters apply client-side.
    async fn list_via_parent_uris(
        &self,
        uris_prop: &str,
        filters: Option<&PropertyMap>,
    ) -> Result<Vec<Resource>> {
        let class = self.inner.class;
        let parent_uri = self.inner.parent_uri.as_deref().ok_or_else(|| {
            Error::Consistency(format!("element class {} has no parent", class.name))
        })?;
        let parent = self.inner.session.get(parent_uri).await?;
        let uris = parent
            .get(uris_prop)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let empty = PropertyMap::new();
        let filters = filters.unwrap_or(&empty);
        let mut out = Vec::with_capacity(uris.len());
        for uri in uris {
            let Some(uri) = uri.as_str() else {
                return Err(Error::Consistency(format!(
                    "{uris_prop} of {parent_uri} carries a non-string element"
                )));
            };
            let props = self
                .inner
                .session
                .get(uri)
                .await?
                .as_object()
                .cloned()
                .ok_or_else(|| {
                    Error::Consistency(format!("GET {uri} returned a non-object body"))
                })?;
            let resource = self.resource_from_props(props)?;
            resource.inner.mark_full();
            if matches_filters(&resource.properties(), filters)? {
                out.push(resource);
            }
        }
        Ok(out)
    }

    /// Find exactly one resource.
    ///
    /// Raises [`Error::NotFound`] on zero matches and
    /// [`Error::NoUniqueMatch`] (with all matching URIs) on several. When
    /// the only filter is the name property and the class is cacheable,
    /// the name-to-URI cache is consulted first.
    pub async fn find(&self, filters: &PropertyMap) -> Result<Resource> {
        let class = self.inner.class;
        if class.cacheable_names && filters.len() == 1 {
            if let Some(Value::String(name)) = filters.get(class.name_prop) {
                let normalized = class.normalize_name(name);
                if let Some(uri) = self.inner.session.cache().get(class.name, &normalized) {
                    return Ok(self.resource_from_uri(&uri, Some(name)));
                }
                let found = self.find_remote(filters).await?;
                self.inner
                    .session
                    .cache()
                    .insert(class.name, &normalized, found.uri());
                return Ok(found);
            }
        }
        self.find_remote(filters).await
    }

    async fn find_remote(&self, filters: &PropertyMap) -> Result<Resource> {
        let mut matches = self.list(Some(filters), false).await?;
        match matches.len() {
            0 => Err(Error::NotFound {
                class: self.inner.class.name.to_string(),
                filters: render_filters(filters),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(Error::NoUniqueMatch {
                class: self.inner.class.name.to_string(),
                filters: render_filters(filters),
                matching_uris: matches.iter().map(|r| r.uri().to_string()).collect(),
            }),
        }
    }

    /// Find by name; shorthand for [`find`](Self::find) with the name
    /// property as the only filter.
    pub async fn find_by_name(&self, name: &str) -> Result<Resource> {
        let mut filters = PropertyMap::new();
        filters.insert(
            self.inner.class.name_prop.to_string(),
            Value::String(name.to_string()),
        );
        self.find(&filters).await
    }

    /// List with filters, allowing any number of matches (including
    /// zero).
    pub async fn findall(&self, filters: Option<&PropertyMap>) -> Result<Vec<Resource>> {
        self.list(filters, false).await
    }

    /// Drop this class's name-to-URI cache entries.
    pub fn invalidate_cache(&self) {
        self.inner
            .session
            .cache()
            .invalidate_class(self.inner.class.name);
    }

    /// Maintain a live list reflecting inventory-change notifications;
    /// [`list`](Self::list) then answers without network I/O. Shares the
    /// session's single notification subscription.
    pub async fn enable_auto_update(&self) -> Result<()> {
        if self.auto_update_enabled() {
            return Ok(());
        }
        let updater = self.inner.session.auto_updater().await?;
        let initial = self.list_remote(None, false).await?;
        *self.inner.live.lock() = Some(initial);
        updater.register_manager(&self.inner);
        self.inner.auto.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Drop the live list and stop receiving auto-updates. Tears down the
    /// session's subscription when this was the last subscriber.
    pub async fn disable_auto_update(&self) {
        if !self.inner.auto.swap(false, Ordering::SeqCst) {
            return;
        }
        *self.inner.live.lock() = None;
        if let Some(updater) = self.inner.session.current_auto_updater().await {
            updater.deregister_manager(&self.inner);
            self.inner.session.auto_updater_maybe_teardown().await;
        }
    }

    /// Create a resource of this class via the given create URI.
    ///
    /// The name cache entry for the new name is invalidated (not
    /// populated): the next lookup observes the server's view.
    pub(crate) async fn create(
        &self,
        create_uri: &str,
        props: &PropertyMap,
    ) -> Result<Resource> {
        let class = self.inner.class;
        let body = Value::Object(props.clone());
        let result = self
            .inner
            .session
            .post(create_uri, Some(&body), &PostOptions::default())
            .await?;
        let value = result.into_value().ok_or_else(|| {
            Error::Consistency(format!("create of {} returned no body", class.name))
        })?;
        let uri = value
            .get(class.uri_prop())
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Consistency(format!(
                    "create of {} returned no {}",
                    class.name,
                    class.uri_prop()
                ))
            })?
            .to_string();

        let mut resource_props = props.clone();
        resource_props.insert(class.uri_prop().to_string(), Value::String(uri.clone()));
        if class.cacheable_names {
            if let Some(name) = props.get(class.name_prop).and_then(Value::as_str) {
                self.inner
                    .session
                    .cache()
                    .remove(class.name, &class.normalize_name(name));
            }
        }
        self.resource_from_props(resource_props)
    }

    /// Build a resource handle from listed/returned properties; requires
    /// the URI property.
    pub(crate) fn resource_from_props(&self, props: PropertyMap) -> Result<Resource> {
        let class = self.inner.class;
        let uri = props
            .get(class.uri_prop())
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::Consistency(format!(
                    "{} item carries no {} property",
                    class.name,
                    class.uri_prop()
                ))
            })?
            .to_string();
        Ok(Resource::new(
            self.inner.session.clone(),
            class,
            Arc::downgrade(&self.inner),
            uri,
            props,
        ))
    }

    /// Build a minimally populated resource handle from a cached URI.
    pub(crate) fn resource_from_uri(&self, uri: &str, name: Option<&str>) -> Resource {
        let class = self.inner.class;
        let mut props = PropertyMap::new();
        props.insert(class.uri_prop().to_string(), Value::String(uri.to_string()));
        if let Some(name) = name {
            props.insert(
                class.name_prop.to_string(),
                Value::String(name.to_string()),
            );
        }
        Resource::new(
            self.inner.session.clone(),
            class,
            Arc::downgrade(&self.inner),
            uri.to_string(),
            props,
        )
    }
}
