//! Name-to-URI cache.
//!
//! One cache per session, sectioned by resource class. Entries expire
//! after the configured TTL and are dropped eagerly on create, rename,
//! delete, and inventory-change notifications.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::trace;

#[derive(Debug, Clone)]
struct CacheEntry {
    uri: String,
    expires_at: Instant,
}

/// TTL-bounded mapping of (class, normalized name) to object URI.
#[derive(Debug)]
pub(crate) struct NameUriCache {
    ttl: Duration,
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
}

impl NameUriCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a name; expired entries are removed, not returned.
    pub(crate) fn get(&self, class: &str, name: &str) -> Option<String> {
        let key = (class.to_string(), name.to_string());
        {
            let entries = self.entries.read();
            let entry = entries.get(&key)?;
            if entry.expires_at > Instant::now() {
                trace!(class, name, uri = %entry.uri, "name cache hit");
                return Some(entry.uri.clone());
            }
        }
        self.entries.write().remove(&key);
        trace!(class, name, "name cache entry expired");
        None
    }

    pub(crate) fn insert(&self, class: &str, name: &str, uri: &str) {
        let entry = CacheEntry {
            uri: uri.to_string(),
            expires_at: Instant::now() + self.ttl,
        };
        self.entries
            .write()
            .insert((class.to_string(), name.to_string()), entry);
    }

    pub(crate) fn remove(&self, class: &str, name: &str) {
        self.entries
            .write()
            .remove(&(class.to_string(), name.to_string()));
    }

    /// Drop every entry of the class that maps to the given URI.
    pub(crate) fn remove_uri(&self, class: &str, uri: &str) {
        self.entries
            .write()
            .retain(|(c, _), entry| c != class || entry.uri != uri);
    }

    /// Drop every entry of the class.
    pub(crate) fn invalidate_class(&self, class: &str) {
        self.entries.write().retain(|(c, _), _| c != class);
    }

    /// Drop everything.
    pub(crate) fn clear(&self) {
        self.entries.write().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_within_ttl() {
        let cache = NameUriCache::new(Duration::from_secs(300));
        cache.insert("partition", "p1", "/api/partitions/1");
        assert_eq!(
            cache.get("partition", "p1"),
            Some("/api/partitions/1".to_string())
        );
        assert_eq!(cache.get("partition", "p2"), None);
        assert_eq!(cache.get("adapter", "p1"), None);
    }

    #[test]
    fn zero_ttl_expires_immediately() {
        let cache = NameUriCache::new(Duration::ZERO);
        cache.insert("partition", "p1", "/api/partitions/1");
        assert_eq!(cache.get("partition", "p1"), None);
        // The expired entry was removed on lookup.
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn remove_by_uri_spares_other_classes() {
        let cache = NameUriCache::new(Duration::from_secs(300));
        cache.insert("partition", "p1", "/api/partitions/1");
        cache.insert("partition", "alias", "/api/partitions/1");
        cache.insert("adapter", "a1", "/api/partitions/1");
        cache.remove_uri("partition", "/api/partitions/1");
        assert_eq!(cache.get("partition", "p1"), None);
        assert_eq!(cache.get("partition", "alias"), None);
        assert!(cache.get("adapter", "a1").is_some());
    }

    #[test]
    fn invalidate_class_and_clear() {
        let cache = NameUriCache::new(Duration::from_secs(300));
        cache.insert("partition", "p1", "/api/partitions/1");
        cache.insert("adapter", "a1", "/api/adapters/1");
        cache.invalidate_class("partition");
        assert_eq!(cache.get("partition", "p1"), None);
        assert!(cache.get("adapter", "a1").is_some());
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
