//! Resource property values.
//!
//! HMC resources carry an open-ended property set that varies by HMC and
//! API version, so properties are kept as a map from property name to a
//! JSON value rather than as static fields. [`PropertyMapExt`] adds the
//! typed accessors used for well-known properties.

use serde_json::Value;

/// Property map of a resource: property name to JSON value.
///
/// Insertion order is preserved, so listings and YAML dumps are stable.
pub type PropertyMap = serde_json::Map<String, Value>;

/// Typed accessors over a [`PropertyMap`].
pub trait PropertyMapExt {
    /// The property as `&str`, if present and a string.
    fn get_str(&self, name: &str) -> Option<&str>;

    /// The property as `bool`, if present and a boolean.
    fn get_bool(&self, name: &str) -> Option<bool>;

    /// The property as `i64`, if present and an integer.
    fn get_i64(&self, name: &str) -> Option<i64>;
}

impl PropertyMapExt for PropertyMap {
    fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }
}

/// Convert a JSON object value into a [`PropertyMap`], returning `None`
/// for non-object values.
pub fn as_property_map(value: &Value) -> Option<PropertyMap> {
    value.as_object().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn typed_accessors() {
        let props = as_property_map(&json!({
            "name": "CPC1",
            "dpm-enabled": true,
            "processor-count": 8,
        }))
        .unwrap();
        assert_eq!(props.get_str("name"), Some("CPC1"));
        assert_eq!(props.get_bool("dpm-enabled"), Some(true));
        assert_eq!(props.get_i64("processor-count"), Some(8));
        assert_eq!(props.get_str("dpm-enabled"), None);
        assert_eq!(props.get_i64("missing"), None);
    }
}
