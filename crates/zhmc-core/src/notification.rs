//! Notification model.
//!
//! The HMC publishes JMS notifications over STOMP. A raw [`Notification`]
//! is the (topic, headers, body) triple as received; [`HmcNotification`]
//! is the typed view the auto-update engine dispatches on. The mocked HMC
//! publishes the same shapes onto its in-memory topics.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::values::PropertyMap;

/// Well-known notification header names.
pub mod header {
    /// Discriminator header: `property-change`, `status-change`,
    /// `inventory-change`, `os-message`, `job-completion`.
    pub const NOTIFICATION_TYPE: &str = "notification-type";
    /// Object URI of the resource the notification refers to.
    pub const OBJECT_URI: &str = "object-uri";
    /// Resource class of the object.
    pub const CLASS: &str = "class";
    /// Inventory-change action: `add` or `remove`.
    pub const ACTION: &str = "action";
    /// Job URI on job-completion notifications.
    pub const JOB_URI: &str = "job-uri";
}

/// A notification as received from a topic: headers plus JSON body, in
/// arrival order.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Topic the notification arrived on.
    pub topic: String,
    /// Notification headers.
    pub headers: PropertyMap,
    /// Notification body; `Value::Null` when the frame had no body.
    pub body: Value,
}

impl Notification {
    /// A header value as `&str`, if present.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(Value::as_str)
    }
}

/// Direction of an inventory change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryAction {
    /// The resource came into existence.
    Add,
    /// The resource ceased to exist.
    Remove,
}

/// One changed property in a property-change or status-change
/// notification.
#[derive(Debug, Clone)]
pub struct PropertyChangeReport {
    /// Name of the changed property.
    pub name: String,
    /// New value of the property.
    pub new_value: Value,
}

/// Typed view of an HMC notification.
#[derive(Debug, Clone)]
pub enum HmcNotification {
    /// One or more non-status properties of an object changed.
    PropertyChange {
        /// Object URI of the changed resource.
        object_uri: String,
        /// Resource class of the changed resource.
        class: String,
        /// The changed properties.
        changes: Vec<PropertyChangeReport>,
    },
    /// One or more status-related properties of an object changed.
    StatusChange {
        /// Object URI of the changed resource.
        object_uri: String,
        /// Resource class of the changed resource.
        class: String,
        /// The changed properties.
        changes: Vec<PropertyChangeReport>,
    },
    /// An object came into existence or ceased to exist.
    InventoryChange {
        /// Object URI of the affected resource.
        object_uri: String,
        /// Resource class of the affected resource.
        class: String,
        /// Whether the resource was added or removed.
        action: InventoryAction,
    },
    /// Operating system console output of a partition or LPAR.
    OsMessage {
        /// Object URI of the partition/LPAR.
        object_uri: String,
        /// The message body as sent by the HMC.
        messages: Value,
    },
    /// An asynchronous job reached a terminal status.
    JobCompletion {
        /// URI of the completed job.
        job_uri: String,
        /// The notification body as sent by the HMC.
        status: Value,
    },
    /// A notification type this SDK version does not interpret.
    Other {
        /// The value of the `notification-type` header.
        kind: String,
    },
}

fn change_reports(body: &Value) -> Result<Vec<PropertyChangeReport>> {
    let reports = body
        .get("change-reports")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            Error::NotificationParse("missing or non-array 'change-reports' field".to_string())
        })?;
    reports
        .iter()
        .map(|report| {
            let name = report
                .get("property-name")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::NotificationParse("change report without 'property-name'".to_string())
                })?;
            Ok(PropertyChangeReport {
                name: name.to_string(),
                new_value: report.get("new-value").cloned().unwrap_or(Value::Null),
            })
        })
        .collect()
}

fn required_header<'a>(notification: &'a Notification, name: &str) -> Result<&'a str> {
    notification
        .header_str(name)
        .ok_or_else(|| Error::NotificationParse(format!("missing {name:?} header")))
}

impl TryFrom<&Notification> for HmcNotification {
    type Error = Error;

    fn try_from(notification: &Notification) -> Result<Self> {
        let kind = required_header(notification, header::NOTIFICATION_TYPE)?;
        match kind {
            "property-change" => Ok(HmcNotification::PropertyChange {
                object_uri: required_header(notification, header::OBJECT_URI)?.to_string(),
                class: required_header(notification, header::CLASS)?.to_string(),
                changes: change_reports(&notification.body)?,
            }),
            "status-change" => Ok(HmcNotification::StatusChange {
                object_uri: required_header(notification, header::OBJECT_URI)?.to_string(),
                class: required_header(notification, header::CLASS)?.to_string(),
                changes: change_reports(&notification.body)?,
            }),
            "inventory-change" => {
                let action = match required_header(notification, header::ACTION)? {
                    "add" => InventoryAction::Add,
                    "remove" => InventoryAction::Remove,
                    other => {
                        return Err(Error::NotificationParse(format!(
                            "unknown inventory-change action {other:?}"
                        )));
                    }
                };
                Ok(HmcNotification::InventoryChange {
                    object_uri: required_header(notification, header::OBJECT_URI)?.to_string(),
                    class: required_header(notification, header::CLASS)?.to_string(),
                    action,
                })
            }
            "os-message" => Ok(HmcNotification::OsMessage {
                object_uri: required_header(notification, header::OBJECT_URI)?.to_string(),
                messages: notification.body.clone(),
            }),
            "job-completion" => Ok(HmcNotification::JobCompletion {
                job_uri: required_header(notification, header::JOB_URI)?.to_string(),
                status: notification.body.clone(),
            }),
            other => Ok(HmcNotification::Other {
                kind: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn notification(headers: Value, body: Value) -> Notification {
        Notification {
            topic: "test-topic".to_string(),
            headers: headers.as_object().cloned().unwrap(),
            body,
        }
    }

    #[test]
    fn property_change_parses() {
        let n = notification(
            json!({
                "notification-type": "property-change",
                "object-uri": "/api/partitions/1",
                "class": "partition",
            }),
            json!({
                "change-reports": [
                    {"property-name": "description", "new-value": "bar"},
                ],
            }),
        );
        match HmcNotification::try_from(&n).unwrap() {
            HmcNotification::PropertyChange { changes, .. } => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].name, "description");
                assert_eq!(changes[0].new_value, json!("bar"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn inventory_change_parses_action() {
        let n = notification(
            json!({
                "notification-type": "inventory-change",
                "object-uri": "/api/partitions/1",
                "class": "partition",
                "action": "remove",
            }),
            Value::Null,
        );
        match HmcNotification::try_from(&n).unwrap() {
            HmcNotification::InventoryChange { action, .. } => {
                assert_eq!(action, InventoryAction::Remove);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_type_header_is_parse_error() {
        let n = notification(json!({}), Value::Null);
        assert!(matches!(
            HmcNotification::try_from(&n),
            Err(Error::NotificationParse(_))
        ));
    }

    #[test]
    fn unknown_type_is_other() {
        let n = notification(
            json!({"notification-type": "security-notification"}),
            Value::Null,
        );
        assert!(matches!(
            HmcNotification::try_from(&n).unwrap(),
            HmcNotification::Other { .. }
        ));
    }
}
