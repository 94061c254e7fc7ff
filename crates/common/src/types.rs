use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label key under which the notifier injects the recipient identity before
/// handing a message to a dispatcher.
pub const LABEL_RECIPIENT: &str = "recipient";

/// Label key under which the notifier injects the message title.
pub const LABEL_TITLE: &str = "title";

/// Label key under which the notifier injects the template identifier.
pub const LABEL_NOTIFICATION_TYPE: &str = "notification_type";

/// Delivery method a message is dispatched through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationMethod {
    Smtp,
    Webhook,
}

impl std::fmt::Display for NotificationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationMethod::Smtp => write!(f, "smtp"),
            NotificationMethod::Webhook => write!(f, "webhook"),
        }
    }
}

impl std::str::FromStr for NotificationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smtp" => Ok(NotificationMethod::Smtp),
            "webhook" => Ok(NotificationMethod::Webhook),
            other => Err(format!("unknown notification method: {other}")),
        }
    }
}

/// Delivery state of a message.
///
/// Transitions are forward-only: `Pending → Leased → {Sent, TempFailed,
/// PermFailed}`; `TempFailed` re-enters the lease pool; `Sent` and
/// `PermFailed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Leased,
    Sent,
    TempFailed,
    PermFailed,
}

impl MessageStatus {
    /// Terminal statuses are immutable.
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageStatus::Sent | MessageStatus::PermFailed)
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Leased => write!(f, "leased"),
            MessageStatus::Sent => write!(f, "sent"),
            MessageStatus::TempFailed => write!(f, "temp_failed"),
            MessageStatus::PermFailed => write!(f, "perm_failed"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "leased" => Ok(MessageStatus::Leased),
            "sent" => Ok(MessageStatus::Sent),
            "temp_failed" => Ok(MessageStatus::TempFailed),
            "perm_failed" => Ok(MessageStatus::PermFailed),
            other => Err(format!("unknown message status: {other}")),
        }
    }
}

/// Ordered key-value payload carried by a message and handed to dispatchers.
///
/// Keys are unique; iteration order is the keys' sort order. Labels are
/// cloned into each dispatch call and never mutated after enqueue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Labels(BTreeMap<String, String>);

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key`, or the empty string when absent.
    pub fn get(&self, key: &str) -> &str {
        self.0.get(key).map(String::as_str).unwrap_or("")
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Subset of `keys` that are absent, in the order given.
    pub fn missing(&self, keys: &[&str]) -> Vec<String> {
        keys.iter()
            .filter(|k| !self.0.contains_key(**k))
            .map(|k| k.to_string())
            .collect()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Labels {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Parameters accepted by `Manager::enqueue`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Recipient identity (e-mail address for SMTP, opaque ID for webhooks)
    pub recipient: String,
    /// Template identifier naming the kind of event
    pub template: String,
    /// Delivery method
    pub method: NotificationMethod,
    /// Arbitrary key-value context for the dispatcher
    pub labels: Labels,
    /// Free-text title
    pub title: String,
}

/// A persisted notification message, the unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub recipient: String,
    pub template: String,
    pub method: NotificationMethod,
    pub labels: Labels,
    pub title: String,
    pub status: MessageStatus,
    /// Number of completed delivery attempts; only ever increases.
    pub attempt_count: i32,
    /// Owner token of the active lease, if any.
    pub leased_by: Option<String>,
    /// Expiry of the active lease; an expired lease makes the message
    /// claimable again by any worker.
    pub leased_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Dispatcher input: the enqueued labels plus the reserved keys derived
    /// from the message itself. Reserved keys overwrite caller labels.
    pub fn dispatch_input(&self) -> Labels {
        let mut input = self.labels.clone();
        input.insert(LABEL_RECIPIENT, self.recipient.clone());
        input.insert(LABEL_TITLE, self.title.clone());
        input.insert(LABEL_NOTIFICATION_TYPE, self.template.clone());
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_get_absent_is_empty() {
        let labels: Labels = [("a", "b")].into_iter().collect();
        assert_eq!(labels.get("a"), "b");
        assert_eq!(labels.get("nope"), "");
    }

    #[test]
    fn test_labels_missing() {
        let labels: Labels = [("a", "b"), ("c", "d")].into_iter().collect();
        assert!(labels.missing(&["a", "c"]).is_empty());
        assert_eq!(labels.missing(&["a", "x", "y"]), vec!["x", "y"]);
    }

    #[test]
    fn test_labels_serde_transparent() {
        let labels: Labels = [("a", "b")].into_iter().collect();
        let json = serde_json::to_string(&labels).unwrap();
        assert_eq!(json, r#"{"a":"b"}"#);
        let back: Labels = serde_json::from_str(&json).unwrap();
        assert_eq!(back, labels);
    }

    #[test]
    fn test_method_roundtrip() {
        for m in [NotificationMethod::Smtp, NotificationMethod::Webhook] {
            assert_eq!(m.to_string().parse::<NotificationMethod>().unwrap(), m);
        }
    }

    #[test]
    fn test_method_usable_as_map_key() {
        let mut by_method = std::collections::HashMap::new();
        by_method.insert(NotificationMethod::Smtp, "smtp");
        by_method.insert(NotificationMethod::Webhook, "webhook");
        assert_eq!(by_method.get(&NotificationMethod::Smtp), Some(&"smtp"));
        assert_eq!(by_method.len(), 2);
    }

    #[test]
    fn test_status_roundtrip_and_terminal() {
        for s in [
            MessageStatus::Pending,
            MessageStatus::Leased,
            MessageStatus::Sent,
            MessageStatus::TempFailed,
            MessageStatus::PermFailed,
        ] {
            assert_eq!(s.to_string().parse::<MessageStatus>().unwrap(), s);
        }
        assert!(MessageStatus::Sent.is_terminal());
        assert!(MessageStatus::PermFailed.is_terminal());
        assert!(!MessageStatus::TempFailed.is_terminal());
    }
}
