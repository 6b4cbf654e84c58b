use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Sms,
    Email,
    InApp,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationType::Sms => write!(f, "sms"),
            NotificationType::Email => write!(f, "email"),
            NotificationType::InApp => write!(f, "in_app"),
        }
    }
}

// Informational only: the consumer does not reorder deliveries by priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationPriority(pub i32);

impl NotificationPriority {
    pub const LOW: Self = Self(1);
    pub const NORMAL: Self = Self(5);
    pub const HIGH: Self = Self(10);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub priority: NotificationPriority,
    pub recipient_id: String,
    pub payload: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

fn default_max_retries() -> u32 {
    3
}

impl NotificationJob {
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    // The generic payload is re-encoded before parsing so the outer envelope
    // stays independent of any one channel's schema.
    pub fn sms_payload(&self) -> Result<SmsPayload, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(&self.payload)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsPayload {
    pub payload: SmsContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsContent {
    pub notification: SmsNotification,
    pub destinations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmsNotification {
    pub title: String,
    pub body: String,
}
