use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use safevault_core::{NotificationId, Severity};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    FraudAlert,
    Error,
    System,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::FraudAlert => "FRAUD_ALERT",
            Category::Error => "ERROR",
            Category::System => "SYSTEM",
        })
    }
}

/// A message to publish. Severity defaults to `LOW`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub subject: String,
    pub body: String,
    pub category: Category,
    pub severity: Severity,
}

impl NewNotification {
    pub fn new(category: Category, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            category,
            severity: Severity::default(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub subject: String,
    pub body: String,
    pub category: Category,
    pub severity: Severity,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn from_new(id: NotificationId, new: NewNotification, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            subject: new.subject,
            body: new.body,
            category: new.category,
            severity: new.severity,
            read: false,
            created_at,
        }
    }
}
