//! Notification storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use safevault_core::{ErrorKind, NotificationId, Severity};

use crate::notification::{Category, NewNotification, Notification};

/// Notification store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification not found: {0}")]
    NotFound(NotificationId),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl NotificationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            NotificationError::NotFound(_) => ErrorKind::NotFound,
            NotificationError::Invalid(_) => ErrorKind::Validation,
            NotificationError::Storage(_) => ErrorKind::Internal,
        }
    }
}

/// Inbox filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub category: Option<Category>,
    pub read: Option<bool>,
    pub severity: Option<Severity>,
}

impl NotificationFilter {
    pub fn unread() -> Self {
        Self {
            read: Some(false),
            ..Self::default()
        }
    }

    pub fn category(category: Category) -> Self {
        Self {
            category: Some(category),
            ..Self::default()
        }
    }

    pub fn matches(&self, n: &Notification) -> bool {
        self.category.is_none_or(|c| n.category == c)
            && self.read.is_none_or(|r| n.read == r)
            && self.severity.is_none_or(|s| n.severity == s)
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

impl PageRequest {
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn new(page: u32, per_page: u32) -> Result<Self, NotificationError> {
        if page == 0 {
            return Err(NotificationError::Invalid("page is 1-based".to_string()));
        }
        if per_page == 0 || per_page > Self::MAX_PER_PAGE {
            return Err(NotificationError::Invalid(format!(
                "per_page must be in 1..={}",
                Self::MAX_PER_PAGE
            )));
        }
        Ok(Self { page, per_page })
    }

    fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize).saturating_mul(self.per_page as usize)
    }
}

/// One page of notifications, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    /// Matches for the filter across all pages.
    pub total: usize,
    /// Unread notifications in the whole inbox (ignores the filter).
    pub unread: usize,
    pub page: u32,
    pub per_page: u32,
}

/// Notification store abstraction.
pub trait NotificationStore: Send + Sync {
    fn publish(
        &self,
        new: NewNotification,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotificationError>;

    fn get(&self, id: NotificationId) -> Result<Notification, NotificationError>;

    fn list(
        &self,
        filter: &NotificationFilter,
        page: PageRequest,
    ) -> Result<NotificationPage, NotificationError>;

    fn mark_read(&self, id: NotificationId) -> Result<Notification, NotificationError>;

    /// Returns how many notifications changed.
    fn mark_all_read(&self) -> Result<usize, NotificationError>;

    fn delete(&self, id: NotificationId) -> Result<(), NotificationError>;
}

impl<N> NotificationStore for Arc<N>
where
    N: NotificationStore + ?Sized,
{
    fn publish(
        &self,
        new: NewNotification,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotificationError> {
        (**self).publish(new, now)
    }

    fn get(&self, id: NotificationId) -> Result<Notification, NotificationError> {
        (**self).get(id)
    }

    fn list(
        &self,
        filter: &NotificationFilter,
        page: PageRequest,
    ) -> Result<NotificationPage, NotificationError> {
        (**self).list(filter, page)
    }

    fn mark_read(&self, id: NotificationId) -> Result<Notification, NotificationError> {
        (**self).mark_read(id)
    }

    fn mark_all_read(&self) -> Result<usize, NotificationError> {
        (**self).mark_all_read()
    }

    fn delete(&self, id: NotificationId) -> Result<(), NotificationError> {
        (**self).delete(id)
    }
}

fn poisoned() -> NotificationError {
    NotificationError::Storage("lock poisoned".to_string())
}

/// In-memory notification store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    items: RwLock<HashMap<NotificationId, Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn publish(
        &self,
        new: NewNotification,
        now: DateTime<Utc>,
    ) -> Result<Notification, NotificationError> {
        if new.subject.trim().is_empty() {
            return Err(NotificationError::Invalid("subject is required".to_string()));
        }
        let notification = Notification::from_new(NotificationId::new(), new, now);
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(notification.id, notification.clone());

        tracing::debug!(
            notification_id = %notification.id,
            category = %notification.category,
            severity = %notification.severity,
            "notification published"
        );
        Ok(notification)
    }

    fn get(&self, id: NotificationId) -> Result<Notification, NotificationError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        items.get(&id).cloned().ok_or(NotificationError::NotFound(id))
    }

    fn list(
        &self,
        filter: &NotificationFilter,
        page: PageRequest,
    ) -> Result<NotificationPage, NotificationError> {
        let items = self.items.read().map_err(|_| poisoned())?;

        let mut matching: Vec<&Notification> = items.values().filter(|n| filter.matches(n)).collect();
        // Newest first; ids are time-ordered so they break same-instant ties.
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_uuid().cmp(a.id.as_uuid()))
        });

        let total = matching.len();
        let unread = items.values().filter(|n| !n.read).count();
        let items = matching
            .into_iter()
            .skip(page.offset())
            .take(page.per_page as usize)
            .cloned()
            .collect();

        Ok(NotificationPage {
            items,
            total,
            unread,
            page: page.page,
            per_page: page.per_page,
        })
    }

    fn mark_read(&self, id: NotificationId) -> Result<Notification, NotificationError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let n = items.get_mut(&id).ok_or(NotificationError::NotFound(id))?;
        n.read = true;
        Ok(n.clone())
    }

    fn mark_all_read(&self) -> Result<usize, NotificationError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let mut changed = 0;
        for n in items.values_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        Ok(changed)
    }

    fn delete(&self, id: NotificationId) -> Result<(), NotificationError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items
            .remove(&id)
            .map(|_| ())
            .ok_or(NotificationError::NotFound(id))
    }
}
