//! Notification sink: durable inbox of system messages.
//!
//! Written by the fraud scan and by job failure handlers; read, marked and
//! deleted by the external inbox.

pub mod notification;
pub mod store;

pub use notification::{Category, NewNotification, Notification};
pub use store::{
    InMemoryNotificationStore, NotificationError, NotificationFilter, NotificationPage,
    NotificationStore, PageRequest,
};
