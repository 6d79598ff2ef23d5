//! Notification domain for marketwire.
//!
//! Holds the notification list and unread counter that inbound wire events
//! update, and decides when a chat message should surface as a toast, a
//! desktop notification, or an audio cue.

pub mod alert;
pub mod presenter;
pub mod store;

pub use alert::{AlertManager, AlertOutcome, AlertSettings};
pub use presenter::{Alert, Presenter, TracingPresenter};
pub use store::{InMemoryNotificationStore, NotificationStore};

#[cfg(feature = "desktop")]
pub use presenter::DesktopPresenter;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("notification permission denied")]
    PermissionDenied,
}
