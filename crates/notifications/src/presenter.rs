#[cfg(feature = "desktop")]
use notify_rust::Notification as DesktopNotification;
use tracing::info;

use crate::NotificationError;

/// What a presenter is asked to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub body: String,
    pub chat_id: Option<String>,
    pub message_id: Option<String>,
}

impl Alert {
    pub(crate) fn summary(total: usize) -> Self {
        Self {
            title: "Marketwire".to_string(),
            body: format!("{total} new messages"),
            chat_id: None,
            message_id: None,
        }
    }
}

/// Fire-and-forget presentation services. Return values are only logged.
pub trait Presenter: Send + Sync {
    fn toast(&self, alert: &Alert) -> Result<(), NotificationError>;

    fn desktop(&self, alert: &Alert) -> Result<(), NotificationError>;

    fn audio_cue(&self) -> Result<(), NotificationError>;

    /// Whether the user granted desktop notification permission.
    fn desktop_permitted(&self) -> bool {
        true
    }
}

/// Presenter that only writes to the log. Used when no UI is attached.
#[derive(Debug, Default)]
pub struct TracingPresenter;

impl Presenter for TracingPresenter {
    fn toast(&self, alert: &Alert) -> Result<(), NotificationError> {
        info!(title = %alert.title, body = %alert.body, "toast");
        Ok(())
    }

    fn desktop(&self, alert: &Alert) -> Result<(), NotificationError> {
        info!(title = %alert.title, body = %alert.body, "desktop notification");
        Ok(())
    }

    fn audio_cue(&self) -> Result<(), NotificationError> {
        info!("audio cue");
        Ok(())
    }
}

/// Native desktop notifications. Toasts and audio cues go to the log.
#[cfg(feature = "desktop")]
#[derive(Debug, Default)]
pub struct DesktopPresenter;

#[cfg(feature = "desktop")]
impl Presenter for DesktopPresenter {
    fn toast(&self, alert: &Alert) -> Result<(), NotificationError> {
        TracingPresenter.toast(alert)
    }

    fn desktop(&self, alert: &Alert) -> Result<(), NotificationError> {
        let mut notification = DesktopNotification::new();
        notification.summary(&alert.title).body(&alert.body);

        #[cfg(all(unix, not(target_os = "macos")))]
        if alert.message_id.is_some() {
            notification.action("default", "Open");
        }

        notification
            .show()
            .map_err(|error| NotificationError::DispatchFailed(error.to_string()))?;
        Ok(())
    }

    fn audio_cue(&self) -> Result<(), NotificationError> {
        TracingPresenter.audio_cue()
    }
}
