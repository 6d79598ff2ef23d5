use std::collections::{HashSet, VecDeque};
use std::sync::{
    Arc, Mutex, PoisonError, RwLock,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use marketwire_chat::ChatMessage;
use marketwire_core::config::NotificationsConfig;
use tracing::{debug, error};

use crate::NotificationError;
use crate::presenter::{Alert, Presenter};

const AGGREGATION_WINDOW: Duration = Duration::from_secs(2);
const AGGREGATION_THRESHOLD: usize = 3;
const PREVIEW_CHARS: usize = 120;

/// Which presentation channels the user enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertSettings {
    pub toast: bool,
    pub desktop: bool,
    pub sound: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            toast: true,
            desktop: true,
            sound: true,
        }
    }
}

impl From<&NotificationsConfig> for AlertSettings {
    fn from(config: &NotificationsConfig) -> Self {
        Self {
            toast: config.toast,
            desktop: config.desktop,
            sound: config.sound,
        }
    }
}

/// Channels that fired for one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertOutcome {
    pub toast: bool,
    pub desktop: bool,
    pub audio: bool,
}

impl AlertOutcome {
    pub fn is_silent(&self) -> bool {
        !(self.toast || self.desktop || self.audio)
    }
}

#[derive(Debug, Default)]
struct AggregationState {
    recent: VecDeque<Instant>,
}

impl AggregationState {
    fn record_and_count(&mut self, now: Instant) -> usize {
        self.recent.push_back(now);
        while let Some(oldest) = self.recent.front() {
            if now.duration_since(*oldest) > AGGREGATION_WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }
        self.recent.len()
    }
}

/// Decides whether an incoming chat message is surfaced to the user, and
/// through which channels.
pub struct AlertManager {
    settings: RwLock<AlertSettings>,
    current_user: RwLock<Option<String>>,
    active_chat: RwLock<Option<String>>,
    muted_chats: RwLock<HashSet<String>>,
    page_visible: AtomicBool,
    aggregation: Mutex<AggregationState>,
    presenter: Arc<dyn Presenter>,
}

impl AlertManager {
    pub fn new(presenter: Arc<dyn Presenter>, settings: AlertSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
            current_user: RwLock::new(None),
            active_chat: RwLock::new(None),
            muted_chats: RwLock::new(HashSet::new()),
            page_visible: AtomicBool::new(true),
            aggregation: Mutex::new(AggregationState::default()),
            presenter,
        }
    }

    pub fn set_settings(&self, settings: AlertSettings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    pub fn set_current_user(&self, user_id: Option<&str>) {
        *self
            .current_user
            .write()
            .unwrap_or_else(PoisonError::into_inner) = user_id.map(str::to_string);
    }

    pub fn current_user(&self) -> Option<String> {
        self.current_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The chat the user has open, if any.
    pub fn set_active_chat(&self, chat_id: Option<&str>) {
        *self
            .active_chat
            .write()
            .unwrap_or_else(PoisonError::into_inner) = chat_id.map(str::to_string);
    }

    pub fn set_chat_muted(&self, chat_id: &str, muted: bool) {
        let mut muted_chats = self
            .muted_chats
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if muted {
            muted_chats.insert(chat_id.to_string());
        } else {
            muted_chats.remove(chat_id);
        }
    }

    pub fn is_chat_muted(&self, chat_id: &str) -> bool {
        self.muted_chats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(chat_id)
    }

    pub fn set_page_visible(&self, visible: bool) {
        self.page_visible.store(visible, Ordering::Relaxed);
    }

    pub fn is_page_visible(&self) -> bool {
        self.page_visible.load(Ordering::Relaxed)
    }

    /// Surface a newly received chat message. Own messages, messages in the
    /// chat being viewed, and muted chats stay silent. A hidden page adds a
    /// desktop notification and an audio cue to the toast.
    pub fn on_chat_message(&self, message: &ChatMessage) -> AlertOutcome {
        if !self.should_alert(message) {
            return AlertOutcome::default();
        }

        let settings = *self.settings.read().unwrap_or_else(PoisonError::into_inner);
        let alert = Alert {
            title: "New message".to_string(),
            body: preview(&message.content),
            chat_id: Some(message.chat_id.clone()),
            message_id: Some(message.id.clone()),
        };

        let mut outcome = AlertOutcome::default();
        if settings.toast {
            outcome.toast = report("toast", self.presenter.toast(&alert));
        }

        if self.is_page_visible() {
            return outcome;
        }

        if settings.desktop {
            if self.presenter.desktop_permitted() {
                outcome.desktop = self.dispatch_desktop(alert);
            } else {
                debug!(error = %NotificationError::PermissionDenied, "desktop notification skipped");
            }
        }
        if settings.sound {
            outcome.audio = report("audio cue", self.presenter.audio_cue());
        }
        outcome
    }

    fn should_alert(&self, message: &ChatMessage) -> bool {
        let own = self
            .current_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(message.sender_id.as_str());
        if own {
            return false;
        }

        if self.is_chat_muted(&message.chat_id) {
            return false;
        }

        let viewing = self
            .active_chat
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_deref()
            == Some(message.chat_id.as_str());
        !(viewing && self.is_page_visible())
    }

    fn dispatch_desktop(&self, alert: Alert) -> bool {
        let count = self
            .aggregation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_and_count(Instant::now());

        let outgoing = if count > AGGREGATION_THRESHOLD {
            Alert::summary(count)
        } else {
            alert
        };

        report("desktop notification", self.presenter.desktop(&outgoing))
    }
}

fn report(channel: &str, result: Result<(), NotificationError>) -> bool {
    match result {
        Ok(()) => true,
        Err(error) => {
            error!(channel, error = %error, "failed to present alert");
            false
        }
    }
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let mut preview: String = content.chars().take(PREVIEW_CHARS).collect();
    preview.push('…');
    preview
}
