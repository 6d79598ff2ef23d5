use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use marketwire_chat::{ChatStore, MessagePatch};
use marketwire_core::{Notification, NotificationBus};
use marketwire_notifications::{AlertManager, NotificationStore};
use tracing::{debug, warn};

use crate::wire::InboundEvent;

/// Receives decoded inbound events in socket order.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn route(&self, event: InboundEvent);
}

/// Applies chat events to the chat store and notification events to the
/// notification store. New notifications are then published on the bus,
/// which is the only path from the socket to feature handlers.
pub struct EventRouter {
    chats: Arc<dyn ChatStore>,
    notifications: Arc<dyn NotificationStore>,
    alerts: Arc<AlertManager>,
    bus: Arc<NotificationBus>,
    current_user: RwLock<Option<String>>,
}

impl EventRouter {
    pub fn new(
        chats: Arc<dyn ChatStore>,
        notifications: Arc<dyn NotificationStore>,
        alerts: Arc<AlertManager>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        Self {
            chats,
            notifications,
            alerts,
            bus,
            current_user: RwLock::new(None),
        }
    }

    pub fn set_current_user(&self, user_id: Option<&str>) {
        *self
            .current_user
            .write()
            .unwrap_or_else(PoisonError::into_inner) = user_id.map(str::to_string);
        self.alerts.set_current_user(user_id);
    }

    fn current_user(&self) -> Option<String> {
        self.current_user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn route_chat(&self, event: InboundEvent) {
        match event {
            InboundEvent::ChatMessageNew(mut message) => {
                message.recompute_liked(self.current_user().as_deref());
                if self.chats.message(&message.id).is_some() {
                    debug!(message_id = %message.id, "message already known, updating in place");
                    self.chats
                        .update_message_by_id(&message.id, &MessagePatch::replacing_with(&message));
                    return;
                }
                self.alerts.on_chat_message(&message);
                self.chats.add_message(message);
            }
            InboundEvent::ChatMessageEdited(edit) => {
                if !self.chats.update_message_by_id(&edit.message_id, &edit.patch) {
                    debug!(message_id = %edit.message_id, "edit for unknown message ignored");
                }
            }
            InboundEvent::ChatMessageDeleted(target) => {
                self.chats.remove_message(&target.chat_id, &target.message_id);
            }
            InboundEvent::ChatMessageLiked(update) => {
                let current_user = self.current_user();
                let liked = current_user
                    .as_deref()
                    .is_some_and(|user| update.likes.iter().any(|like| like.user_id == user));
                let patch = MessagePatch {
                    likes: Some(update.likes),
                    liked_by_current_user: Some(liked),
                    ..MessagePatch::default()
                };
                if !self.chats.update_message_by_id(&update.message_id, &patch) {
                    debug!(message_id = %update.message_id, "like for unknown message ignored");
                }
            }
            InboundEvent::ChatMessagePinned(pin) => {
                let patch = MessagePatch {
                    is_pinned: Some(pin.is_pinned),
                    ..MessagePatch::default()
                };
                self.chats.update_message_by_id(&pin.message_id, &patch);
            }
            InboundEvent::ChatTyping(update) => {
                if update.typing {
                    self.chats.add_typing_user(&update.chat_id, &update.user_id);
                } else {
                    self.chats
                        .remove_typing_user(&update.chat_id, &update.user_id);
                }
            }
            InboundEvent::ChatRead(receipt) => {
                let at = receipt.read_at.unwrap_or_else(Utc::now);
                self.chats.mark_read(&receipt.chat_id, &receipt.user_id, at);
            }
            InboundEvent::ChatUserOnline(presence) => {
                self.chats.set_user_online(&presence.user_id, presence.online);
            }
            InboundEvent::ChatCreated(chat) | InboundEvent::ChatUpdated(chat) => {
                self.chats.upsert_chat(chat);
            }
            other => debug!(event = other.name(), "not a chat event"),
        }
    }

    async fn publish(&self, data: serde_json::Value) {
        let notification = match Notification::from_value(data) {
            Ok(notification) => notification,
            Err(error) => {
                warn!(error = %error, "dropping malformed notification");
                return;
            }
        };

        // Redelivered ids are already listed and were already published.
        if self.notifications.add_notification(notification.clone()) {
            self.bus.emit(notification).await;
        }
    }
}

#[async_trait]
impl EventSink for EventRouter {
    async fn route(&self, event: InboundEvent) {
        debug!(event = event.name(), "routing inbound event");
        match event {
            InboundEvent::NotificationNew(data) => self.publish(data).await,
            InboundEvent::NotificationUnreadCount(unread) => {
                self.notifications.update_unread_count(unread.count);
            }
            InboundEvent::NotificationRead(target) => {
                self.notifications.mark_read(&target.id);
            }
            InboundEvent::NotificationsAllRead => self.notifications.mark_all_read(),
            InboundEvent::Unknown(name) => debug!(event = %name, "ignoring unknown event"),
            event if event.is_lifecycle() => {
                debug!(event = event.name(), "lifecycle event reached router")
            }
            chat => self.route_chat(chat),
        }
    }
}
