//! JSON framing for the socket: every text message is
//! `{"event": "<name>", "data": <payload>}`.

use chrono::{DateTime, Utc};
use marketwire_chat::model::id_string;
use marketwire_chat::{Chat, ChatMessage, Like, MessagePatch};
use marketwire_core::EntityId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::WireError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn decode(text: &str) -> Result<Self, WireError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageEdit {
    #[serde(alias = "id", alias = "messageId", deserialize_with = "id_string")]
    pub message_id: String,
    #[serde(flatten)]
    pub patch: MessagePatch,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageRef {
    #[serde(alias = "chatId", deserialize_with = "id_string")]
    pub chat_id: String,
    #[serde(alias = "id", alias = "messageId", deserialize_with = "id_string")]
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageLikes {
    #[serde(alias = "id", alias = "messageId", deserialize_with = "id_string")]
    pub message_id: String,
    #[serde(default)]
    pub likes: Vec<Like>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessagePin {
    #[serde(alias = "id", alias = "messageId", deserialize_with = "id_string")]
    pub message_id: String,
    #[serde(default = "default_true", alias = "isPinned", alias = "pinned")]
    pub is_pinned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypingUpdate {
    #[serde(alias = "chatId", deserialize_with = "id_string")]
    pub chat_id: String,
    #[serde(alias = "userId", deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(default = "default_true", alias = "isTyping")]
    pub typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReadReceipt {
    #[serde(alias = "chatId", deserialize_with = "id_string")]
    pub chat_id: String,
    #[serde(alias = "userId", deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(default, alias = "readAt")]
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PresenceUpdate {
    #[serde(alias = "userId", deserialize_with = "id_string")]
    pub user_id: String,
    #[serde(default = "default_true", alias = "isOnline")]
    pub online: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UnreadCount {
    #[serde(alias = "unreadCount", alias = "unread_count")]
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotificationRef {
    #[serde(alias = "notificationId", alias = "notification_id")]
    pub id: EntityId,
}

/// Every event name the server may send, with its payload decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Connect,
    Disconnect { reason: Option<String> },
    ConnectError { message: String },
    Reconnect,
    ChatMessageNew(ChatMessage),
    ChatMessageEdited(MessageEdit),
    ChatMessageDeleted(MessageRef),
    ChatMessageLiked(MessageLikes),
    ChatMessagePinned(MessagePin),
    ChatTyping(TypingUpdate),
    ChatRead(ReadReceipt),
    ChatUserOnline(PresenceUpdate),
    ChatCreated(Chat),
    ChatUpdated(Chat),
    /// Kept raw; the notification bus validates it.
    NotificationNew(Value),
    NotificationUnreadCount(UnreadCount),
    NotificationRead(NotificationRef),
    NotificationsAllRead,
    Unknown(String),
}

impl InboundEvent {
    pub fn decode(text: &str) -> Result<Self, WireError> {
        Self::from_frame(WireFrame::decode(text)?)
    }

    pub fn from_frame(frame: WireFrame) -> Result<Self, WireError> {
        let WireFrame { event, data } = frame;
        let parsed = match event.as_str() {
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect {
                reason: text_of(&data),
            },
            "connect_error" => Self::ConnectError {
                message: text_of(&data).unwrap_or_else(|| data.to_string()),
            },
            "reconnect" => Self::Reconnect,
            "chatMessageNew" => Self::ChatMessageNew(payload(&event, data)?),
            "chatMessageEdited" => Self::ChatMessageEdited(payload(&event, data)?),
            "chatMessageDeleted" => Self::ChatMessageDeleted(payload(&event, data)?),
            "chatMessageLiked" => Self::ChatMessageLiked(payload(&event, data)?),
            "chatMessagePinned" => Self::ChatMessagePinned(payload(&event, data)?),
            "chat:typing" => Self::ChatTyping(payload(&event, data)?),
            "chat:read" => Self::ChatRead(payload(&event, data)?),
            "chat:userOnline" => Self::ChatUserOnline(payload(&event, data)?),
            "chatCreated" => Self::ChatCreated(payload(&event, data)?),
            "chatUpdated" => Self::ChatUpdated(payload(&event, data)?),
            "notificationNew" => Self::NotificationNew(data),
            "notificationUnreadCount" => Self::NotificationUnreadCount(unread_count(&event, data)?),
            "notificationRead" => Self::NotificationRead(payload(&event, data)?),
            "notificationsAllRead" => Self::NotificationsAllRead,
            _ => Self::Unknown(event),
        };
        Ok(parsed)
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::ConnectError { .. } => "connect_error",
            Self::Reconnect => "reconnect",
            Self::ChatMessageNew(_) => "chatMessageNew",
            Self::ChatMessageEdited(_) => "chatMessageEdited",
            Self::ChatMessageDeleted(_) => "chatMessageDeleted",
            Self::ChatMessageLiked(_) => "chatMessageLiked",
            Self::ChatMessagePinned(_) => "chatMessagePinned",
            Self::ChatTyping(_) => "chat:typing",
            Self::ChatRead(_) => "chat:read",
            Self::ChatUserOnline(_) => "chat:userOnline",
            Self::ChatCreated(_) => "chatCreated",
            Self::ChatUpdated(_) => "chatUpdated",
            Self::NotificationNew(_) => "notificationNew",
            Self::NotificationUnreadCount(_) => "notificationUnreadCount",
            Self::NotificationRead(_) => "notificationRead",
            Self::NotificationsAllRead => "notificationsAllRead",
            Self::Unknown(name) => name,
        }
    }

    /// Transport lifecycle events are handled by the connection manager
    /// itself rather than routed to a domain store.
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Connect | Self::Disconnect { .. } | Self::ConnectError { .. } | Self::Reconnect
        )
    }
}

fn payload<T: DeserializeOwned>(event: &str, data: Value) -> Result<T, WireError> {
    serde_json::from_value(data).map_err(|error| WireError::InvalidPayload {
        event: event.to_string(),
        message: error.to_string(),
    })
}

/// The server sends either a bare number or `{"count": n}`.
fn unread_count(event: &str, data: Value) -> Result<UnreadCount, WireError> {
    match data.as_u64() {
        Some(count) => Ok(UnreadCount {
            count: u32::try_from(count).unwrap_or(u32::MAX),
        }),
        None => payload(event, data),
    }
}

fn text_of(data: &Value) -> Option<String> {
    match data {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("reason"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Events the client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    Typing { chat_id: String, typing: bool },
    ChatRead { chat_id: String },
    ChatJoin { chat_id: String },
    ChatLeave { chat_id: String },
    NotificationRead { id: EntityId },
    NotificationsReadAll,
}

impl OutboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Typing { .. } => "chat:typing",
            Self::ChatRead { .. } => "chat:read",
            Self::ChatJoin { .. } => "chat:join",
            Self::ChatLeave { .. } => "chat:leave",
            Self::NotificationRead { .. } => "notification:read",
            Self::NotificationsReadAll => "notifications:readAll",
        }
    }

    pub fn to_frame(&self) -> WireFrame {
        let data = match self {
            Self::Typing { chat_id, typing } => json!({ "chat_id": chat_id, "typing": typing }),
            Self::ChatRead { chat_id } | Self::ChatJoin { chat_id } | Self::ChatLeave { chat_id } => {
                json!({ "chat_id": chat_id })
            }
            Self::NotificationRead { id } => json!({ "id": id }),
            Self::NotificationsReadAll => Value::Null,
        };
        WireFrame::new(self.name(), data)
    }

    pub fn encode(&self) -> Result<String, WireError> {
        self.to_frame().encode()
    }
}
