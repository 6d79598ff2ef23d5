use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::store::ChatError;

/// A chat message as held by the chat store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(deserialize_with = "id_string")]
    pub id: String,

    #[serde(alias = "chatId", deserialize_with = "id_string")]
    pub chat_id: String,

    #[serde(alias = "senderId", deserialize_with = "id_string")]
    pub sender_id: String,

    #[serde(default, alias = "message")]
    pub content: String,

    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, alias = "editedAt")]
    pub edited_at: Option<DateTime<Utc>>,

    #[serde(default, alias = "isEdited")]
    pub is_edited: bool,

    #[serde(default, alias = "isPinned")]
    pub is_pinned: bool,

    #[serde(default)]
    pub likes: Vec<Like>,

    #[serde(default, alias = "likedByCurrentUser")]
    pub liked_by_current_user: bool,

    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    #[serde(alias = "userId", deserialize_with = "id_string")]
    pub user_id: String,
}

impl ChatMessage {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ChatError> {
        serde_json::from_value(value).map_err(|error| ChatError::InvalidPayload(error.to_string()))
    }

    /// Recompute `liked_by_current_user` from the like list.
    pub fn recompute_liked(&mut self, current_user: Option<&str>) {
        self.liked_by_current_user = current_user
            .is_some_and(|user| self.likes.iter().any(|like| like.user_id == user));
    }

    /// Merge the fields present in `patch` into this message.
    pub fn apply(&mut self, patch: &MessagePatch) {
        if let Some(content) = &patch.content {
            self.content.clone_from(content);
        }
        if let Some(edited_at) = patch.edited_at {
            self.edited_at = Some(edited_at);
        }
        if let Some(is_edited) = patch.is_edited {
            self.is_edited = is_edited;
        }
        if let Some(is_pinned) = patch.is_pinned {
            self.is_pinned = is_pinned;
        }
        if let Some(likes) = &patch.likes {
            self.likes.clone_from(likes);
        }
        if let Some(liked) = patch.liked_by_current_user {
            self.liked_by_current_user = liked;
        }
        if let Some(attachments) = &patch.attachments {
            self.attachments.clone_from(attachments);
        }
    }
}

/// Partial update for a stored message. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, alias = "editedAt", skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,

    #[serde(default, alias = "isEdited", skip_serializing_if = "Option::is_none")]
    pub is_edited: Option<bool>,

    #[serde(default, alias = "isPinned", skip_serializing_if = "Option::is_none")]
    pub is_pinned: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<Vec<Like>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liked_by_current_user: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<serde_json::Value>>,
}

impl MessagePatch {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ChatError> {
        serde_json::from_value(value).map_err(|error| ChatError::InvalidPayload(error.to_string()))
    }

    /// The patch that turns an existing record into `message`.
    pub fn replacing_with(message: &ChatMessage) -> Self {
        Self {
            content: Some(message.content.clone()),
            edited_at: message.edited_at,
            is_edited: Some(message.is_edited),
            is_pinned: Some(message.is_pinned),
            likes: Some(message.likes.clone()),
            liked_by_current_user: Some(message.liked_by_current_user),
            attachments: Some(message.attachments.clone()),
        }
    }
}

/// A conversation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    #[serde(deserialize_with = "id_string")]
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, alias = "participantIds")]
    pub participant_ids: Vec<serde_json::Value>,

    #[serde(default, alias = "unreadCount")]
    pub unread_count: u32,

    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Chat {
    pub fn from_value(value: serde_json::Value) -> Result<Self, ChatError> {
        serde_json::from_value(value).map_err(|error| ChatError::InvalidPayload(error.to_string()))
    }
}

/// Accept both `"42"` and `42` for identifiers.
pub fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
