use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::{Chat, ChatMessage, MessagePatch};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid chat payload: {0}")]
    InvalidPayload(String),
}

/// Chat domain operations the connection layer applies inbound events to.
/// The connection layer does not own chat data; it only calls these.
pub trait ChatStore: Send + Sync {
    /// Append a message. Returns `false` when a message with the same id is
    /// already stored.
    fn add_message(&self, message: ChatMessage) -> bool;

    fn message(&self, message_id: &str) -> Option<ChatMessage>;

    /// Merge `patch` into the stored message. Returns `false` when unknown.
    fn update_message_by_id(&self, message_id: &str, patch: &MessagePatch) -> bool;

    fn remove_message(&self, chat_id: &str, message_id: &str) -> bool;

    fn add_typing_user(&self, chat_id: &str, user_id: &str);

    fn remove_typing_user(&self, chat_id: &str, user_id: &str);

    fn mark_read(&self, chat_id: &str, user_id: &str, at: DateTime<Utc>);

    fn set_user_online(&self, user_id: &str, online: bool);

    fn upsert_chat(&self, chat: Chat);
}

#[derive(Default)]
struct ChatState {
    messages: HashMap<String, Vec<ChatMessage>>,
    message_chats: HashMap<String, String>,
    typing: HashMap<String, BTreeSet<String>>,
    reads: HashMap<String, HashMap<String, DateTime<Utc>>>,
    online: HashSet<String>,
    chats: HashMap<String, Chat>,
}

impl ChatState {
    fn message_mut(&mut self, message_id: &str) -> Option<&mut ChatMessage> {
        let chat_id = self.message_chats.get(message_id)?;
        self.messages
            .get_mut(chat_id)?
            .iter_mut()
            .find(|message| message.id == message_id)
    }
}

/// Process-local chat store.
#[derive(Default)]
pub struct InMemoryChatStore {
    state: RwLock<ChatState>,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self, chat_id: &str) -> Vec<ChatMessage> {
        self.read()
            .messages
            .get(chat_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn typing_users(&self, chat_id: &str) -> Vec<String> {
        self.read()
            .typing
            .get(chat_id)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn last_read(&self, chat_id: &str, user_id: &str) -> Option<DateTime<Utc>> {
        self.read()
            .reads
            .get(chat_id)
            .and_then(|reads| reads.get(user_id))
            .copied()
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.read().online.contains(user_id)
    }

    pub fn chat(&self, chat_id: &str) -> Option<Chat> {
        self.read().chats.get(chat_id).cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ChatState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ChatState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChatStore for InMemoryChatStore {
    fn add_message(&self, message: ChatMessage) -> bool {
        let mut state = self.write();
        if state.message_chats.contains_key(&message.id) {
            debug!(message_id = %message.id, "duplicate chat message ignored");
            return false;
        }

        state
            .message_chats
            .insert(message.id.clone(), message.chat_id.clone());
        state
            .messages
            .entry(message.chat_id.clone())
            .or_default()
            .push(message);
        true
    }

    fn message(&self, message_id: &str) -> Option<ChatMessage> {
        let state = self.read();
        let chat_id = state.message_chats.get(message_id)?;
        state
            .messages
            .get(chat_id)?
            .iter()
            .find(|message| message.id == message_id)
            .cloned()
    }

    fn update_message_by_id(&self, message_id: &str, patch: &MessagePatch) -> bool {
        let mut state = self.write();
        match state.message_mut(message_id) {
            Some(message) => {
                message.apply(patch);
                true
            }
            None => false,
        }
    }

    fn remove_message(&self, chat_id: &str, message_id: &str) -> bool {
        let mut state = self.write();
        let Some(messages) = state.messages.get_mut(chat_id) else {
            return false;
        };

        let before = messages.len();
        messages.retain(|message| message.id != message_id);
        let removed = messages.len() != before;
        if removed {
            state.message_chats.remove(message_id);
        }
        removed
    }

    fn add_typing_user(&self, chat_id: &str, user_id: &str) {
        self.write()
            .typing
            .entry(chat_id.to_string())
            .or_default()
            .insert(user_id.to_string());
    }

    fn remove_typing_user(&self, chat_id: &str, user_id: &str) {
        let mut state = self.write();
        if let Some(users) = state.typing.get_mut(chat_id) {
            users.remove(user_id);
            if users.is_empty() {
                state.typing.remove(chat_id);
            }
        }
    }

    fn mark_read(&self, chat_id: &str, user_id: &str, at: DateTime<Utc>) {
        self.write()
            .reads
            .entry(chat_id.to_string())
            .or_default()
            .insert(user_id.to_string(), at);
    }

    fn set_user_online(&self, user_id: &str, online: bool) {
        let mut state = self.write();
        if online {
            state.online.insert(user_id.to_string());
        } else {
            state.online.remove(user_id);
        }
    }

    fn upsert_chat(&self, chat: Chat) {
        self.write().chats.insert(chat.id.clone(), chat);
    }
}
