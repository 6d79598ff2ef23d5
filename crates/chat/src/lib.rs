pub mod model;
pub mod store;

pub use model::{Chat, ChatMessage, Like, MessagePatch};
pub use store::{ChatError, ChatStore, InMemoryChatStore};
