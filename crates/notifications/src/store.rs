use std::collections::VecDeque;
use std::sync::{PoisonError, RwLock};

use marketwire_core::{EntityId, Notification};
use tracing::debug;

const DEFAULT_CAPACITY: usize = 200;

/// Notification domain operations driven by inbound wire events.
pub trait NotificationStore: Send + Sync {
    /// Prepend a notification. Returns `false` when its id is already listed.
    fn add_notification(&self, notification: Notification) -> bool;

    /// Overwrite the unread counter with the server's value.
    fn update_unread_count(&self, count: u32);

    /// Returns `false` when no listed notification has this id.
    fn mark_read(&self, id: &EntityId) -> bool;

    fn mark_all_read(&self);
}

#[derive(Default)]
struct NotificationList {
    items: VecDeque<Notification>,
    unread: u32,
}

/// Bounded, newest-first notification list.
pub struct InMemoryNotificationStore {
    list: RwLock<NotificationList>,
    capacity: usize,
}

impl Default for InMemoryNotificationStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            list: RwLock::new(NotificationList::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.list
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .iter()
            .cloned()
            .collect()
    }

    pub fn unread_count(&self) -> u32 {
        self.list
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .unread
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn add_notification(&self, notification: Notification) -> bool {
        let mut list = self.list.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(id) = &notification.id
            && list.items.iter().any(|item| item.id.as_ref() == Some(id))
        {
            debug!(id = %id, "duplicate notification ignored");
            return false;
        }

        if !notification.read {
            list.unread = list.unread.saturating_add(1);
        }
        list.items.push_front(notification);
        list.items.truncate(self.capacity);
        true
    }

    fn update_unread_count(&self, count: u32) {
        self.list
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unread = count;
    }

    fn mark_read(&self, id: &EntityId) -> bool {
        let mut list = self.list.write().unwrap_or_else(PoisonError::into_inner);
        let Some(item) = list.items.iter_mut().find(|item| item.id.as_ref() == Some(id)) else {
            return false;
        };

        if !item.read {
            item.read = true;
            list.unread = list.unread.saturating_sub(1);
        }
        true
    }

    fn mark_all_read(&self) {
        let mut list = self.list.write().unwrap_or_else(PoisonError::into_inner);
        for item in list.items.iter_mut() {
            item.read = true;
        }
        list.unread = 0;
    }
}
