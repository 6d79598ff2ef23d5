use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marketwire_core::{EntityId, Notification, NotificationType};
use tracing::{debug, error};

use crate::context::PageContext;
use crate::debounce::Debouncer;
use crate::lifecycle::Feature;
use crate::stores::{ConnectionStore, StoreError};

const NETWORK_PATHS: [&str; 2] = ["/network", "/connections"];
const PROFILE_PATH: &str = "/users";

/// Change to the relationship between the current user and another user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    Followed,
    Unfollowed,
    Requested,
    Accepted,
    Removed,
}

impl ConnectionChange {
    pub fn from_kind(kind: &NotificationType) -> Option<Self> {
        Some(match kind {
            NotificationType::UserFollow => ConnectionChange::Followed,
            NotificationType::UserUnfollow => ConnectionChange::Unfollowed,
            NotificationType::ConnectionRequest => ConnectionChange::Requested,
            NotificationType::ConnectionAccepted => ConnectionChange::Accepted,
            NotificationType::ConnectionRemoved => ConnectionChange::Removed,
            _ => return None,
        })
    }
}

/// Updates the network pages and the profile of the user a follow or
/// connection event is about. Bursts are coalesced per user, and the last
/// change of a burst wins.
pub struct ConnectionFeature {
    store: Arc<dyn ConnectionStore>,
    page: Arc<dyn PageContext>,
    refresh: Debouncer<EntityId>,
}

impl ConnectionFeature {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        page: Arc<dyn PageContext>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            page,
            refresh: Debouncer::new(debounce),
        }
    }
}

#[async_trait]
impl Feature for ConnectionFeature {
    fn name(&self) -> &'static str {
        "connections"
    }

    fn kinds(&self) -> Vec<NotificationType> {
        vec![
            NotificationType::UserFollow,
            NotificationType::UserUnfollow,
            NotificationType::ConnectionRequest,
            NotificationType::ConnectionAccepted,
            NotificationType::ConnectionRemoved,
        ]
    }

    async fn react(&self, notification: &Notification) -> Result<(), StoreError> {
        let (Some(change), Some(user_id)) = (
            ConnectionChange::from_kind(&notification.kind),
            notification.subject_user().cloned(),
        ) else {
            debug!(kind = %notification.kind, "connection event without a user");
            return Ok(());
        };

        let route = self.page.route();
        let store = Arc::clone(&self.store);
        let target = user_id.clone();

        if NETWORK_PATHS.iter().any(|path| route.is_under(path)) {
            self.refresh.schedule(user_id, move || async move {
                if let Err(error) = store.apply_change(&target, change).await {
                    error!(user_id = %target, ?change, error = %error, "connection update failed");
                }
            });
        } else if route.shows_entity(PROFILE_PATH, &user_id) {
            self.refresh.schedule(user_id, move || async move {
                if let Err(error) = store.refresh_profile(&target).await {
                    error!(user_id = %target, error = %error, "profile refresh failed");
                }
            });
        } else {
            debug!(user_id = %user_id, path = %route.path, "connection event not relevant");
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        self.refresh.pending()
    }

    fn cancel_pending(&self) -> usize {
        self.refresh.cancel_all()
    }
}
