use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marketwire_core::{EntityId, Notification, NotificationType};
use tracing::{debug, error};

use crate::context::PageContext;
use crate::debounce::{CoalesceKey, Debouncer};
use crate::lifecycle::Feature;
use crate::stores::{SearchStore, StoreError};

const SEARCH_PATH: &str = "/search";

/// Result tabs of the search page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchTab {
    Products,
    Companies,
    Users,
}

impl SearchTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchTab::Products => "products",
            SearchTab::Companies => "companies",
            SearchTab::Users => "users",
        }
    }
}

impl std::fmt::Display for SearchTab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keeps visible search results in step with entity changes.
///
/// Only acts while the search page shows the tab for the affected entity
/// type. Bursts for one entity collapse into one refresh of that entity;
/// bulk product updates collapse into one refresh of the whole tab.
pub struct SearchFeature {
    store: Arc<dyn SearchStore>,
    page: Arc<dyn PageContext>,
    refresh: Debouncer<(SearchTab, CoalesceKey)>,
}

impl SearchFeature {
    pub fn new(
        store: Arc<dyn SearchStore>,
        page: Arc<dyn PageContext>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            page,
            refresh: Debouncer::new(debounce),
        }
    }

    fn target(notification: &Notification) -> Option<(SearchTab, CoalesceKey)> {
        let entity = |id: Option<&EntityId>| id.cloned().map(CoalesceKey::Entity);
        match notification.kind {
            NotificationType::ProductUpdated
            | NotificationType::ProductPriceChanged
            | NotificationType::ProductStockChanged
            | NotificationType::ProductDeleted => Some((
                SearchTab::Products,
                entity(notification.product_id.as_ref())?,
            )),
            NotificationType::ProductsUpdated => {
                Some((SearchTab::Products, CoalesceKey::AllProducts))
            }
            NotificationType::CompanyUpdated => Some((
                SearchTab::Companies,
                entity(notification.company_id.as_ref())?,
            )),
            NotificationType::UserFollow
            | NotificationType::UserUnfollow
            | NotificationType::ConnectionAccepted
            | NotificationType::ConnectionRemoved => {
                Some((SearchTab::Users, entity(notification.subject_user())?))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Feature for SearchFeature {
    fn name(&self) -> &'static str {
        "search"
    }

    fn kinds(&self) -> Vec<NotificationType> {
        vec![
            NotificationType::ProductUpdated,
            NotificationType::ProductPriceChanged,
            NotificationType::ProductStockChanged,
            NotificationType::ProductDeleted,
            NotificationType::ProductsUpdated,
            NotificationType::CompanyUpdated,
            NotificationType::UserFollow,
            NotificationType::UserUnfollow,
            NotificationType::ConnectionAccepted,
            NotificationType::ConnectionRemoved,
        ]
    }

    async fn react(&self, notification: &Notification) -> Result<(), StoreError> {
        let route = self.page.route();
        if !route.is_under(SEARCH_PATH) {
            return Ok(());
        }
        let Some((tab, key)) = Self::target(notification) else {
            debug!(kind = %notification.kind, "search event without a target");
            return Ok(());
        };
        if !route.tab_is(tab.as_str()) {
            debug!(%tab, active = ?route.tab, "search tab not active, event dropped");
            return Ok(());
        }

        let store = Arc::clone(&self.store);
        let action_key = key.clone();
        self.refresh.schedule((tab, key), move || async move {
            let result = match &action_key {
                CoalesceKey::Entity(id) => store.refresh_result(tab, id).await,
                CoalesceKey::AllProducts => store.refresh_results(tab).await,
            };
            if let Err(error) = result {
                error!(%tab, error = %error, "search refresh failed");
            }
        });
        Ok(())
    }

    fn pending(&self) -> usize {
        self.refresh.pending()
    }

    fn cancel_pending(&self) -> usize {
        self.refresh.cancel_all()
    }
}
