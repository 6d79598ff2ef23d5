use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marketwire_core::{EntityId, Notification, NotificationType};
use tracing::{debug, error};

use crate::context::{PageContext, Route};
use crate::debounce::{CoalesceKey, Debouncer};
use crate::lifecycle::Feature;
use crate::stores::{ProductStore, StoreError};

const PRODUCTS_PATH: &str = "/products";

/// Refreshes the product list and product detail pages.
pub struct ProductFeature {
    store: Arc<dyn ProductStore>,
    page: Arc<dyn PageContext>,
    refresh: Debouncer<CoalesceKey>,
}

impl ProductFeature {
    pub fn new(
        store: Arc<dyn ProductStore>,
        page: Arc<dyn PageContext>,
        debounce: Duration,
    ) -> Self {
        Self {
            store,
            page,
            refresh: Debouncer::new(debounce),
        }
    }

    fn schedule(&self, key: CoalesceKey) {
        let store = Arc::clone(&self.store);
        let action_key = key.clone();
        self.refresh.schedule(key, move || async move {
            let result = match &action_key {
                CoalesceKey::Entity(id) => store.refresh_product(id).await,
                CoalesceKey::AllProducts => store.refresh_products().await,
            };
            if let Err(error) = result {
                error!(key = ?action_key, error = %error, "product refresh failed");
            }
        });
    }

    /// Pick the refresh a change to `ids` needs on `route`, if any.
    fn refresh_key<'a>(
        route: &Route,
        mut ids: impl Iterator<Item = &'a EntityId>,
    ) -> Option<CoalesceKey> {
        if route.is_exactly(PRODUCTS_PATH) {
            return Some(CoalesceKey::AllProducts);
        }
        ids.find(|id| route.shows_entity(PRODUCTS_PATH, id))
            .map(|id| CoalesceKey::Entity(id.clone()))
    }
}

#[async_trait]
impl Feature for ProductFeature {
    fn name(&self) -> &'static str {
        "products"
    }

    fn kinds(&self) -> Vec<NotificationType> {
        vec![
            NotificationType::ProductCreated,
            NotificationType::ProductUpdated,
            NotificationType::ProductDeleted,
            NotificationType::ProductPriceChanged,
            NotificationType::ProductStockChanged,
            NotificationType::ProductsUpdated,
        ]
    }

    async fn react(&self, notification: &Notification) -> Result<(), StoreError> {
        let route = self.page.route();
        if !route.is_under(PRODUCTS_PATH) {
            debug!(kind = %notification.kind, "products not on screen, event dropped");
            return Ok(());
        }

        let key = match &notification.kind {
            NotificationType::ProductDeleted => {
                let Some(id) = &notification.product_id else {
                    return Ok(());
                };
                self.refresh.cancel(&CoalesceKey::Entity(id.clone()));
                return self.store.remove_product(id).await;
            }
            NotificationType::ProductCreated => {
                route.is_exactly(PRODUCTS_PATH).then_some(CoalesceKey::AllProducts)
            }
            NotificationType::ProductsUpdated => {
                Self::refresh_key(&route, notification.affected_product_ids.iter())
            }
            _ => Self::refresh_key(&route, notification.product_id.iter()),
        };

        match key {
            Some(key) => self.schedule(key),
            None => debug!(kind = %notification.kind, path = %route.path, "product event not relevant"),
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
