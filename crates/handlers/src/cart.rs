use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marketwire_core::{Notification, NotificationType};
use tracing::error;

use crate::context::PageContext;
use crate::debounce::Debouncer;
use crate::lifecycle::Feature;
use crate::stores::{CartStore, StoreError};

/// Which part of the cart a burst of changes should reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CartRefresh {
    /// The cart or checkout page is open: reload every line.
    Full,
    /// Anywhere else only the header badge needs the new totals.
    Summary,
}

pub struct CartFeature {
    store: Arc<dyn CartStore>,
    page: Arc<dyn PageContext>,
    refresh: Debouncer<CartRefresh>,
}

impl CartFeature {
    pub fn new(store: Arc<dyn CartStore>, page: Arc<dyn PageContext>, debounce: Duration) -> Self {
        Self {
            store,
            page,
            refresh: Debouncer::new(debounce),
        }
    }

    fn refresh_for_current_page(&self) -> CartRefresh {
        let route = self.page.route();
        if route.is_under("/cart") || route.is_under("/checkout") {
            CartRefresh::Full
        } else {
            CartRefresh::Summary
        }
    }
}

#[async_trait]
impl Feature for CartFeature {
    fn name(&self) -> &'static str {
        "cart"
    }

    fn kinds(&self) -> Vec<NotificationType> {
        vec![
            NotificationType::CartChanged,
            NotificationType::CartItemAdded,
            NotificationType::CartItemRemoved,
            NotificationType::CartCleared,
        ]
    }

    async fn react(&self, notification: &Notification) -> Result<(), StoreError> {
        if notification.kind == NotificationType::CartCleared {
            self.refresh.cancel_all();
            return self.store.clear_cart().await;
        }

        let refresh = self.refresh_for_current_page();
        let store = Arc::clone(&self.store);
        self.refresh.schedule(refresh, move || async move {
            let result = match refresh {
                CartRefresh::Full => store.refresh_cart().await,
                CartRefresh::Summary => store.refresh_summary().await,
            };
            if let Err(error) = result {
                error!(?refresh, error = %error, "cart refresh failed");
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Route, SharedPageContext};
    use crate::lifecycle::{FeatureHandler, FeatureRegistration};
    use crate::stores::MockCartStore;
    use marketwire_core::NotificationBus;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn setup(
        store: MockCartStore,
        path: &str,
    ) -> (Arc<NotificationBus>, FeatureRegistration<CartFeature>) {
        let bus = Arc::new(NotificationBus::new());
        let page = Arc::new(SharedPageContext::new(Route::new(path)));
        let registration = FeatureRegistration::new(
            Arc::clone(&bus),
            CartFeature::new(Arc::new(store), page, DEBOUNCE),
        );
        registration.register();
        (bus, registration)
    }

    async fn settle() {
        tokio::time::sleep(DEBOUNCE * 2).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn cart_page_reloads_full_cart_once() {
        let mut store = MockCartStore::new();
        store.expect_refresh_cart().times(1).returning(|| Ok(()));
        let (bus, registration) = setup(store, "/checkout/shipping");

        bus.emit(Notification::new(NotificationType::CartItemAdded)).await;
        bus.emit(Notification::new(NotificationType::CartItemRemoved)).await;
        bus.emit(Notification::new(NotificationType::CartChanged)).await;
        assert_eq!(registration.pending(), 1);

        settle().await;
        assert_eq!(registration.pending(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn other_pages_reload_only_the_summary() {
        let mut store = MockCartStore::new();
        store.expect_refresh_summary().times(1).returning(|| Ok(()));
        let (bus, _registration) = setup(store, "/products/3");

        bus.emit(Notification::new(NotificationType::CartItemAdded)).await;
        bus.emit(Notification::new(NotificationType::CartItemAdded)).await;

        settle().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn clear_is_applied_directly() {
        let mut store = MockCartStore::new();
        store.expect_clear_cart().times(1).returning(|| Ok(()));
        let (bus, registration) = setup(store, "/cart");

        bus.emit(Notification::new(NotificationType::CartChanged)).await;
        bus.emit(Notification::new(NotificationType::CartCleared)).await;
        assert_eq!(registration.pending(), 0);

        settle().await;
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn failed_refresh_does_not_block_the_next_one() {
        let mut store = MockCartStore::new();
        store
            .expect_refresh_summary()
            .times(2)
            .returning(|| Err(StoreError::Request("503".to_string())));
        let (bus, registration) = setup(store, "/");

        bus.emit(Notification::new(NotificationType::CartChanged)).await;
        settle().await;
        bus.emit(Notification::new(NotificationType::CartChanged)).await;
        assert_eq!(registration.pending(), 1);
        settle().await;

        assert_eq!(registration.pending(), 0);
    }
}
