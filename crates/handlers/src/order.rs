use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use marketwire_core::{Notification, NotificationType};
use tracing::{debug, error};

use crate::context::PageContext;
use crate::debounce::Debouncer;
use crate::lifecycle::Feature;
use crate::stores::{OrderStore, StoreError};

const ORDERS_PATH: &str = "/orders";

/// Keeps the orders list current while it is on screen.
///
/// Status changes that carry the new status are applied directly; every
/// other order event schedules one debounced list refresh.
pub struct OrderFeature {
    store: Arc<dyn OrderStore>,
    page: Arc<dyn PageContext>,
    refresh: Debouncer<()>,
}

impl OrderFeature {
    pub fn new(store: Arc<dyn OrderStore>, page: Arc<dyn PageContext>, debounce: Duration) -> Self {
        Self {
            store,
            page,
            refresh: Debouncer::new(debounce),
        }
    }

    fn schedule_refresh(&self) {
        let store = Arc::clone(&self.store);
        self.refresh.schedule((), move || async move {
            if let Err(error) = store.refresh_orders().await {
                error!(error = %error, "order refresh failed");
            }
        });
    }
}

#[async_trait]
impl Feature for OrderFeature {
    fn name(&self) -> &'static str {
        "orders"
    }

    fn kinds(&self) -> Vec<NotificationType> {
        vec![
            NotificationType::OrderReceived,
            NotificationType::OrderUpdated,
            NotificationType::OrderStatusChanged,
            NotificationType::OrderCancelled,
            NotificationType::OrderShipped,
        ]
    }

    async fn react(&self, notification: &Notification) -> Result<(), StoreError> {
        if !self.page.route().is_under(ORDERS_PATH) {
            debug!(kind = %notification.kind, "orders not on screen, event dropped");
            return Ok(());
        }

        if notification.kind == NotificationType::OrderStatusChanged
            && let Some(order_id) = &notification.order_id
            && let Some(status) = notification.metadata_str("status")
        {
            return self.store.update_order_status(order_id, status).await;
        }

        self.schedule_refresh();
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
    use crate::stores::MockOrderStore;
    use marketwire_core::{EntityId, NotificationBus};
    use serde_json::json;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn setup(
        store: MockOrderStore,
        path: &str,
    ) -> (Arc<NotificationBus>, FeatureRegistration<OrderFeature>) {
        let bus = Arc::new(NotificationBus::new());
        let page = Arc::new(SharedPageContext::new(Route::new(path)));
        let feature = OrderFeature::new(Arc::new(store), page, DEBOUNCE);
        let registration = FeatureRegistration::new(Arc::clone(&bus), feature);
        registration.register();
        (bus, registration)
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn burst_of_order_events_refreshes_once() {
        let mut store = MockOrderStore::new();
        store.expect_refresh_orders().times(1).returning(|| Ok(()));
        let (bus, registration) = setup(store, "/orders");

        for id in 1..=4_i64 {
            bus.emit(Notification::new(NotificationType::OrderReceived).with_order(id))
                .await;
        }
        assert_eq!(registration.pending(), 1);

        tokio::time::sleep(DEBOUNCE * 2).await;
        tokio::task::yield_now().await;
        assert_eq!(registration.pending(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn status_change_with_status_updates_directly() {
        let mut store = MockOrderStore::new();
        store
            .expect_update_order_status()
            .withf(|order_id: &EntityId, status: &str| {
                *order_id == EntityId::from(1183_i64) && status == "shipped"
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let (bus, registration) = setup(store, "/orders/1183");

        bus.emit(
            Notification::new(NotificationType::OrderStatusChanged)
                .with_order(1183_i64)
                .with_metadata(json!({ "status": "shipped" })),
        )
        .await;

        assert_eq!(registration.pending(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn events_off_the_orders_page_are_dropped() {
        let (bus, registration) = setup(MockOrderStore::new(), "/products");

        bus.emit(Notification::new(NotificationType::OrderReceived).with_order(1_i64))
            .await;
        bus.emit(
            Notification::new(NotificationType::OrderStatusChanged)
                .with_order(1_i64)
                .with_metadata(json!({ "status": "paid" })),
        )
        .await;

        assert_eq!(registration.pending(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn unregister_cancels_pending_refresh() {
        let (bus, registration) = setup(MockOrderStore::new(), "/orders");

        bus.emit(Notification::new(NotificationType::OrderUpdated)).await;
        assert_eq!(registration.pending(), 1);

        assert!(registration.unregister());
        assert_eq!(registration.pending(), 0);

        tokio::time::sleep(DEBOUNCE * 2).await;
    }
}
