use async_trait::async_trait;
use marketwire_core::EntityId;
use marketwire_handlers::{
    Banner, CartStore, ConnectionChange, ConnectionStore, OrderStore, ProductStore, SearchStore,
    SearchTab, StoreError, SystemStore,
};
use tracing::info;

/// Feature stores that only log the refreshes they are asked for. The
/// command-line client uses these; a UI plugs in stores that call the API.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStores;

#[async_trait]
impl OrderStore for TracingStores {
    async fn refresh_orders(&self) -> Result<(), StoreError> {
        info!("refresh orders");
        Ok(())
    }

    async fn update_order_status(
        &self,
        order_id: &EntityId,
        status: &str,
    ) -> Result<(), StoreError> {
        info!(%order_id, status, "order status changed");
        Ok(())
    }
}

#[async_trait]
impl ProductStore for TracingStores {
    async fn refresh_product(&self, product_id: &EntityId) -> Result<(), StoreError> {
        info!(%product_id, "refresh product");
        Ok(())
    }

    async fn refresh_products(&self) -> Result<(), StoreError> {
        info!("refresh product list");
        Ok(())
    }

    async fn remove_product(&self, product_id: &EntityId) -> Result<(), StoreError> {
        info!(%product_id, "product removed");
        Ok(())
    }
}

#[async_trait]
impl CartStore for TracingStores {
    async fn refresh_cart(&self) -> Result<(), StoreError> {
        info!("refresh cart");
        Ok(())
    }

    async fn refresh_summary(&self) -> Result<(), StoreError> {
        info!("refresh cart summary");
        Ok(())
    }

    async fn clear_cart(&self) -> Result<(), StoreError> {
        info!("cart cleared");
        Ok(())
    }
}

#[async_trait]
impl SearchStore for TracingStores {
    async fn refresh_result(&self, tab: SearchTab, id: &EntityId) -> Result<(), StoreError> {
        info!(%tab, %id, "refresh search result");
        Ok(())
    }

    async fn refresh_results(&self, tab: SearchTab) -> Result<(), StoreError> {
        info!(%tab, "refresh search results");
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for TracingStores {
    async fn apply_change(
        &self,
        user_id: &EntityId,
        change: ConnectionChange,
    ) -> Result<(), StoreError> {
        info!(%user_id, ?change, "connection changed");
        Ok(())
    }

    async fn refresh_profile(&self, user_id: &EntityId) -> Result<(), StoreError> {
        info!(%user_id, "refresh profile");
        Ok(())
    }
}

#[async_trait]
impl SystemStore for TracingStores {
    async fn show_banner(&self, banner: Banner) -> Result<(), StoreError> {
        info!(level = ?banner.level, title = %banner.title, body = %banner.body, "system banner");
        Ok(())
    }
}
