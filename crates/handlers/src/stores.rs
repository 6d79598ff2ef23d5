//! Contracts of the per-feature stores refreshed by the handlers. The stores
//! themselves live outside this crate and usually wrap REST calls.

use async_trait::async_trait;
use marketwire_core::EntityId;
use thiserror::Error;

use crate::connection::ConnectionChange;
use crate::search::SearchTab;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("store is not available")]
    Unavailable,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn refresh_orders(&self) -> Result<(), StoreError>;

    async fn update_order_status(&self, order_id: &EntityId, status: &str)
    -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn refresh_product(&self, product_id: &EntityId) -> Result<(), StoreError>;

    async fn refresh_products(&self) -> Result<(), StoreError>;

    async fn remove_product(&self, product_id: &EntityId) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Reload every line of the cart.
    async fn refresh_cart(&self) -> Result<(), StoreError>;

    /// Reload the item count and totals shown outside the cart page.
    async fn refresh_summary(&self) -> Result<(), StoreError>;

    async fn clear_cart(&self) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchStore: Send + Sync {
    async fn refresh_result(&self, tab: SearchTab, id: &EntityId) -> Result<(), StoreError>;

    async fn refresh_results(&self, tab: SearchTab) -> Result<(), StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn apply_change(
        &self,
        user_id: &EntityId,
        change: ConnectionChange,
    ) -> Result<(), StoreError>;

    async fn refresh_profile(&self, user_id: &EntityId) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerLevel {
    Info,
    Warning,
}

/// A site-wide message shown above every page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub level: BannerLevel,
    pub title: String,
    pub body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SystemStore: Send + Sync {
    async fn show_banner(&self, banner: Banner) -> Result<(), StoreError>;
}
