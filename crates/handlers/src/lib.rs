//! Feature handlers reacting to backend notifications.
//!
//! Each feature subscribes a fixed set of notification kinds on the
//! [`NotificationBus`](marketwire_core::NotificationBus), drops events that
//! are not relevant to the current page, and coalesces bursts into a single
//! store call through a keyed [`Debouncer`].

pub mod cart;
pub mod connection;
pub mod context;
pub mod debounce;
pub mod lifecycle;
pub mod order;
pub mod product;
pub mod search;
pub mod stores;
pub mod system;

pub use cart::{CartFeature, CartRefresh};
pub use connection::{ConnectionChange, ConnectionFeature};
pub use context::{PageContext, Route, SharedPageContext};
pub use debounce::{CoalesceKey, Debouncer};
pub use lifecycle::{Feature, FeatureHandler, FeatureRegistration};
pub use order::OrderFeature;
pub use product::ProductFeature;
pub use search::{SearchFeature, SearchTab};
pub use stores::{
    Banner, BannerLevel, CartStore, ConnectionStore, OrderStore, ProductStore, SearchStore,
    StoreError, SystemStore,
};
pub use system::SystemFeature;
