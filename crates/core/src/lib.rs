pub mod bus;
pub mod config;
pub mod error;
pub mod notification;

pub use bus::{
    Handler, HandlerFuture, HandlerId, NotificationBus, NotificationHandler, Topic, handler_fn,
};
pub use error::{BusError, HandlerError};
pub use notification::{EntityId, Notification, NotificationType};
