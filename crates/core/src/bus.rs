use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tracing::{debug, error, info, warn};

use crate::error::HandlerError;
use crate::notification::{Notification, NotificationType};

pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Reacts to notifications delivered by a [`NotificationBus`].
///
/// Implemented for any `Fn(Arc<Notification>) -> impl Future<Output =
/// Result<(), HandlerError>>` closure.
pub trait NotificationHandler: Send + Sync + 'static {
    fn handle(&self, notification: Arc<Notification>) -> HandlerFuture;
}

impl<F, Fut> NotificationHandler for F
where
    F: Fn(Arc<Notification>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, notification: Arc<Notification>) -> HandlerFuture {
        Box::pin(self(notification))
    }
}

pub type Handler = Arc<dyn NotificationHandler>;

/// Wrap an async closure as a shareable [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Arc<Notification>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(f)
}

/// Registration key: one notification kind, or every kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    All,
    Kind(NotificationType),
}

impl From<NotificationType> for Topic {
    fn from(kind: NotificationType) -> Self {
        Topic::Kind(kind)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Topic::All => f.write_str("all"),
            Topic::Kind(kind) => write!(f, "{kind}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    handler: Handler,
}

/// In-process publish/subscribe registry for backend notifications.
///
/// `emit` delivers to the handlers registered for the notification's kind
/// followed by the handlers registered for [`Topic::All`]. A handler
/// registered under both is invoked twice. Handler failures and panics are
/// logged and never reach the caller of `emit`.
pub struct NotificationBus {
    topics: RwLock<HashMap<Topic, Vec<Registration>>>,
    next_id: AtomicU64,
    initialized: AtomicBool,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            initialized: AtomicBool::new(false),
        }
    }

    /// Mark the bus ready for use. Returns `true` only for the call that
    /// performed the initialization.
    pub fn initialize(&self) -> bool {
        let first = self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if first {
            info!("notification bus initialized");
        } else {
            debug!("notification bus already initialized");
        }
        first
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Drop every registration and return to the uninitialized state.
    pub fn reset(&self) {
        self.topics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.initialized.store(false, Ordering::Release);
        info!("notification bus reset");
    }

    /// Register `handler` under `topic`. Registering the same `Arc` twice
    /// under the same topic keeps a single entry and returns its id.
    pub fn register(&self, topic: impl Into<Topic>, handler: Handler) -> HandlerId {
        let topic = topic.into();
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let registrations = topics.entry(topic.clone()).or_default();

        if let Some(existing) = registrations
            .iter()
            .find(|registration| Arc::ptr_eq(&registration.handler, &handler))
        {
            debug!(%topic, "handler already registered");
            return existing.id;
        }

        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        registrations.push(Registration { id, handler });
        debug!(%topic, handlers = registrations.len(), "handler registered");
        id
    }

    /// Remove `handler` from `topic`. Returns whether anything was removed.
    pub fn unregister(&self, topic: &Topic, handler: &Handler) -> bool {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        let Some(registrations) = topics.get_mut(topic) else {
            return false;
        };

        let before = registrations.len();
        registrations.retain(|registration| !Arc::ptr_eq(&registration.handler, handler));
        let removed = registrations.len() != before;

        if registrations.is_empty() {
            topics.remove(topic);
        }
        if removed {
            debug!(%topic, "handler unregistered");
        }
        removed
    }

    /// Remove every handler for `topic`, or for all topics when `None`.
    pub fn clear(&self, topic: Option<&Topic>) {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        match topic {
            Some(topic) => {
                topics.remove(topic);
            }
            None => topics.clear(),
        }
    }

    pub fn handler_count(&self, topic: Option<&Topic>) -> usize {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        match topic {
            Some(topic) => topics.get(topic).map_or(0, Vec::len),
            None => topics.values().map(Vec::len).sum(),
        }
    }

    /// Deliver `notification` to every matching handler and wait until all
    /// of them have settled.
    pub async fn emit(&self, notification: Notification) {
        let handlers = self.snapshot(&notification.kind);
        if handlers.is_empty() {
            debug!(kind = %notification.kind, "no handlers for notification");
            return;
        }

        debug!(kind = %notification.kind, handlers = handlers.len(), "emitting notification");
        let notification = Arc::new(notification);
        let invocations = handlers
            .into_iter()
            .map(|(id, handler)| invoke(id, handler, Arc::clone(&notification)));
        join_all(invocations).await;
    }

    /// Parse a raw wire payload and emit it. Payloads without a `type` are
    /// logged and dropped.
    pub async fn emit_value(&self, value: serde_json::Value) {
        match Notification::from_value(value) {
            Ok(notification) => self.emit(notification).await,
            Err(error) => warn!(error = %error, "dropping malformed notification"),
        }
    }

    fn snapshot(&self, kind: &NotificationType) -> Vec<(HandlerId, Handler)> {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        let specific = topics.get(&Topic::Kind(kind.clone())).into_iter().flatten();
        let wildcard = topics.get(&Topic::All).into_iter().flatten();

        specific
            .chain(wildcard)
            .map(|registration| (registration.id, Arc::clone(&registration.handler)))
            .collect()
    }
}

async fn invoke(id: HandlerId, handler: Handler, notification: Arc<Notification>) {
    let kind = notification.kind.clone();
    let future = match std::panic::catch_unwind(AssertUnwindSafe(|| handler.handle(notification)))
    {
        Ok(future) => future,
        Err(_) => {
            error!(handler = ?id, %kind, "notification handler panicked");
            return;
        }
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            error!(handler = ?id, %kind, error = %error, "notification handler failed");
        }
        Err(_) => {
            error!(handler = ?id, %kind, "notification handler panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tracing_test::traced_test;

    fn counting_handler() -> (Handler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = handler_fn(move |_notification| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (handler, calls)
    }

    fn order_received(id: i64) -> Notification {
        Notification::new(NotificationType::OrderReceived).with_id(id)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn registered_handler_receives_matching_notification() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = handler_fn(move |notification| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push((*notification).clone());
                Ok(())
            }
        });

        bus.register(NotificationType::OrderReceived, handler);
        bus.emit(order_received(1)).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], order_received(1));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn handler_for_other_kind_is_not_invoked() {
        let bus = NotificationBus::new();
        let (handler, calls) = counting_handler();

        bus.register(NotificationType::CartChanged, handler);
        bus.emit(order_received(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn wildcard_handler_receives_every_kind() {
        let bus = NotificationBus::new();
        let (handler, calls) = counting_handler();

        bus.register(Topic::All, handler);
        bus.emit(Notification::new("anything".parse().unwrap())).await;
        bus.emit(order_received(2)).await;
        bus.emit(Notification::new(NotificationType::UserFollow)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn handler_registered_under_kind_and_all_fires_twice() {
        let bus = NotificationBus::new();
        let (handler, calls) = counting_handler();

        bus.register(NotificationType::OrderReceived, Arc::clone(&handler));
        bus.register(Topic::All, handler);
        bus.emit(order_received(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn same_handler_twice_under_one_topic_is_stored_once() {
        let bus = NotificationBus::new();
        let (handler, calls) = counting_handler();

        let first = bus.register(NotificationType::OrderReceived, Arc::clone(&handler));
        let second = bus.register(NotificationType::OrderReceived, handler);
        bus.emit(order_received(1)).await;

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            bus.handler_count(Some(&Topic::Kind(NotificationType::OrderReceived))),
            1
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn distinct_closures_with_same_body_are_both_kept() {
        let bus = NotificationBus::new();
        let (first, first_calls) = counting_handler();
        let (second, second_calls) = counting_handler();

        bus.register(NotificationType::OrderReceived, first);
        bus.register(NotificationType::OrderReceived, second);
        bus.emit(order_received(1)).await;

        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn panicking_handler_does_not_stop_siblings() {
        let bus = NotificationBus::new();
        let panicking = handler_fn(|_notification| -> HandlerFuture {
            panic!("handler exploded before returning a future");
        });
        let (sibling, calls) = counting_handler();

        bus.register(NotificationType::OrderReceived, panicking);
        bus.register(NotificationType::OrderReceived, sibling);
        bus.emit(order_received(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failing_and_panicking_futures_are_isolated() {
        let bus = NotificationBus::new();
        let failing = handler_fn(|_notification| async {
            Err(HandlerError::Failed("boom".to_string()))
        });
        let panicking_future = handler_fn(|notification| async move {
            assert!(notification.id.is_none(), "panicked while running");
            Ok(())
        });
        let (sibling, calls) = counting_handler();

        bus.register(NotificationType::OrderReceived, failing);
        bus.register(NotificationType::OrderReceived, panicking_future);
        bus.register(Topic::All, sibling);
        bus.emit(order_received(1)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    #[traced_test]
    async fn notification_without_type_is_dropped_with_warning() {
        let bus = NotificationBus::new();
        let (handler, calls) = counting_handler();
        bus.register(Topic::All, handler);

        bus.emit_value(serde_json::json!({})).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(logs_contain("dropping malformed notification"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn emit_value_normalizes_kind_before_dispatch() {
        let bus = NotificationBus::new();
        let (handler, calls) = counting_handler();
        bus.register(NotificationType::ProductUpdated, handler);

        bus.emit_value(serde_json::json!({ "type": "product-updated", "productId": 4 }))
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn handlers_start_in_registration_order_with_wildcards_last() {
        let bus = NotificationBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let make = |label: &'static str| -> Handler {
            let order = Arc::clone(&order);
            handler_fn(move |_notification| {
                order.lock().unwrap().push(label);
                async { Ok(()) }
            })
        };

        bus.register(Topic::All, make("all-1"));
        bus.register(NotificationType::OrderReceived, make("specific-1"));
        bus.register(NotificationType::OrderReceived, make("specific-2"));
        bus.register(Topic::All, make("all-2"));
        bus.emit(order_received(1)).await;

        assert_eq!(
            *order.lock().unwrap(),
            vec!["specific-1", "specific-2", "all-1", "all-2"]
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn handler_added_during_emit_misses_that_emit() {
        let bus = Arc::new(NotificationBus::new());
        let (late, late_calls) = counting_handler();

        let registering_bus = Arc::clone(&bus);
        let late_handler = Arc::clone(&late);
        let registrar = handler_fn(move |_notification| {
            registering_bus.register(NotificationType::OrderReceived, Arc::clone(&late_handler));
            async { Ok(()) }
        });

        bus.register(NotificationType::OrderReceived, registrar);
        bus.emit(order_received(1)).await;
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);

        bus.emit(order_received(2)).await;
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn unregister_reports_whether_a_handler_was_removed() {
        let bus = NotificationBus::new();
        let (handler, calls) = counting_handler();
        let topic = Topic::Kind(NotificationType::OrderReceived);

        bus.register(topic.clone(), Arc::clone(&handler));
        assert!(bus.unregister(&topic, &handler));
        assert!(!bus.unregister(&topic, &handler));
        assert!(!bus.unregister(&Topic::All, &handler));

        bus.emit(order_received(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_removes_one_topic_or_everything() {
        let bus = NotificationBus::new();
        let (first, _) = counting_handler();
        let (second, _) = counting_handler();
        let (third, _) = counting_handler();
        let orders = Topic::Kind(NotificationType::OrderReceived);

        bus.register(orders.clone(), first);
        bus.register(orders.clone(), second);
        bus.register(Topic::All, third);
        assert_eq!(bus.handler_count(None), 3);

        bus.clear(Some(&orders));
        assert_eq!(bus.handler_count(Some(&orders)), 0);
        assert_eq!(bus.handler_count(Some(&Topic::All)), 1);

        bus.clear(None);
        assert_eq!(bus.handler_count(None), 0);
    }

    #[test]
    fn initialize_is_idempotent_until_reset() {
        let bus = NotificationBus::new();
        let (handler, _) = counting_handler();

        assert!(bus.initialize());
        assert!(!bus.initialize());
        assert!(bus.is_initialized());

        bus.register(Topic::All, handler);
        bus.reset();

        assert!(!bus.is_initialized());
        assert_eq!(bus.handler_count(None), 0);
        assert!(bus.initialize());
    }
}
