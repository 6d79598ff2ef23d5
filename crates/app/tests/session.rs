use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use marketwire_app::{AuthSnapshot, AuthState, Session, SessionStores};
use marketwire_core::EntityId;
use marketwire_core::config::{Config, load_config_from_str};
use marketwire_handlers::{OrderStore, Route, StoreError};
use marketwire_notifications::{
    Alert, InMemoryNotificationStore, NotificationError, Presenter, TracingPresenter,
};
use marketwire_realtime::{
    ConnectionError, ConnectionState, SocketConnection, SocketPeer, SocketTransport,
    SubscriberKind, WireFrame,
};
use marketwire_test_support::fixtures;
use serde_json::json;

#[derive(Clone, Default)]
struct LoopbackTransport {
    peers: Arc<Mutex<Vec<SocketPeer>>>,
    connects: Arc<AtomicUsize>,
}

impl LoopbackTransport {
    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn take_peer(&self) -> SocketPeer {
        self.peers.lock().unwrap().remove(0)
    }
}

impl SocketTransport for LoopbackTransport {
    async fn connect(&self, _url: &str, _token: &str) -> Result<SocketConnection, ConnectionError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let (connection, peer) = SocketConnection::pair();
        self.peers.lock().unwrap().push(peer);
        Ok(connection)
    }
}

#[derive(Default)]
struct RecordingOrders {
    refreshes: AtomicUsize,
}

#[async_trait]
impl OrderStore for RecordingOrders {
    async fn refresh_orders(&self) -> Result<(), StoreError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update_order_status(
        &self,
        _order_id: &EntityId,
        _status: &str,
    ) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPresenter {
    toasts: AtomicUsize,
    desktop: AtomicUsize,
}

impl Presenter for RecordingPresenter {
    fn toast(&self, _alert: &Alert) -> Result<(), NotificationError> {
        self.toasts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn desktop(&self, _alert: &Alert) -> Result<(), NotificationError> {
        self.desktop.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn audio_cue(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

fn config() -> Config {
    load_config_from_str(&fixtures::config("minimal-config.toml")).unwrap()
}

fn signed_in() -> Arc<AuthState> {
    Arc::new(AuthState::new(AuthSnapshot::signed_in(
        Some("me".to_string()),
        "jwt",
    )))
}

fn frame(event: &str, data: serde_json::Value) -> String {
    WireFrame::new(event, data).encode().unwrap()
}

async fn settle(duration: Duration) {
    tokio::time::sleep(duration).await;
    tokio::task::yield_now().await;
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn notifications_from_the_socket_reach_feature_stores() {
    let orders = Arc::new(RecordingOrders::default());
    let notifications = Arc::new(InMemoryNotificationStore::new());
    let mut stores = SessionStores::in_memory();
    stores.orders = orders.clone();
    stores.notifications = notifications.clone();

    let transport = LoopbackTransport::default();
    let session = Session::new(
        &config(),
        transport.clone(),
        signed_in(),
        Arc::new(TracingPresenter),
        stores,
    );
    session.start();
    session.navigate(Route::new("/orders"));

    let socket = session
        .connection()
        .subscribe("orders-page", SubscriberKind::Notifications, None)
        .await;
    assert!(socket.is_some());
    let peer = transport.take_peer();

    peer.inbound
        .send(Ok(fixtures::wire("notification-order-received.json")))
        .unwrap();
    for id in [9101_i64, 9102] {
        peer.inbound
            .send(Ok(frame(
                "notificationNew",
                json!({ "id": id, "type": "order-updated", "orderId": 1183 }),
            )))
            .unwrap();
    }

    settle(Duration::from_secs(1)).await;

    assert_eq!(notifications.notifications().len(), 3);
    assert_eq!(notifications.unread_count(), 3);
    assert_eq!(orders.refreshes.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn logout_tears_down_handlers_bus_and_socket() {
    let transport = LoopbackTransport::default();
    let session = Session::new(
        &config(),
        transport.clone(),
        signed_in(),
        Arc::new(TracingPresenter),
        SessionStores::in_memory(),
    );
    session.start();
    assert!(session.orchestrator().is_active());
    assert!(session.bus().is_initialized());

    session
        .connection()
        .subscribe("header", SubscriberKind::Mixed, None)
        .await
        .unwrap();
    let peer = transport.take_peer();

    session.logout();

    assert!(!session.orchestrator().is_active());
    assert!(!session.bus().is_initialized());
    assert_eq!(session.bus().handler_count(None), 0);
    assert_eq!(session.connection().subscriber_count(), 0);
    assert_eq!(session.connection().state(), ConnectionState::Disconnected);
    assert!(peer.cancel.is_cancelled());
    assert!(
        session
            .orchestrator()
            .handlers()
            .iter()
            .all(|handler| !handler.is_registered())
    );
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn signing_in_activates_handlers_and_allows_connecting() {
    let transport = LoopbackTransport::default();
    let auth = Arc::new(AuthState::default());
    let session = Session::new(
        &config(),
        transport.clone(),
        Arc::clone(&auth),
        Arc::new(TracingPresenter),
        SessionStores::in_memory(),
    );
    session.start();

    assert!(
        session
            .connection()
            .subscribe("header", SubscriberKind::Mixed, None)
            .await
            .is_none()
    );
    assert_eq!(transport.connects(), 0);
    assert!(!session.orchestrator().is_active());

    auth.set(AuthSnapshot::signed_in(Some("me".to_string()), "jwt"));
    settle(Duration::from_millis(1)).await;

    assert!(session.orchestrator().is_active());
    assert!(session.bus().handler_count(None) > 0);
    assert!(session.connection().connect().await.is_some());
    assert_eq!(transport.connects(), 1);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn alerts_follow_active_chat_and_visibility() {
    let presenter = Arc::new(RecordingPresenter::default());
    let transport = LoopbackTransport::default();
    let session = Session::new(
        &config(),
        transport.clone(),
        signed_in(),
        presenter.clone(),
        SessionStores::in_memory(),
    );
    session.start();
    session.navigate(Route::new("/messages/42"));
    session
        .connection()
        .subscribe("chat-42", SubscriberKind::Chat, None)
        .await
        .unwrap();
    let peer = transport.take_peer();

    peer.inbound
        .send(Ok(fixtures::wire("chat-message-new.json")))
        .unwrap();
    settle(Duration::from_millis(10)).await;
    assert_eq!(presenter.toasts.load(Ordering::SeqCst), 0);

    session.on_visibility_change(false);
    peer.inbound
        .send(Ok(frame(
            "chatMessageNew",
            json!({ "id": 502, "chatId": 42, "senderId": 7, "content": "Following up" }),
        )))
        .unwrap();
    settle(Duration::from_millis(10)).await;

    assert_eq!(presenter.toasts.load(Ordering::SeqCst), 1);
    assert_eq!(presenter.desktop.load(Ordering::SeqCst), 1);
}
