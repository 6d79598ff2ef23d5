use std::sync::{Arc, Mutex, PoisonError};

use marketwire_chat::{ChatStore, InMemoryChatStore};
use marketwire_core::NotificationBus;
use marketwire_core::config::Config;
use marketwire_handlers::{
    CartFeature, CartStore, ConnectionFeature, ConnectionStore, FeatureHandler,
    FeatureRegistration, OrderFeature, OrderStore, ProductFeature, ProductStore, Route,
    SearchFeature, SearchStore, SharedPageContext, SystemFeature, SystemStore,
};
use marketwire_notifications::{
    AlertManager, AlertSettings, InMemoryNotificationStore, NotificationStore, Presenter,
};
use marketwire_realtime::{
    ConnectionManager, ConnectionSettings, EventRouter, NetworkStatus, SocketTransport,
    WebSocketTransport,
};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::auth::{AuthSnapshot, AuthState};
use crate::orchestrator::Orchestrator;
use crate::stores::TracingStores;

const CHAT_PATH: &str = "/messages";

/// The domain stores a session writes into.
#[derive(Clone)]
pub struct SessionStores {
    pub chats: Arc<dyn ChatStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub orders: Arc<dyn OrderStore>,
    pub products: Arc<dyn ProductStore>,
    pub cart: Arc<dyn CartStore>,
    pub search: Arc<dyn SearchStore>,
    pub connections: Arc<dyn ConnectionStore>,
    pub system: Arc<dyn SystemStore>,
}

impl SessionStores {
    /// In-memory chat and notification stores; feature refreshes are logged.
    pub fn in_memory() -> Self {
        let logged = Arc::new(TracingStores);
        Self {
            chats: Arc::new(InMemoryChatStore::new()),
            notifications: Arc::new(InMemoryNotificationStore::new()),
            orders: logged.clone(),
            products: logged.clone(),
            cart: logged.clone(),
            search: logged.clone(),
            connections: logged.clone(),
            system: logged,
        }
    }
}

/// Owns one notification bus, one connection manager, the feature handlers
/// and the orchestrator for a signed-in user.
pub struct Session<T: SocketTransport = WebSocketTransport> {
    bus: Arc<NotificationBus>,
    auth: Arc<AuthState>,
    alerts: Arc<AlertManager>,
    router: Arc<EventRouter>,
    connection: ConnectionManager<T>,
    orchestrator: Arc<Orchestrator>,
    page: Arc<SharedPageContext>,
    auth_watch: Mutex<Option<JoinHandle<()>>>,
}

impl<T: SocketTransport> Session<T> {
    pub fn new(
        config: &Config,
        transport: T,
        auth: Arc<AuthState>,
        presenter: Arc<dyn Presenter>,
        stores: SessionStores,
    ) -> Self {
        let bus = Arc::new(NotificationBus::new());
        let alerts = Arc::new(AlertManager::new(
            presenter,
            AlertSettings::from(&config.notifications),
        ));
        let router = Arc::new(EventRouter::new(
            stores.chats,
            stores.notifications,
            Arc::clone(&alerts),
            Arc::clone(&bus),
        ));
        let connection = ConnectionManager::new(
            transport,
            ConnectionSettings::from(config),
            auth.clone(),
            router.clone(),
        );

        let page = Arc::new(SharedPageContext::default());
        let debounce = config.handlers.debounce();
        let handlers: Vec<Arc<dyn FeatureHandler>> = vec![
            Arc::new(FeatureRegistration::new(
                Arc::clone(&bus),
                OrderFeature::new(stores.orders, page.clone(), debounce),
            )),
            Arc::new(FeatureRegistration::new(
                Arc::clone(&bus),
                ProductFeature::new(stores.products, page.clone(), debounce),
            )),
            Arc::new(FeatureRegistration::new(
                Arc::clone(&bus),
                CartFeature::new(stores.cart, page.clone(), debounce),
            )),
            Arc::new(FeatureRegistration::new(
                Arc::clone(&bus),
                SearchFeature::new(stores.search, page.clone(), debounce),
            )),
            Arc::new(FeatureRegistration::new(
                Arc::clone(&bus),
                ConnectionFeature::new(stores.connections, page.clone(), debounce),
            )),
            Arc::new(FeatureRegistration::new(
                Arc::clone(&bus),
                SystemFeature::new(stores.system),
            )),
        ];
        let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&bus), handlers));

        Self {
            bus,
            auth,
            alerts,
            router,
            connection,
            orchestrator,
            page,
            auth_watch: Mutex::new(None),
        }
    }

    /// Apply the current auth state and follow later changes. Must be called
    /// from within a Tokio runtime; calling it again has no effect.
    pub fn start(&self) {
        let mut watch = self.auth_watch.lock().unwrap_or_else(PoisonError::into_inner);
        if watch.is_some() {
            return;
        }

        let mut changes = self.auth.subscribe();
        let current = changes.borrow_and_update().clone();
        apply_auth(&self.router, &self.orchestrator, &current);

        let router = Arc::clone(&self.router);
        let orchestrator = Arc::clone(&self.orchestrator);
        *watch = Some(tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let snapshot = changes.borrow_and_update().clone();
                apply_auth(&router, &orchestrator, &snapshot);
            }
            debug!("auth watch ended");
        }));
    }

    /// Tear down everything tied to the signed-in user.
    pub fn logout(&self) {
        self.auth.set(AuthSnapshot::signed_out());
        self.orchestrator.deactivate();
        self.bus.reset();
        self.connection.force_disconnect();
        self.router.set_current_user(None);
        info!("session logged out");
    }

    /// Close the socket unconditionally and stop following auth changes.
    pub fn shutdown(&self) {
        self.connection.on_page_unload();
        if let Some(watch) = self
            .auth_watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            watch.abort();
        }
        info!("session shut down");
    }

    pub fn on_visibility_change(&self, visible: bool) {
        self.alerts.set_page_visible(visible);
        self.connection.on_visibility_change(visible);
    }

    pub fn on_network_change(&self, network: NetworkStatus) {
        self.connection.on_network_change(network);
    }

    /// Record navigation. A `/messages/{chat_id}` route makes that chat the
    /// active one for alert suppression.
    pub fn navigate(&self, route: Route) {
        let active_chat = route.param_after(CHAT_PATH).map(str::to_owned);
        self.alerts.set_active_chat(active_chat.as_deref());
        self.page.navigate(route);
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn auth(&self) -> &Arc<AuthState> {
        &self.auth
    }

    pub fn alerts(&self) -> &Arc<AlertManager> {
        &self.alerts
    }

    pub fn connection(&self) -> &ConnectionManager<T> {
        &self.connection
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn page(&self) -> &Arc<SharedPageContext> {
        &self.page
    }
}

fn apply_auth(router: &EventRouter, orchestrator: &Orchestrator, snapshot: &AuthSnapshot) {
    router.set_current_user(snapshot.user_id.as_deref());
    orchestrator.apply(snapshot);
}
