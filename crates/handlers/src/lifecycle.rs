use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use marketwire_core::{
    Handler, Notification, NotificationBus, NotificationType, Topic, handler_fn,
};
use tracing::{debug, error, info};

use crate::stores::StoreError;

/// The behaviour of one feature: which notification kinds it listens to and
/// how it reacts to them.
#[async_trait]
pub trait Feature: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn kinds(&self) -> Vec<NotificationType>;

    /// React to one notification. Irrelevant notifications return `Ok(())`
    /// without side effects.
    async fn react(&self, notification: &Notification) -> Result<(), StoreError>;

    /// Number of refreshes waiting on a debounce timer.
    fn pending(&self) -> usize {
        0
    }

    /// Drop every pending refresh.
    fn cancel_pending(&self) -> usize {
        0
    }
}

/// Uniform activation lifecycle driven by the orchestrator.
pub trait FeatureHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Subscribe to the bus. Returns `false` if already registered.
    fn register(&self) -> bool;

    /// Cancel pending refreshes and unsubscribe. Returns `false` if not
    /// registered.
    fn unregister(&self) -> bool;

    fn is_registered(&self) -> bool;
}

/// Binds a [`Feature`] to a [`NotificationBus`].
pub struct FeatureRegistration<F> {
    bus: Arc<NotificationBus>,
    feature: Arc<F>,
    active: Mutex<Option<Vec<(Topic, Handler)>>>,
}

impl<F: Feature> FeatureRegistration<F> {
    pub fn new(bus: Arc<NotificationBus>, feature: F) -> Self {
        Self {
            bus,
            feature: Arc::new(feature),
            active: Mutex::new(None),
        }
    }

    pub fn feature(&self) -> &F {
        &self.feature
    }

    pub fn pending(&self) -> usize {
        self.feature.pending()
    }

    fn handler(&self) -> Handler {
        let feature = Arc::clone(&self.feature);
        handler_fn(move |notification: Arc<Notification>| {
            let feature = Arc::clone(&feature);
            async move {
                if let Err(error) = feature.react(&notification).await {
                    error!(
                        handler = feature.name(),
                        kind = %notification.kind,
                        error = %error,
                        "feature handler failed"
                    );
                }
                Ok(())
            }
        })
    }
}

impl<F: Feature> FeatureHandler for FeatureRegistration<F> {
    fn name(&self) -> &'static str {
        self.feature.name()
    }

    fn register(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            debug!(handler = self.name(), "already registered");
            return false;
        }

        let handler = self.handler();
        let entries: Vec<(Topic, Handler)> = self
            .feature
            .kinds()
            .into_iter()
            .map(|kind| (Topic::Kind(kind), Arc::clone(&handler)))
            .collect();
        for (topic, handler) in &entries {
            self.bus.register(topic.clone(), Arc::clone(handler));
        }

        info!(handler = self.name(), kinds = entries.len(), "feature handler registered");
        *active = Some(entries);
        true
    }

    fn unregister(&self) -> bool {
        let Some(entries) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return false;
        };

        let cancelled = self.feature.cancel_pending();
        for (topic, handler) in &entries {
            self.bus.unregister(topic, handler);
        }
        info!(handler = self.name(), cancelled, "feature handler unregistered");
        true
    }

    fn is_registered(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
