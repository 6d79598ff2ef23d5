use std::sync::{Arc, Mutex, PoisonError};

use marketwire_core::NotificationBus;
use marketwire_handlers::FeatureHandler;
use tracing::{debug, info};

use crate::auth::AuthSnapshot;

/// Activates every feature handler while the user is signed in and
/// verified, and tears them all down otherwise.
pub struct Orchestrator {
    bus: Arc<NotificationBus>,
    handlers: Vec<Arc<dyn FeatureHandler>>,
    active: Mutex<bool>,
}

impl Orchestrator {
    /// `handlers` are registered in the given order.
    pub fn new(bus: Arc<NotificationBus>, handlers: Vec<Arc<dyn FeatureHandler>>) -> Self {
        Self {
            bus,
            handlers,
            active: Mutex::new(false),
        }
    }

    pub fn is_active(&self) -> bool {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handlers(&self) -> &[Arc<dyn FeatureHandler>] {
        &self.handlers
    }

    /// Move to the state `snapshot` calls for. Returns whether anything
    /// changed.
    pub fn apply(&self, snapshot: &AuthSnapshot) -> bool {
        if snapshot.is_active() {
            self.activate()
        } else {
            self.deactivate()
        }
    }

    pub fn activate(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if *active {
            debug!("handlers already active");
            return false;
        }

        self.bus.initialize();
        for handler in &self.handlers {
            handler.register();
        }
        *active = true;
        info!(handlers = self.handlers.len(), "feature handlers activated");
        true
    }

    pub fn deactivate(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !*active {
            return false;
        }

        for handler in &self.handlers {
            handler.unregister();
        }
        self.bus.clear(None);
        *active = false;
        info!("feature handlers deactivated");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Probe {
        name: &'static str,
        registered: AtomicBool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FeatureHandler for Probe {
        fn name(&self) -> &'static str {
            self.name
        }

        fn register(&self) -> bool {
            self.log.lock().unwrap().push(format!("+{}", self.name));
            !self.registered.swap(true, Ordering::SeqCst)
        }

        fn unregister(&self) -> bool {
            self.log.lock().unwrap().push(format!("-{}", self.name));
            self.registered.swap(false, Ordering::SeqCst)
        }

        fn is_registered(&self) -> bool {
            self.registered.load(Ordering::SeqCst)
        }
    }

    fn orchestrator(log: &Arc<Mutex<Vec<String>>>) -> (Arc<NotificationBus>, Orchestrator) {
        let bus = Arc::new(NotificationBus::new());
        let handlers = ["orders", "products", "cart"]
            .into_iter()
            .map(|name| {
                Arc::new(Probe {
                    name,
                    registered: AtomicBool::new(false),
                    log: Arc::clone(log),
                }) as Arc<dyn FeatureHandler>
            })
            .collect();
        (Arc::clone(&bus), Orchestrator::new(bus, handlers))
    }

    #[test]
    fn activation_initializes_bus_then_registers_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (bus, orchestrator) = orchestrator(&log);

        assert!(orchestrator.apply(&AuthSnapshot::signed_in(None, "jwt")));

        assert!(bus.is_initialized());
        assert_eq!(*log.lock().unwrap(), vec!["+orders", "+products", "+cart"]);
        assert!(orchestrator.handlers().iter().all(|h| h.is_registered()));
    }

    #[test]
    fn flapping_auth_state_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (_bus, orchestrator) = orchestrator(&log);
        let signed_in = AuthSnapshot::signed_in(None, "jwt");

        assert!(!orchestrator.apply(&AuthSnapshot::signed_out()));
        assert!(orchestrator.apply(&signed_in));
        assert!(!orchestrator.apply(&signed_in));
        assert!(orchestrator.apply(&AuthSnapshot::signed_out()));
        assert!(!orchestrator.apply(&AuthSnapshot::signed_out()));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["+orders", "+products", "+cart", "-orders", "-products", "-cart"]
        );
        assert!(!orchestrator.is_active());
    }

    #[test]
    fn deactivation_clears_the_bus() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (bus, orchestrator) = orchestrator(&log);
        orchestrator.activate();
        bus.register(
            marketwire_core::Topic::All,
            marketwire_core::handler_fn(|_notification| async { Ok(()) }),
        );

        orchestrator.deactivate();
        assert_eq!(bus.handler_count(None), 0);
    }
}
