use std::sync::Arc;

use async_trait::async_trait;
use marketwire_core::{Notification, NotificationType};

use crate::lifecycle::Feature;
use crate::stores::{Banner, BannerLevel, StoreError, SystemStore};

/// Shows system announcements and maintenance notices on every page.
pub struct SystemFeature {
    store: Arc<dyn SystemStore>,
}

impl SystemFeature {
    pub fn new(store: Arc<dyn SystemStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Feature for SystemFeature {
    fn name(&self) -> &'static str {
        "system"
    }

    fn kinds(&self) -> Vec<NotificationType> {
        vec![
            NotificationType::SystemAnnouncement,
            NotificationType::SystemMaintenance,
        ]
    }

    async fn react(&self, notification: &Notification) -> Result<(), StoreError> {
        let level = match notification.kind {
            NotificationType::SystemMaintenance => BannerLevel::Warning,
            _ => BannerLevel::Info,
        };
        self.store
            .show_banner(Banner {
                level,
                title: notification.title.clone(),
                body: notification.body.clone(),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{FeatureHandler, FeatureRegistration};
    use crate::stores::MockSystemStore;
    use marketwire_core::NotificationBus;

    #[tokio::test(flavor = "current_thread")]
    async fn maintenance_notice_becomes_a_warning_banner() {
        let mut store = MockSystemStore::new();
        store
            .expect_show_banner()
            .withf(|banner: &Banner| {
                banner.level == BannerLevel::Warning && banner.title == "Planned maintenance"
            })
            .times(1)
            .returning(|_| Ok(()));
        let bus = Arc::new(NotificationBus::new());
        let registration =
            FeatureRegistration::new(Arc::clone(&bus), SystemFeature::new(Arc::new(store)));
        registration.register();

        let mut notice = Notification::new(NotificationType::SystemMaintenance);
        notice.title = "Planned maintenance".to_string();
        notice.body = "Checkout is unavailable 02:00-03:00 UTC".to_string();
        bus.emit(notice).await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn banner_failure_does_not_reject_emit() {
        let mut store = MockSystemStore::new();
        store
            .expect_show_banner()
            .times(1)
            .returning(|_| Err(StoreError::Unavailable));
        let bus = Arc::new(NotificationBus::new());
        let registration =
            FeatureRegistration::new(Arc::clone(&bus), SystemFeature::new(Arc::new(store)));
        registration.register();

        bus.emit(Notification::new(NotificationType::SystemAnnouncement))
            .await;
        assert!(registration.is_registered());
    }
}
