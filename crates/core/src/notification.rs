use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BusError;

/// Identifier of a backend entity. The backend sends both numeric and
/// string ids, sometimes for the same entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{n}"),
            EntityId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        EntityId::Number(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        EntityId::Text(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        EntityId::Text(value)
    }
}

impl EntityId {
    /// Compare against a path segment such as the `42` in `/products/42`.
    pub fn matches_segment(&self, segment: &str) -> bool {
        match self {
            EntityId::Number(n) => segment.parse::<i64>().is_ok_and(|parsed| parsed == *n),
            EntityId::Text(s) => s == segment,
        }
    }
}

/// Kind of backend notification.
///
/// Wire strings are normalized before matching (`product-updated` and
/// `Product_Updated` both become [`NotificationType::ProductUpdated`]).
/// Unknown kinds are kept verbatim in [`NotificationType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NotificationType {
    // ── Orders ────────────────────────────────────────────────────
    OrderReceived,
    OrderUpdated,
    OrderStatusChanged,
    OrderCancelled,
    OrderShipped,

    // ── Products ──────────────────────────────────────────────────
    ProductCreated,
    ProductUpdated,
    ProductDeleted,
    ProductPriceChanged,
    ProductStockChanged,
    ProductsUpdated,

    // ── Cart ──────────────────────────────────────────────────────
    CartChanged,
    CartItemAdded,
    CartItemRemoved,
    CartCleared,

    // ── Companies ─────────────────────────────────────────────────
    CompanyUpdated,

    // ── Network ───────────────────────────────────────────────────
    UserFollow,
    UserUnfollow,
    ConnectionRequest,
    ConnectionAccepted,
    ConnectionRemoved,

    // ── System ────────────────────────────────────────────────────
    SystemAnnouncement,
    SystemMaintenance,

    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::OrderReceived => "order_received",
            NotificationType::OrderUpdated => "order_updated",
            NotificationType::OrderStatusChanged => "order_status_changed",
            NotificationType::OrderCancelled => "order_cancelled",
            NotificationType::OrderShipped => "order_shipped",
            NotificationType::ProductCreated => "product_created",
            NotificationType::ProductUpdated => "product_updated",
            NotificationType::ProductDeleted => "product_deleted",
            NotificationType::ProductPriceChanged => "product_price_changed",
            NotificationType::ProductStockChanged => "product_stock_changed",
            NotificationType::ProductsUpdated => "products_updated",
            NotificationType::CartChanged => "cart_changed",
            NotificationType::CartItemAdded => "cart_item_added",
            NotificationType::CartItemRemoved => "cart_item_removed",
            NotificationType::CartCleared => "cart_cleared",
            NotificationType::CompanyUpdated => "company_updated",
            NotificationType::UserFollow => "user_follow",
            NotificationType::UserUnfollow => "user_unfollow",
            NotificationType::ConnectionRequest => "connection_request",
            NotificationType::ConnectionAccepted => "connection_accepted",
            NotificationType::ConnectionRemoved => "connection_removed",
            NotificationType::SystemAnnouncement => "system_announcement",
            NotificationType::SystemMaintenance => "system_maintenance",
            NotificationType::Other(raw) => raw,
        }
    }

    /// Lower-case and map `-` to `_`.
    pub fn normalize(raw: &str) -> String {
        raw.trim().to_ascii_lowercase().replace('-', "_")
    }
}

impl std::str::FromStr for NotificationType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = Self::normalize(s);
        Ok(match normalized.as_str() {
            "order_received" => NotificationType::OrderReceived,
            "order_updated" => NotificationType::OrderUpdated,
            "order_status_changed" => NotificationType::OrderStatusChanged,
            "order_cancelled" => NotificationType::OrderCancelled,
            "order_shipped" => NotificationType::OrderShipped,
            "product_created" => NotificationType::ProductCreated,
            "product_updated" => NotificationType::ProductUpdated,
            "product_deleted" => NotificationType::ProductDeleted,
            "product_price_changed" => NotificationType::ProductPriceChanged,
            "product_stock_changed" => NotificationType::ProductStockChanged,
            "products_updated" => NotificationType::ProductsUpdated,
            "cart_changed" => NotificationType::CartChanged,
            "cart_item_added" => NotificationType::CartItemAdded,
            "cart_item_removed" => NotificationType::CartItemRemoved,
            "cart_cleared" => NotificationType::CartCleared,
            "company_updated" => NotificationType::CompanyUpdated,
            "user_follow" => NotificationType::UserFollow,
            "user_unfollow" => NotificationType::UserUnfollow,
            "connection_request" => NotificationType::ConnectionRequest,
            "connection_accepted" => NotificationType::ConnectionAccepted,
            "connection_removed" => NotificationType::ConnectionRemoved,
            "system_announcement" => NotificationType::SystemAnnouncement,
            "system_maintenance" => NotificationType::SystemMaintenance,
            _ => NotificationType::Other(normalized),
        })
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NotificationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let Ok(kind) = raw.parse::<NotificationType>();
        Ok(kind)
    }
}

/// A backend notification. Immutable once received; handlers share it
/// through an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,

    #[serde(rename = "type")]
    pub kind: NotificationType,

    #[serde(default)]
    pub title: String,

    #[serde(default, alias = "message")]
    pub body: String,

    #[serde(default, alias = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<EntityId>,

    #[serde(default, alias = "targetUserId", skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<EntityId>,

    #[serde(default, alias = "productId", skip_serializing_if = "Option::is_none")]
    pub product_id: Option<EntityId>,

    #[serde(default, alias = "affectedProductIds", skip_serializing_if = "Vec::is_empty")]
    pub affected_product_ids: Vec<EntityId>,

    #[serde(default, alias = "companyId", skip_serializing_if = "Option::is_none")]
    pub company_id: Option<EntityId>,

    #[serde(default, alias = "orderId", skip_serializing_if = "Option::is_none")]
    pub order_id: Option<EntityId>,

    #[serde(default)]
    pub read: bool,

    #[serde(default, alias = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl Notification {
    pub fn new(kind: NotificationType) -> Self {
        Self {
            id: None,
            kind,
            title: String::new(),
            body: String::new(),
            user_id: None,
            target_user_id: None,
            product_id: None,
            affected_product_ids: Vec::new(),
            company_id: None,
            order_id: None,
            read: false,
            created_at: None,
            metadata: serde_json::Value::Null,
        }
    }

    /// Parse a wire payload. A payload without a usable `type` is rejected
    /// with [`BusError::MissingType`].
    pub fn from_value(value: serde_json::Value) -> Result<Self, BusError> {
        let has_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .is_some_and(|kind| !kind.trim().is_empty());
        if !has_type {
            return Err(BusError::MissingType);
        }

        serde_json::from_value(value).map_err(|error| BusError::Malformed(error.to_string()))
    }

    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<EntityId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_target_user(mut self, user_id: impl Into<EntityId>) -> Self {
        self.target_user_id = Some(user_id.into());
        self
    }

    pub fn with_product(mut self, product_id: impl Into<EntityId>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    pub fn with_affected_products(mut self, ids: impl IntoIterator<Item = EntityId>) -> Self {
        self.affected_product_ids = ids.into_iter().collect();
        self
    }

    pub fn with_company(mut self, company_id: impl Into<EntityId>) -> Self {
        self.company_id = Some(company_id.into());
        self
    }

    pub fn with_order(mut self, order_id: impl Into<EntityId>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The user a network notification is about: `target_user_id` when
    /// present, otherwise `user_id`.
    pub fn subject_user(&self) -> Option<&EntityId> {
        self.target_user_id.as_ref().or(self.user_id.as_ref())
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn hyphen_and_underscore_spellings_parse_to_the_same_kind() {
        let hyphen: NotificationType = "product-updated".parse().unwrap();
        let underscore: NotificationType = "product_updated".parse().unwrap();
        let shouting: NotificationType = "PRODUCT-UPDATED".parse().unwrap();

        assert_eq!(hyphen, NotificationType::ProductUpdated);
        assert_eq!(underscore, NotificationType::ProductUpdated);
        assert_eq!(shouting, NotificationType::ProductUpdated);
    }

    #[test]
    fn unknown_kind_is_kept_normalized() {
        let kind: NotificationType = "Flash-Sale".parse().unwrap();
        assert_eq!(kind, NotificationType::Other("flash_sale".to_string()));
        assert_eq!(kind.as_str(), "flash_sale");
    }

    #[test]
    fn from_value_accepts_camel_and_snake_field_names() {
        let notification = Notification::from_value(json!({
            "id": 7,
            "type": "user-follow",
            "title": "New follower",
            "userId": 12,
            "target_user_id": "u-34",
            "affected_product_ids": [1, 2],
            "companyId": 5
        }))
        .unwrap();

        assert_eq!(notification.id, Some(EntityId::Number(7)));
        assert_eq!(notification.kind, NotificationType::UserFollow);
        assert_eq!(notification.user_id, Some(EntityId::Number(12)));
        assert_eq!(notification.target_user_id, Some(EntityId::from("u-34")));
        assert_eq!(notification.affected_product_ids.len(), 2);
        assert_eq!(notification.company_id, Some(EntityId::Number(5)));
        assert_eq!(notification.subject_user(), Some(&EntityId::from("u-34")));
    }

    #[test]
    fn from_value_rejects_missing_or_blank_type() {
        assert_matches!(
            Notification::from_value(json!({})),
            Err(BusError::MissingType)
        );
        assert_matches!(
            Notification::from_value(json!({ "type": "  " })),
            Err(BusError::MissingType)
        );
        assert_matches!(
            Notification::from_value(json!({ "type": 3 })),
            Err(BusError::MissingType)
        );
    }

    #[test]
    fn from_value_reports_malformed_fields() {
        let result = Notification::from_value(json!({ "type": "order_received", "read": "yes" }));
        assert_matches!(result, Err(BusError::Malformed(_)));
    }

    #[test]
    fn entity_id_matches_path_segments() {
        assert!(EntityId::Number(42).matches_segment("42"));
        assert!(!EntityId::Number(42).matches_segment("042x"));
        assert!(EntityId::from("abc").matches_segment("abc"));
        assert!(!EntityId::from("abc").matches_segment("abd"));
    }

    #[test]
    fn serializes_kind_with_canonical_spelling() {
        let notification = Notification::new("order-received".parse().unwrap()).with_id(1_i64);
        let value = serde_json::to_value(&notification).unwrap();
        assert_eq!(value["type"], "order_received");
        assert_eq!(value["id"], 1);
    }
}
