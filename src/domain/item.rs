//! Order line items.

use rust_decimal::Decimal;
use uuid::Uuid;

use super::ids::PackageNumber;

/// A single line item on an order.
#[derive(Debug, Clone)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub item_id: i64,
    pub model_id: Option<i64>,
    pub sku: String,
    pub item_name: String,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub weight: Decimal,
    pub promo_sku: Option<String>,
    pub option: Option<String>,
    pub image_url: Option<String>,
    pub package_number: Option<PackageNumber>,
}

impl OrderItem {
    /// Shopee's order-detail response does not always carry a seller SKU.
    /// When absent, a synthetic one is derived so every item row has a
    /// non-null `sku`, matching the teacher's fallback-identifier pattern.
    pub fn resolve_sku(item_sku: Option<&str>, item_id: i64) -> String {
        match item_sku {
            Some(sku) if !sku.trim().is_empty() => sku.to_string(),
            _ => format!("shopee-{item_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_sku_prefers_seller_sku() {
        assert_eq!(OrderItem::resolve_sku(Some("ABC-123"), 999), "ABC-123");
    }

    #[test]
    fn resolve_sku_falls_back_to_synthetic_when_absent() {
        assert_eq!(OrderItem::resolve_sku(None, 999), "shopee-999");
        assert_eq!(OrderItem::resolve_sku(Some("   "), 999), "shopee-999");
    }
}
