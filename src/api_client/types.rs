//! Wire-format DTOs for the Shopee Open API v2 endpoints this crate calls.
//!
//! These mirror the marketplace's JSON shapes closely (snake_case, optional
//! fields default-missing) rather than the crate's internal domain types;
//! translation into `domain::*` happens in the orchestrator.

use serde::{Deserialize, Serialize};

/// Optional response fields requested on `get_order_detail`, per SPEC_FULL.md
/// §4.2.
pub const ORDER_DETAIL_OPTIONAL_FIELDS: &[&str] = &[
    "item_list",
    "package_list",
    "shipping_carrier",
    "fulfillment_flag",
    "recipient_address",
    "buyer_username",
    "total_amount",
    "pay_time",
    "actual_shipping_fee",
    "cancel_by",
    "cancel_reason",
];

/// Optional response fields requested on `get_tracking_number`.
pub const TRACKING_NUMBER_OPTIONAL_FIELDS: &str =
    "plp_number,first_mile_tracking_number,last_mile_tracking_number";

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: Option<String>,
    pub response: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expire_in: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderListResponse {
    #[serde(default)]
    pub order_list: Vec<OrderListEntry>,
    #[serde(default)]
    pub more: bool,
    #[serde(default)]
    pub next_cursor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderListEntry {
    pub order_sn: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDetailResponse {
    #[serde(default)]
    pub order_list: Vec<OrderDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderDetail {
    pub order_sn: String,
    pub order_status: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub create_time: Option<i64>,
    #[serde(default)]
    pub pay_time: Option<i64>,
    #[serde(default)]
    pub ship_by_date: Option<i64>,
    #[serde(default)]
    pub total_amount: Option<String>,
    #[serde(default)]
    pub fulfillment_flag: Option<String>,
    #[serde(default)]
    pub cancel_by: Option<String>,
    #[serde(default)]
    pub cancel_reason: Option<String>,
    #[serde(default)]
    pub message_to_seller: Option<String>,
    #[serde(default)]
    pub shipping_carrier: Option<String>,
    #[serde(default)]
    pub checkout_shipping_carrier: Option<String>,
    #[serde(default)]
    pub package_list: Vec<PackageEntry>,
    #[serde(default)]
    pub item_list: Vec<ItemEntry>,
}

impl OrderDetail {
    /// First non-null wins: package-level carrier, then top-level, then
    /// checkout-level (SPEC_FULL.md §4.4 Step D.2).
    pub fn shipping_carrier_priority(&self) -> Option<&str> {
        self.package_list
            .first()
            .and_then(|p| p.shipping_carrier.as_deref())
            .filter(|s| !s.is_empty())
            .or_else(|| self.shipping_carrier.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| self.checkout_shipping_carrier.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageEntry {
    #[serde(default)]
    pub package_number: Option<String>,
    #[serde(default)]
    pub shipping_carrier: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemEntry {
    pub item_id: i64,
    #[serde(default)]
    pub model_id: Option<i64>,
    #[serde(default)]
    pub model_sku: Option<String>,
    #[serde(default)]
    pub promo_sku: Option<String>,
    #[serde(default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_quantity_purchased: Option<i32>,
    #[serde(default)]
    pub model_discounted_price: Option<String>,
    #[serde(default)]
    pub model_original_price: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub image_info: Option<ItemImage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemImage {
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentListResponse {
    #[serde(default)]
    pub order_list: Vec<OrderListEntry>,
    #[serde(default)]
    pub more: bool,
    #[serde(default)]
    pub next_cursor: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingNumberResponse {
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub first_mile_tracking_number: Option<String>,
    #[serde(default)]
    pub last_mile_tracking_number: Option<String>,
    #[serde(default)]
    pub plp_number: Option<String>,
}

impl TrackingNumberResponse {
    /// Priority order from SPEC_FULL.md §4.4 Step E.
    pub fn tracking_number_priority(&self) -> Option<&str> {
        self.tracking_number
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.first_mile_tracking_number.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| self.last_mile_tracking_number.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| self.plp_number.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingInfoResponse {
    #[serde(default)]
    pub shipping_provider_name: Option<String>,
    #[serde(default)]
    pub logistic_name: Option<String>,
    #[serde(default)]
    pub carrier_name: Option<String>,
    #[serde(default)]
    pub shipping_provider: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub logistics_channel: Option<String>,
    /// Most recent checkpoint status, e.g. `"LOGISTICS_PICKUP_DONE"` — feeds
    /// the `logistic_history` event identity alongside `update_time`.
    #[serde(default)]
    pub logistics_status: Option<String>,
    /// Checkpoint location/description, stored verbatim as the history row's
    /// `description`.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub update_time: Option<i64>,
}

impl TrackingInfoResponse {
    /// Priority order from SPEC_FULL.md §4.4 Step E.
    pub fn carrier_name_priority(&self) -> Option<&str> {
        self.shipping_provider_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.logistic_name.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| self.carrier_name.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| self.shipping_provider.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| self.carrier.as_deref().filter(|s| !s.is_empty()))
            .or_else(|| self.logistics_channel.as_deref().filter(|s| !s.is_empty()))
    }
}
