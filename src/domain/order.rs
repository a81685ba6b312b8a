//! Order identity, status, and the status→action-status mapping.
//!
//! Modeled as closed enums rather than string matching (SPEC_FULL.md §9):
//! unknown marketplace status strings still round-trip (via `Other`) instead
//! of being rejected, but they always map to the `ORDER` action-status with a
//! logged warning.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

pub const PLATFORM_SHOPEE: &str = "shopee";

/// Raw marketplace order status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    ReadyToShip,
    Processed,
    Shipped,
    Completed,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "READY_TO_SHIP" => OrderStatus::ReadyToShip,
            "PROCESSED" => OrderStatus::Processed,
            "SHIPPED" => OrderStatus::Shipped,
            "COMPLETED" => OrderStatus::Completed,
            "CANCELLED" => OrderStatus::Cancelled,
            other => {
                tracing::warn!(status = other, "unrecognized marketplace order status");
                OrderStatus::Other(other.to_string())
            }
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            OrderStatus::ReadyToShip => "READY_TO_SHIP",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Other(s) => s,
        }
    }

    /// Status values for which Step E attempts to reconcile a tracking
    /// number, per SPEC_FULL.md §4.4 Step E.
    pub fn may_have_tracking(&self) -> bool {
        matches!(
            self,
            OrderStatus::Processed | OrderStatus::Shipped | OrderStatus::Completed
        )
    }

    pub fn is_shipped_or_completed(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Completed)
    }

    pub fn action_status(&self) -> ActionStatus {
        match self {
            OrderStatus::ReadyToShip => ActionStatus::ReadyToPrint,
            OrderStatus::Shipped => ActionStatus::Exported,
            OrderStatus::Cancelled => ActionStatus::RequestCancel,
            _ => ActionStatus::Order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    ReadyToPrint,
    Exported,
    RequestCancel,
    Order,
}

impl ActionStatus {
    pub fn as_wire(&self) -> &'static str {
        match self {
            ActionStatus::ReadyToPrint => "READY_TO_PRINT",
            ActionStatus::Exported => "EXPORTED",
            ActionStatus::RequestCancel => "REQUEST_CANCEL",
            ActionStatus::Order => "ORDER",
        }
    }
}

pub const OTHER_STATUS_DEFAULT: &str = "NONE";

/// Whether a shop fulfills an order directly or via marketplace logistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentFlag {
    Seller,
    Shopee,
}

impl FulfillmentFlag {
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "fulfilled_by_cb_seller" => Some(FulfillmentFlag::Seller),
            "fulfilled_by_shopee" => Some(FulfillmentFlag::Shopee),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            FulfillmentFlag::Seller => "SELLER",
            FulfillmentFlag::Shopee => "SHOPEE",
        }
    }
}

/// A normalized order, ready to be upserted by the order repository.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: Uuid,
    pub platform: &'static str,
    pub order_num: String,
    pub status: OrderStatus,
    pub other_status: String,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub order_time: Option<DateTime<Utc>>,
    pub pay_time: Option<DateTime<Utc>>,
    pub ship_by_date: Option<DateTime<Utc>>,
    pub total_amount: Option<Decimal>,
    pub company_id: Uuid,
    pub marketplace_shop_id: i64,
    pub fulfillment_flag: Option<FulfillmentFlag>,
    pub cancel_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub message_to_seller: Option<String>,
}

/// Convert a Shopee wire-format epoch-seconds timestamp into `DateTime<Utc>`.
///
/// Internal storage is wall-clock timestamp; the conversion is an explicit
/// `* 1000` (seconds to milliseconds) performed implicitly by
/// `DateTime::from_timestamp`, never a raw integer carried past this point.
pub fn epoch_seconds_to_datetime(epoch_seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(epoch_seconds, 0)
}
