//! Job names and payloads for the four logical queues (SPEC_FULL.md §4.6).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four logical queues this system drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    OrderCollection,
    OrderDetail,
    ShipmentInfo,
    Inventory,
}

impl QueueName {
    pub fn as_key(&self) -> &'static str {
        match self {
            QueueName::OrderCollection => "orderCollection",
            QueueName::OrderDetail => "orderDetail",
            QueueName::ShipmentInfo => "shipmentInfo",
            QueueName::Inventory => "inventory",
        }
    }

    pub const ALL: [QueueName; 4] =
        [QueueName::OrderCollection, QueueName::OrderDetail, QueueName::ShipmentInfo, QueueName::Inventory];
}

/// Job payloads, one variant per queue. Kept as a closed enum (rather than
/// stringly-typed job names) so handlers pattern-match exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum JobPayload {
    CollectShopOrders { shop_key: Uuid },
    ManualOrderCollect { shop_key: Uuid },
    ProcessOrderDetails { shop_key: Uuid, order_sns: Vec<String> },
    ProcessShipmentInfo { shop_key: Uuid },
    UpdateInventory { shop_key: Uuid },
}

impl JobPayload {
    pub fn queue(&self) -> QueueName {
        match self {
            JobPayload::CollectShopOrders { .. } | JobPayload::ManualOrderCollect { .. } => QueueName::OrderCollection,
            JobPayload::ProcessOrderDetails { .. } => QueueName::OrderDetail,
            JobPayload::ProcessShipmentInfo { .. } => QueueName::ShipmentInfo,
            JobPayload::UpdateInventory { .. } => QueueName::Inventory,
        }
    }

    /// Stable name used for dedup and logging, distinct from the queue name.
    pub fn job_name(&self) -> &'static str {
        match self {
            JobPayload::CollectShopOrders { .. } => "collect-shop-orders",
            JobPayload::ManualOrderCollect { .. } => "manual-order-collect",
            JobPayload::ProcessOrderDetails { .. } => "process-order-details",
            JobPayload::ProcessShipmentInfo { .. } => "process-shipment-info",
            JobPayload::UpdateInventory { .. } => "update-inventory",
        }
    }

    /// Dedup key: same job name plus the shop it targets. A second
    /// `collect-shop-orders` for a shop already queued is redundant.
    pub fn dedup_key(&self) -> String {
        let shop_key = match self {
            JobPayload::CollectShopOrders { shop_key }
            | JobPayload::ManualOrderCollect { shop_key }
            | JobPayload::ProcessOrderDetails { shop_key, .. }
            | JobPayload::ProcessShipmentInfo { shop_key }
            | JobPayload::UpdateInventory { shop_key } => shop_key,
        };
        format!("{}:{}", self.job_name(), shop_key)
    }
}

/// Priority: lower value sorts first. Matches the common convention in the
/// pack's queue-backed services (lower number = higher priority).
pub type Priority = i64;

pub const DEFAULT_PRIORITY: Priority = 100;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const BACKOFF_BASE_MS: u64 = 1000;
pub const BACKOFF_MAX_MS: u64 = 5000;

/// An enqueued unit of work, as stored in Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    pub attempts: u32,
    pub max_attempts: u32,
    pub priority: Priority,
    pub enqueued_at: i64,
}

impl Job {
    pub fn new(payload: JobPayload) -> Self {
        Self::with_priority(payload, DEFAULT_PRIORITY)
    }

    pub fn with_priority(payload: JobPayload, priority: Priority) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            priority,
            enqueued_at: 0,
        }
    }

    /// Exponential backoff delay in milliseconds for the next retry,
    /// clamped to `BACKOFF_MAX_MS`.
    pub fn backoff_delay_ms(&self) -> u64 {
        let delay = BACKOFF_BASE_MS.saturating_mul(1u64 << self.attempts.min(10));
        delay.min(BACKOFF_MAX_MS)
    }

    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
