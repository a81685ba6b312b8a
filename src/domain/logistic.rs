//! Shipment and tracking-event domain types.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::ids::TrackingNumber;

/// The current shipment for an order. One row per order (`toms_order_id`
/// is unique), carrying the latest known tracking number and carrier.
#[derive(Debug, Clone)]
pub struct Logistic {
    pub id: Uuid,
    pub toms_order_id: Uuid,
    pub tracking_number: Option<TrackingNumber>,
    pub carrier_name: Option<String>,
    pub logistics_status: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
}

impl Logistic {
    /// Merge freshly fetched tracking data onto an existing row without
    /// discarding a previously known carrier name when the new fetch omits
    /// one (SPEC_FULL.md §4.4 Step E: carrier-name preservation).
    pub fn merge_carrier_name(existing: Option<&str>, incoming: Option<&str>) -> Option<String> {
        match incoming {
            Some(name) if !name.trim().is_empty() => Some(name.to_string()),
            _ => existing.map(|s| s.to_string()),
        }
    }
}

/// One tracking checkpoint in a shipment's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogisticHistory {
    pub logistic_id: Uuid,
    pub tracking_number: TrackingNumber,
    pub status: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LogisticHistory {
    /// Dedup key used before inserting: a checkpoint is a duplicate if it
    /// shares logistic id, tracking number, status, and timestamp with one
    /// already on file.
    pub fn dedup_key(&self) -> (Uuid, &str, &str, DateTime<Utc>) {
        (self.logistic_id, self.tracking_number.0.as_str(), self.status.as_str(), self.occurred_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_carrier_name_prefers_incoming_when_present() {
        assert_eq!(
            Logistic::merge_carrier_name(Some("OldCarrier"), Some("NewCarrier")),
            Some("NewCarrier".to_string())
        );
    }

    #[test]
    fn merge_carrier_name_preserves_existing_when_incoming_blank() {
        assert_eq!(
            Logistic::merge_carrier_name(Some("OldCarrier"), Some("")),
            Some("OldCarrier".to_string())
        );
        assert_eq!(Logistic::merge_carrier_name(Some("OldCarrier"), None), Some("OldCarrier".to_string()));
    }

    #[test]
    fn merge_carrier_name_none_when_both_absent() {
        assert_eq!(Logistic::merge_carrier_name(None, None), None);
    }

    #[test]
    fn dedup_key_distinguishes_on_every_field() {
        let base = LogisticHistory {
            logistic_id: Uuid::new_v4(),
            tracking_number: TrackingNumber("TN1".into()),
            status: "IN_TRANSIT".into(),
            description: None,
            occurred_at: Utc::now(),
        };
        let mut other = base.clone();
        other.status = "DELIVERED".into();
        assert_ne!(base.dedup_key(), other.dedup_key());
    }
}
