//! Shop (seller store) identity and token state.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A seller's store, joined to its owning company at read time.
#[derive(Debug, Clone)]
pub struct Shop {
    pub shop_key: Uuid,
    pub marketplace_shop_id: i64,
    pub marketplace_partner_id: i64,
    pub partner_key: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expire_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub deleted: bool,
    pub order_poll_window_minutes: i64,
    pub sandbox: bool,
    pub company_id: Uuid,
}

/// The tenant a shop belongs to. Read-only from the ingestion core's
/// perspective (provisioned by the operator side); carried because Order
/// rows reference `company_id` and because its `issandbox` column takes
/// precedence over the process-wide `SHOPEE_IS_SANDBOX` flag.
#[derive(Debug, Clone)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub issandbox: Option<bool>,
}

impl Shop {
    /// Resolve sandbox mode using the precedence described in SPEC_FULL.md §9:
    /// the company's `issandbox` column wins whenever it states an opinion;
    /// the process-wide flag is only a fallback for companies that don't
    /// carry the column. The two are never combined.
    pub fn effective_sandbox(company: &Company, process_flag: bool) -> bool {
        company.issandbox.unwrap_or(process_flag)
    }

    pub fn is_usable(&self) -> bool {
        self.active && !self.deleted && self.access_token.is_some()
    }

    pub fn needs_token_refresh(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        match (&self.access_token, self.token_expire_at) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(_), Some(expire_at)) => expire_at - now <= margin,
        }
    }
}
