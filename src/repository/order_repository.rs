//! The transactional upsert protocol described in SPEC_FULL.md §4.5: order,
//! logistic, logistic history, and order item, all inside one transaction.
//!
//! Built on `sqlx`'s runtime-checked `query`/`query_as`, not the `query!`
//! macro, so the crate compiles without a live database connection — the one
//! place the teacher itself reaches for `query_as` to avoid a compile-time
//! schema dependency.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{FulfillmentFlag, OrderStatus, PackageNumber, TrackingNumber};

#[derive(Debug, thiserror::Error)]
pub enum OrderRepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertResult {
    pub order_id: Uuid,
}

/// A normalized order-detail record, ready to be written. Assembled by the
/// orchestrator from the wire DTOs in `api_client::types`.
pub struct UpsertOrder {
    pub order_num: String,
    pub status: OrderStatus,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub order_time: Option<DateTime<Utc>>,
    pub pay_time: Option<DateTime<Utc>>,
    pub ship_by_date: Option<DateTime<Utc>>,
    pub total_amount: Option<Decimal>,
    pub fulfillment_flag: Option<FulfillmentFlag>,
    pub cancel_by: Option<String>,
    pub cancel_reason: Option<String>,
    pub message_to_seller: Option<String>,
    pub carrier_name: Option<String>,
    pub items: Vec<UpsertItem>,
}

pub struct UpsertItem {
    pub item_id: i64,
    pub model_id: Option<i64>,
    pub sku: String,
    pub promo_sku: Option<String>,
    pub item_name: String,
    pub option: Option<String>,
    pub quantity: i32,
    pub unit_price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub weight: Decimal,
    pub image_url: Option<String>,
    pub package_number: Option<PackageNumber>,
}

/// Read-model row returned by [`OrderRepository::find_order_view`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    pub order_id: Uuid,
    pub order_num: String,
    pub status: String,
    pub action_status: String,
    pub tracking_number: Option<String>,
    pub carrier_name: Option<String>,
    pub item_count: i64,
}

#[derive(sqlx::FromRow)]
struct OrderViewRow {
    id: Uuid,
    order_num: String,
    status: String,
    action_status: String,
    tracking_number: Option<String>,
    carrier_name: Option<String>,
    item_count: i64,
}

impl OrderViewRow {
    fn into_view(self) -> OrderView {
        OrderView {
            order_id: self.id,
            order_num: self.order_num,
            status: self.status,
            action_status: self.action_status,
            tracking_number: self.tracking_number,
            carrier_name: self.carrier_name,
            item_count: self.item_count,
        }
    }
}

pub struct OrderRepository;

impl OrderRepository {
    pub fn new() -> Self {
        Self
    }

    /// Steps 1-3 and 5-6 of the upsert protocol: resolve/insert the order
    /// row, upsert its (possibly synthetic) logistic row, and wholesale
    /// rewrite its items. Does not touch logistic history or tracking
    /// numbers — see [`Self::apply_tracking_update`] for Step E/F writes.
    pub async fn upsert_order(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        input: &UpsertOrder,
        company_id: Uuid,
        marketplace_shop_id: i64,
    ) -> Result<UpsertResult, OrderRepositoryError> {
        let order_id = self.resolve_order_id(tx, &input.order_num).await?;
        self.upsert_order_row(tx, order_id, input, company_id, marketplace_shop_id).await?;
        let logistic_id = self.upsert_logistic_row(tx, order_id, input.carrier_name.as_deref()).await?;
        self.rewrite_items(tx, order_id, logistic_id, &input.items).await?;
        Ok(UpsertResult { order_id })
    }

    async fn resolve_order_id(&self, tx: &mut Transaction<'_, Postgres>, order_num: &str) -> Result<Uuid, OrderRepositoryError> {
        let existing: Option<(Uuid,)> = sqlx::query_as(
            r#"SELECT id FROM "order" WHERE platform = 'shopee' AND order_num = $1"#,
        )
        .bind(order_num)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(existing.map(|(id,)| id).unwrap_or_else(Uuid::new_v4))
    }

    async fn upsert_order_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        input: &UpsertOrder,
        company_id: Uuid,
        marketplace_shop_id: i64,
    ) -> Result<(), OrderRepositoryError> {
        let action_status = input.status.action_status().as_wire();
        let other_status = match &input.status {
            OrderStatus::Other(s) => s.as_str(),
            _ => "NONE",
        };
        let fulfillment_flag = input.fulfillment_flag.map(|f| f.as_db());

        sqlx::query(
            r#"
            INSERT INTO "order" (
                id, platform, order_num, status, action_status, other_status,
                country, currency, order_time, pay_time, ship_by_date, total_amount,
                company_id, marketplace_shop_id, fulfillment_flag, cancel_by,
                cancel_reason, message_to_seller, created_at, updated_at
            ) VALUES (
                $1, 'shopee', $2, $3, $4, $5,
                $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15,
                $16, $17, now(), now()
            )
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                action_status = EXCLUDED.action_status,
                other_status = EXCLUDED.other_status,
                ship_by_date = EXCLUDED.ship_by_date,
                total_amount = EXCLUDED.total_amount,
                cancel_by = EXCLUDED.cancel_by,
                cancel_reason = EXCLUDED.cancel_reason,
                fulfillment_flag = EXCLUDED.fulfillment_flag,
                message_to_seller = EXCLUDED.message_to_seller,
                updated_at = now()
            "#,
        )
        .bind(order_id)
        .bind(&input.order_num)
        .bind(input.status.as_wire())
        .bind(action_status)
        .bind(other_status)
        .bind(&input.country)
        .bind(&input.currency)
        .bind(input.order_time)
        .bind(input.pay_time)
        .bind(input.ship_by_date)
        .bind(input.total_amount)
        .bind(company_id)
        .bind(marketplace_shop_id)
        .bind(fulfillment_flag)
        .bind(&input.cancel_by)
        .bind(&input.cancel_reason)
        .bind(&input.message_to_seller)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Upsert the 1:1 logistic row, preserving a pre-existing non-empty
    /// carrier name when the incoming value is null or blank, and inserting
    /// a synthetic empty row when no logistic row exists yet so OrderItem
    /// foreign keys resolve.
    async fn upsert_logistic_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        carrier_name: Option<&str>,
    ) -> Result<Uuid, OrderRepositoryError> {
        let existing: Option<(Uuid, Option<String>)> =
            sqlx::query_as("SELECT id, carrier_name FROM logistic WHERE toms_order_id = $1")
                .bind(order_id)
                .fetch_optional(&mut **tx)
                .await?;

        match existing {
            Some((logistic_id, existing_name)) => {
                let resolved_name = crate::domain::logistic::Logistic::merge_carrier_name(
                    existing_name.as_deref(),
                    carrier_name,
                );
                sqlx::query("UPDATE logistic SET carrier_name = $1, updated_at = now() WHERE id = $2")
                    .bind(resolved_name)
                    .bind(logistic_id)
                    .execute(&mut **tx)
                    .await?;
                Ok(logistic_id)
            }
            None => {
                let logistic_id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO logistic (id, toms_order_id, carrier_name, created_at, updated_at) VALUES ($1, $2, $3, now(), now())",
                )
                .bind(logistic_id)
                .bind(order_id)
                .bind(carrier_name)
                .execute(&mut **tx)
                .await?;
                Ok(logistic_id)
            }
        }
    }

    /// Delete every existing item for the order then insert the new set in
    /// positional order — items are always wholesale-replaced, never merged.
    async fn rewrite_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        logistic_id: Uuid,
        items: &[UpsertItem],
    ) -> Result<(), OrderRepositoryError> {
        sqlx::query("DELETE FROM order_item WHERE toms_order_id = $1")
            .bind(order_id)
            .execute(&mut **tx)
            .await?;

        for (index, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_item (
                    id, toms_order_id, toms_logistic_id, item_id, model_id, sku, promo_sku,
                    item_name, option_name, quantity, unit_price, original_price, weight,
                    image_url, package_number, index, created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, now(), now())
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(order_id)
            .bind(logistic_id)
            .bind(item.item_id)
            .bind(item.model_id)
            .bind(&item.sku)
            .bind(&item.promo_sku)
            .bind(&item.item_name)
            .bind(&item.option)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.original_price)
            .bind(item.weight)
            .bind(&item.image_url)
            .bind(item.package_number.as_ref().map(|p| p.0.as_str()))
            .bind(index as i32)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Step E/F: write a reconciled tracking number onto the logistic row
    /// and every item, and transition the order to SHIPPED if it was not
    /// already SHIPPED/COMPLETED. Carrier name preservation uses the same
    /// merge rule as [`Self::upsert_logistic_row`]. Returns the logistic id
    /// so the caller can append a history checkpoint via
    /// [`Self::insert_history_if_absent`]; `None` means no logistic row
    /// existed to update (should not happen once `upsert_order` has run).
    pub async fn apply_tracking_update(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        tracking_number: &TrackingNumber,
        carrier_name: Option<&str>,
        order_was_shipped_or_completed: bool,
    ) -> Result<Option<Uuid>, OrderRepositoryError> {
        let existing: Option<(Uuid, Option<String>)> =
            sqlx::query_as("SELECT id, carrier_name FROM logistic WHERE toms_order_id = $1")
                .bind(order_id)
                .fetch_optional(&mut **tx)
                .await?;

        let Some((logistic_id, existing_name)) = existing else {
            return Ok(None);
        };
        let resolved_name =
            crate::domain::logistic::Logistic::merge_carrier_name(existing_name.as_deref(), carrier_name);

        sqlx::query("UPDATE logistic SET tracking_number = $1, carrier_name = $2, updated_at = now() WHERE id = $3")
            .bind(&tracking_number.0)
            .bind(resolved_name)
            .bind(logistic_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query("UPDATE order_item SET tracking_number = $1, updated_at = now() WHERE toms_order_id = $2")
            .bind(&tracking_number.0)
            .bind(order_id)
            .execute(&mut **tx)
            .await?;

        if !order_was_shipped_or_completed {
            sqlx::query(
                r#"UPDATE "order" SET status = 'SHIPPED', action_status = 'EXPORTED', updated_at = now() WHERE id = $1"#,
            )
            .bind(order_id)
            .execute(&mut **tx)
            .await?;
        }

        Ok(Some(logistic_id))
    }

    /// Insert a tracking-history checkpoint unless a duplicate (logistic id,
    /// tracking number, status, occurred_at) already exists.
    pub async fn insert_history_if_absent(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        logistic_id: Uuid,
        tracking_number: &TrackingNumber,
        status: &str,
        description: Option<&str>,
        occurred_at: DateTime<Utc>,
    ) -> Result<(), OrderRepositoryError> {
        let exists: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM logistic_history WHERE toms_logistic_id = $1 AND tracking_number = $2 AND status = $3 AND occurred_at = $4",
        )
        .bind(logistic_id)
        .bind(&tracking_number.0)
        .bind(status)
        .bind(occurred_at)
        .fetch_optional(&mut **tx)
        .await?;

        if exists.is_some() {
            sqlx::query("UPDATE logistic_history SET description = $1, updated_at = now() WHERE toms_logistic_id = $2 AND tracking_number = $3 AND status = $4 AND occurred_at = $5")
                .bind(description)
                .bind(logistic_id)
                .bind(&tracking_number.0)
                .bind(status)
                .bind(occurred_at)
                .execute(&mut **tx)
                .await?;
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO logistic_history (id, toms_logistic_id, tracking_number, status, description, occurred_at, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, now(), now())",
        )
        .bind(Uuid::new_v4())
        .bind(logistic_id)
        .bind(&tracking_number.0)
        .bind(status)
        .bind(description)
        .bind(occurred_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Step F shape (a) write: set the carrier name without touching the
    /// tracking number, preserving any pre-existing non-empty name.
    pub async fn update_carrier_only(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        carrier_name: &str,
    ) -> Result<(), OrderRepositoryError> {
        let existing: Option<(Uuid, Option<String>)> =
            sqlx::query_as("SELECT id, carrier_name FROM logistic WHERE toms_order_id = $1")
                .bind(order_id)
                .fetch_optional(&mut **tx)
                .await?;
        let Some((logistic_id, existing_name)) = existing else { return Ok(()) };
        let resolved_name =
            crate::domain::logistic::Logistic::merge_carrier_name(existing_name.as_deref(), Some(carrier_name));
        sqlx::query("UPDATE logistic SET carrier_name = $1, updated_at = now() WHERE id = $2")
            .bind(resolved_name)
            .bind(logistic_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Read-model projection for the `GET /order/:orderId` operator
    /// endpoint: accepts either the surrogate UUID or the marketplace
    /// order number.
    pub async fn find_order_view(
        &self,
        pool: &sqlx::PgPool,
        id_or_number: &str,
    ) -> Result<Option<OrderView>, OrderRepositoryError> {
        let by_uuid = Uuid::parse_str(id_or_number).ok();
        let row: Option<OrderViewRow> = sqlx::query_as(
            r#"
            SELECT o.id, o.order_num, o.status, o.action_status, l.tracking_number, l.carrier_name,
                   (SELECT count(*) FROM order_item oi WHERE oi.toms_order_id = o.id) AS item_count
            FROM "order" o
            LEFT JOIN logistic l ON l.toms_order_id = o.id
            WHERE o.id = $1 OR o.order_num = $2
            "#,
        )
        .bind(by_uuid)
        .bind(id_or_number)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(OrderViewRow::into_view))
    }

    /// Current tracking number on file for an order's logistic row, used to
    /// decide whether a freshly fetched value actually changes anything
    /// (Step E idempotence, SPEC_FULL.md §8 property 6).
    pub async fn current_tracking_number(
        &self,
        pool: &sqlx::PgPool,
        order_id: Uuid,
    ) -> Result<Option<String>, OrderRepositoryError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT tracking_number FROM logistic WHERE toms_order_id = $1")
                .bind(order_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.and_then(|(t,)| t))
    }

    /// Step F shape (a): tracking present, carrier missing.
    pub async fn find_missing_carrier(
        &self,
        pool: &sqlx::PgPool,
        marketplace_shop_id: i64,
        limit: i64,
    ) -> Result<Vec<(Uuid, String)>, OrderRepositoryError> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT o.id, o.order_num FROM "order" o
            JOIN logistic l ON l.toms_order_id = o.id
            WHERE o.marketplace_shop_id = $1
              AND l.tracking_number IS NOT NULL AND l.tracking_number != ''
              AND (l.carrier_name IS NULL OR l.carrier_name = '')
            LIMIT $2
            "#,
        )
        .bind(marketplace_shop_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Step F shape (b): carrier present, tracking missing.
    pub async fn find_missing_tracking(
        &self,
        pool: &sqlx::PgPool,
        marketplace_shop_id: i64,
        limit: i64,
    ) -> Result<Vec<(Uuid, String)>, OrderRepositoryError> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT o.id, o.order_num FROM "order" o
            JOIN logistic l ON l.toms_order_id = o.id
            WHERE o.marketplace_shop_id = $1
              AND l.carrier_name IS NOT NULL AND l.carrier_name != ''
              AND (l.tracking_number IS NULL OR l.tracking_number = '')
            LIMIT $2
            "#,
        )
        .bind(marketplace_shop_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }
}

impl Default for OrderRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_status_defaults_to_none_for_known_statuses() {
        let status = OrderStatus::ReadyToShip;
        let other_status = match &status {
            OrderStatus::Other(s) => s.as_str(),
            _ => "NONE",
        };
        assert_eq!(other_status, "NONE");
    }

    #[test]
    fn other_status_carries_raw_value_for_unknown_statuses() {
        let status = OrderStatus::from_wire("SOME_NEW_STATUS");
        let other_status = match &status {
            OrderStatus::Other(s) => s.as_str(),
            _ => "NONE",
        };
        assert_eq!(other_status, "SOME_NEW_STATUS");
    }
}
