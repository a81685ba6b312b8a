//! Per-shop ingestion pipeline (SPEC_FULL.md §4.4): list → detail → persist
//! → reconcile tracking → fix incomplete rows.

pub mod stats;

use std::sync::Arc;

use chrono::Utc;
use tokio::time::sleep;
use uuid::Uuid;

use crate::api_client::{AuthContext, ShopeeClient};
use crate::config::constants;
use crate::db::Database;
use crate::domain::{FulfillmentFlag, OrderStatus, PackageNumber, Shop, TrackingNumber};
use crate::repository::order_repository::{OrderRepository, UpsertItem, UpsertOrder};
use crate::repository::{ShopRepository, ShopRepositoryError};
use crate::token_manager::{TokenError, TokenManager};
use stats::Stats;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("config error: {0}")]
    Config(String),
    #[error("token error: {0}")]
    Token(#[from] TokenError),
    #[error("api error: {0}")]
    Api(#[from] crate::api_client::ApiError),
    #[error("repository error: {0}")]
    Repository(#[from] crate::repository::OrderRepositoryError),
    #[error("shop lookup error: {0}")]
    Shop(#[from] ShopRepositoryError),
}

pub struct Orchestrator {
    db: Database,
    client: ShopeeClient,
    process_sandbox: bool,
    order_repo: OrderRepository,
    token_manager: Arc<TokenManager>,
    max_retry_count: u32,
    order_batch_size: usize,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        client: ShopeeClient,
        process_sandbox: bool,
        token_manager: Arc<TokenManager>,
        max_retry_count: u32,
        order_batch_size: usize,
    ) -> Self {
        Self {
            db,
            client,
            process_sandbox,
            order_repo: OrderRepository::new(),
            token_manager,
            max_retry_count,
            order_batch_size,
        }
    }

    /// The single entry point for both the queued worker path and the
    /// direct (non-queued) HTTP path — SPEC_FULL.md §4.9. Both paths call
    /// exactly this method, so persisted state cannot drift between them.
    pub async fn run_for_shop(&self, shop_key: Uuid) -> Result<Stats, OrchestratorError> {
        let shop_repo = ShopRepository::new(&self.db);

        // Step A: validate shop + company.
        let (shop, company) = shop_repo.find_by_key(shop_key).await?;
        if shop.deleted || !shop.active {
            return Err(OrchestratorError::Config(format!("shop {shop_key} is inactive or deleted")));
        }
        if shop.partner_key.is_empty() {
            return Err(OrchestratorError::Config(format!("shop {shop_key} has no partner key")));
        }
        let company_id = company.id;
        let effective_sandbox = Shop::effective_sandbox(&company, self.process_sandbox);
        let client = self.client.with_base_url(ShopeeClient::base_url_for(effective_sandbox));

        let shop = self.token_manager.ensure_fresh(&client, &shop_repo, shop).await?;
        let access_token = shop.access_token.as_deref().ok_or_else(|| {
            OrchestratorError::Config(format!("shop {shop_key} has no access token after refresh"))
        })?;
        let auth = AuthContext { access_token: Some(access_token), shop_id: Some(shop.marketplace_shop_id) };

        // Step B: time window.
        let now = Utc::now().timestamp();
        let time_from = now - 3600;
        let time_to = now + 24 * 3600;

        // Step C: list orders, with retry scoped to this step only.
        let order_sns = self.list_all_orders(&client, &auth, time_from, time_to).await?;
        let mut stats = Stats::default();
        if order_sns.is_empty() {
            return Ok(stats);
        }

        // Step D: fan out detail/shipment processing.
        let mut persisted: Vec<(Uuid, String, OrderStatus)> = Vec::new();
        for batch in order_sns.chunks(self.order_batch_size) {
            self.process_detail_batch(&client, &auth, batch, company_id, shop.marketplace_shop_id, &mut stats, &mut persisted)
                .await;
            sleep(constants::BATCH_PACING).await;
        }

        // Step E: reconcile tracking numbers for eligible orders.
        let eligible: Vec<_> = persisted.iter().filter(|(_, _, status)| status.may_have_tracking()).collect();
        for sub_batch in eligible.chunks(constants::TRACKING_SAVE_SUBBATCH) {
            for (order_id, order_sn, status) in sub_batch {
                self.reconcile_tracking(&client, &auth, *order_id, order_sn, status).await;
                sleep(constants::TRACKING_PACING).await;
            }
        }

        // Step F: fix incomplete rows.
        self.fix_incomplete_rows(&client, &auth, shop.marketplace_shop_id).await;

        Ok(stats)
    }

    async fn list_all_orders(
        &self,
        client: &ShopeeClient,
        auth: &AuthContext<'_>,
        time_from: i64,
        time_to: i64,
    ) -> Result<Vec<String>, OrchestratorError> {
        let mut order_sns = Vec::new();
        let mut cursor = String::new();
        loop {
            let response = self.list_orders_with_retry(client, auth, time_from, time_to, &cursor).await?;
            order_sns.extend(response.order_list.into_iter().map(|o| o.order_sn));
            if !response.more || response.next_cursor.is_empty() {
                break;
            }
            cursor = response.next_cursor;
        }
        Ok(order_sns)
    }

    async fn list_orders_with_retry(
        &self,
        client: &ShopeeClient,
        auth: &AuthContext<'_>,
        time_from: i64,
        time_to: i64,
        cursor: &str,
    ) -> Result<crate::api_client::types::OrderListResponse, OrchestratorError> {
        let mut attempt = 0;
        loop {
            match client.get_order_list(*auth, time_from, time_to, cursor).await {
                Ok(response) => return Ok(response),
                Err(err) if attempt < self.max_retry_count && !err.is_fatal_for_shop() => {
                    let backoff = constants::RETRY_INITIAL_BACKOFF * 2u32.pow(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "get_order_list failed, retrying");
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn process_detail_batch(
        &self,
        client: &ShopeeClient,
        auth: &AuthContext<'_>,
        batch: &[String],
        company_id: Uuid,
        marketplace_shop_id: i64,
        stats: &mut Stats,
        persisted: &mut Vec<(Uuid, String, OrderStatus)>,
    ) {
        let response = match client.get_order_detail(*auth, batch).await {
            Ok(r) => r,
            Err(err) => {
                tracing::warn!(error = %err, batch_size = batch.len(), "get_order_detail failed for batch");
                for _ in batch {
                    stats.record_failure();
                }
                return;
            }
        };

        for detail in response.order_list {
            let order_sn = detail.order_sn.clone();
            match self.persist_order_detail(&detail, company_id, marketplace_shop_id).await {
                Ok(order_id) => {
                    stats.record_success(order_sn.clone());
                    let status = OrderStatus::from_wire(&detail.order_status);
                    persisted.push((order_id, order_sn, status));
                }
                Err(err) => {
                    tracing::warn!(order_sn = %order_sn, error = %err, "failed to persist order detail");
                    stats.record_failure();
                }
            }
        }
    }

    async fn persist_order_detail(
        &self,
        detail: &crate::api_client::types::OrderDetail,
        company_id: Uuid,
        marketplace_shop_id: i64,
    ) -> Result<Uuid, OrchestratorError> {
        let status = OrderStatus::from_wire(&detail.order_status);
        let items = detail
            .item_list
            .iter()
            .map(|item| UpsertItem {
                item_id: item.item_id,
                model_id: item.model_id,
                sku: crate::domain::item::OrderItem::resolve_sku(item.model_sku.as_deref(), item.item_id),
                promo_sku: item.promo_sku.clone(),
                item_name: item.item_name.clone().unwrap_or_default(),
                option: item.model_name.clone(),
                quantity: item.model_quantity_purchased.unwrap_or(0),
                unit_price: item
                    .model_discounted_price
                    .as_deref()
                    .and_then(|p| p.parse().ok()),
                original_price: item
                    .model_original_price
                    .as_deref()
                    .and_then(|p| p.parse().ok()),
                weight: item
                    .weight
                    .as_deref()
                    .and_then(|w| w.parse().ok())
                    .unwrap_or_default(),
                image_url: item.image_info.as_ref().and_then(|img| img.image_url.clone()),
                package_number: detail
                    .package_list
                    .first()
                    .and_then(|p| p.package_number.clone())
                    .map(PackageNumber),
            })
            .collect();

        let input = UpsertOrder {
            order_num: detail.order_sn.clone(),
            status,
            country: detail.region.clone(),
            currency: detail.currency.clone(),
            order_time: detail.create_time.and_then(crate::domain::order::epoch_seconds_to_datetime),
            pay_time: detail.pay_time.and_then(crate::domain::order::epoch_seconds_to_datetime),
            ship_by_date: detail.ship_by_date.and_then(crate::domain::order::epoch_seconds_to_datetime),
            total_amount: detail.total_amount.as_deref().and_then(|a| a.parse().ok()),
            fulfillment_flag: detail.fulfillment_flag.as_deref().and_then(FulfillmentFlag::from_wire),
            cancel_by: detail.cancel_by.clone(),
            cancel_reason: detail.cancel_reason.clone(),
            message_to_seller: detail.message_to_seller.clone(),
            carrier_name: detail.shipping_carrier_priority().map(String::from),
            items,
        };

        let mut tx = self.db.pool().begin().await.map_err(crate::repository::OrderRepositoryError::from)?;
        let result = self.order_repo.upsert_order(&mut tx, &input, company_id, marketplace_shop_id).await?;
        tx.commit().await.map_err(crate::repository::OrderRepositoryError::from)?;
        Ok(result.order_id)
    }

    async fn reconcile_tracking(&self, client: &ShopeeClient, auth: &AuthContext<'_>, order_id: Uuid, order_sn: &str, status: &OrderStatus) {
        let current = match self.order_repo.current_tracking_number(self.db.pool(), order_id).await {
            Ok(t) => t,
            Err(err) => {
                tracing::warn!(%order_sn, error = %err, "failed to read current tracking number");
                return;
            }
        };

        let fetch = tokio::time::timeout(
            constants::TRACKING_REQUEST_TIMEOUT,
            client.get_tracking_number(*auth, order_sn, None),
        )
        .await;

        let response = match fetch {
            Ok(Ok(r)) => r,
            Ok(Err(err)) => {
                tracing::warn!(%order_sn, error = %err, "get_tracking_number failed");
                return;
            }
            Err(_) => {
                tracing::warn!(%order_sn, "get_tracking_number timed out");
                return;
            }
        };

        let Some(tracking) = response.tracking_number_priority() else { return };
        if current.as_deref() == Some(tracking) {
            return; // property 6: no write when unchanged
        }
        let tracking_number = TrackingNumber(tracking.to_string());

        let (carrier, status_label, description, occurred_at) = match client.get_detailed_tracking_info(*auth, tracking).await {
            Ok(info) => (
                info.carrier_name_priority().map(String::from),
                info.logistics_status.clone().unwrap_or_else(|| "SHIPPED".to_string()),
                info.description.clone(),
                info.update_time
                    .and_then(crate::domain::order::epoch_seconds_to_datetime)
                    .unwrap_or_else(Utc::now),
            ),
            Err(err) => {
                tracing::warn!(%order_sn, error = %err, "get_detailed_tracking_info failed");
                (None, "SHIPPED".to_string(), None, Utc::now())
            }
        };

        let was_shipped = status.is_shipped_or_completed();
        let mut tx = match self.db.pool().begin().await {
            Ok(tx) => tx,
            Err(err) => {
                tracing::warn!(%order_sn, error = %err, "failed to begin tracking update transaction");
                return;
            }
        };
        let logistic_id = match self
            .order_repo
            .apply_tracking_update(&mut tx, order_id, &tracking_number, carrier.as_deref(), was_shipped)
            .await
        {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%order_sn, error = %err, "failed to apply tracking update");
                return;
            }
        };
        if let Some(logistic_id) = logistic_id {
            if let Err(err) = self
                .order_repo
                .insert_history_if_absent(&mut tx, logistic_id, &tracking_number, &status_label, description.as_deref(), occurred_at)
                .await
            {
                tracing::warn!(%order_sn, error = %err, "failed to append logistic history");
                return;
            }
        }
        if let Err(err) = tx.commit().await {
            tracing::warn!(%order_sn, error = %err, "failed to commit tracking update");
        }
    }

    async fn fix_incomplete_rows(&self, client: &ShopeeClient, auth: &AuthContext<'_>, marketplace_shop_id: i64) {
        if let Ok(rows) = self
            .order_repo
            .find_missing_carrier(self.db.pool(), marketplace_shop_id, constants::INCOMPLETE_ROWS_LIMIT)
            .await
        {
            for (order_id, order_sn) in rows {
                if let Ok(detail_response) = client.get_order_detail(*auth, std::slice::from_ref(&order_sn)).await {
                    if let Some(detail) = detail_response.order_list.first() {
                        if let Some(carrier) = detail.shipping_carrier_priority() {
                            let _ = self.update_carrier_only(order_id, carrier).await;
                        }
                    }
                }
            }
        }

        if let Ok(rows) = self
            .order_repo
            .find_missing_tracking(self.db.pool(), marketplace_shop_id, constants::INCOMPLETE_ROWS_LIMIT)
            .await
        {
            for (order_id, order_sn) in rows {
                self.reconcile_tracking(client, auth, order_id, &order_sn, &OrderStatus::Processed).await;
            }
        }
    }

    async fn update_carrier_only(&self, order_id: Uuid, carrier: &str) -> Result<(), OrchestratorError> {
        let mut tx = self.db.pool().begin().await.map_err(crate::repository::OrderRepositoryError::from)?;
        self.order_repo.update_carrier_only(&mut tx, order_id, carrier).await?;
        tx.commit().await.map_err(crate::repository::OrderRepositoryError::from)?;
        Ok(())
    }
}
