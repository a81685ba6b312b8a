//! Access-token refresh policy (SPEC_FULL.md §4.3).
//!
//! Refresh is guarded by a per-shop `tokio::sync::Mutex` held for the
//! duration of one orchestrator invocation — consistent with the
//! single-flight-per-shop invariant, this is a single-writer guard rather
//! than a distributed lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api_client::ShopeeClient;
use crate::config::constants::TOKEN_REFRESH_MARGIN;
use crate::domain::Shop;
use crate::repository::{ShopRepository, ShopRepositoryError};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("shop has no refresh token on file")]
    MissingRefreshToken,
    #[error("refresh call failed: {0}")]
    Api(#[from] crate::api_client::ApiError),
    #[error("failed to persist refreshed token: {0}")]
    Repository(#[from] ShopRepositoryError),
}

/// Tracks one mutex per shop so refreshes for different shops never block
/// each other, while two refreshes for the same shop serialize.
#[derive(Default)]
pub struct TokenManager {
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, shop_key: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(shop_key).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Ensure `shop` carries a non-expired access token, refreshing via the
    /// marketplace and persisting through `shop_repo` if needed. Returns the
    /// (possibly updated) shop.
    pub async fn ensure_fresh(
        &self,
        client: &ShopeeClient,
        shop_repo: &ShopRepository<'_>,
        mut shop: Shop,
    ) -> Result<Shop, TokenError> {
        let shop_lock = self.lock_for(shop.shop_key).await;
        let _guard = shop_lock.lock().await;

        let now = Utc::now();
        if !shop.needs_token_refresh(now, ChronoDuration::seconds(TOKEN_REFRESH_MARGIN.as_secs() as i64)) {
            return Ok(shop);
        }

        let refresh_token = shop.refresh_token.as_deref().ok_or(TokenError::MissingRefreshToken)?;
        let response = client.refresh_access_token(refresh_token, shop.marketplace_shop_id).await?;
        let expire_at = now + ChronoDuration::seconds(response.expire_in);

        shop_repo
            .update_tokens(shop.shop_key, &response.access_token, &response.refresh_token, expire_at)
            .await?;

        shop.access_token = Some(response.access_token);
        shop.refresh_token = Some(response.refresh_token);
        shop.token_expire_at = Some(expire_at);
        Ok(shop)
    }
}
