//! Loads active shops joined to their company, and persists refreshed
//! tokens. Built on the runtime-checked `sqlx::query_as` API rather than the
//! `query!` macro, so the crate compiles without a live database connection.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::Database;
use crate::domain::{Company, Shop};

#[derive(Debug, thiserror::Error)]
pub enum ShopRepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("shop {0} not found")]
    NotFound(Uuid),
}

#[derive(FromRow)]
struct ShopRow {
    shop_key: Uuid,
    marketplace_shop_id: i64,
    marketplace_partner_id: i64,
    partner_key: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expire_at: Option<DateTime<Utc>>,
    active: bool,
    deleted: bool,
    order_poll_window_minutes: i64,
    sandbox: bool,
    company_id: Uuid,
    company_name: String,
    company_issandbox: Option<bool>,
}

impl ShopRow {
    fn into_domain(self) -> (Shop, Company) {
        let shop = Shop {
            shop_key: self.shop_key,
            marketplace_shop_id: self.marketplace_shop_id,
            marketplace_partner_id: self.marketplace_partner_id,
            partner_key: self.partner_key,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_expire_at: self.token_expire_at,
            active: self.active,
            deleted: self.deleted,
            order_poll_window_minutes: self.order_poll_window_minutes,
            sandbox: self.sandbox,
            company_id: self.company_id,
        };
        let company = Company { id: self.company_id, name: self.company_name, issandbox: self.company_issandbox };
        (shop, company)
    }
}

const SELECT_SHOP_JOIN_COMPANY: &str = r#"
SELECT
    s.shop_key, s.marketplace_shop_id, s.marketplace_partner_id, s.partner_key,
    s.access_token, s.refresh_token, s.token_expire_at, s.active, s.deleted,
    s.order_poll_window_minutes, s.sandbox, s.company_id,
    c.name AS company_name, c.issandbox AS company_issandbox
FROM shop s
JOIN company c ON c.id = s.company_id
"#;

pub struct ShopRepository<'a> {
    db: &'a Database,
}

impl<'a> ShopRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// All shops eligible for scheduling: active, not deleted, with a
    /// present access token.
    pub async fn load_active_shops(&self) -> Result<Vec<(Shop, Company)>, ShopRepositoryError> {
        let sql = format!(
            "{SELECT_SHOP_JOIN_COMPANY} WHERE s.active = true AND s.deleted = false AND s.access_token IS NOT NULL"
        );
        let rows: Vec<ShopRow> = sqlx::query_as(&sql).fetch_all(self.db.pool()).await?;
        Ok(rows.into_iter().map(ShopRow::into_domain).collect())
    }

    pub async fn find_by_key(&self, shop_key: Uuid) -> Result<(Shop, Company), ShopRepositoryError> {
        let sql = format!("{SELECT_SHOP_JOIN_COMPANY} WHERE s.shop_key = $1");
        let row: Option<ShopRow> = sqlx::query_as(&sql)
            .bind(shop_key)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(ShopRow::into_domain).ok_or(ShopRepositoryError::NotFound(shop_key))
    }

    pub async fn find_by_marketplace_shop_id(&self, marketplace_shop_id: i64) -> Result<(Shop, Company), ShopRepositoryError> {
        let sql = format!("{SELECT_SHOP_JOIN_COMPANY} WHERE s.marketplace_shop_id = $1");
        let row: Option<ShopRow> = sqlx::query_as(&sql)
            .bind(marketplace_shop_id)
            .fetch_optional(self.db.pool())
            .await?;
        row.map(ShopRow::into_domain)
            .ok_or_else(|| ShopRepositoryError::NotFound(Uuid::nil()))
    }

    /// Persist a refreshed access/refresh token pair and new expiry.
    pub async fn update_tokens(
        &self,
        shop_key: Uuid,
        access_token: &str,
        refresh_token: &str,
        expire_at: DateTime<Utc>,
    ) -> Result<(), ShopRepositoryError> {
        sqlx::query(
            "UPDATE shop SET access_token = $1, refresh_token = $2, token_expire_at = $3, updated_at = now() WHERE shop_key = $4",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expire_at)
        .bind(shop_key)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}
