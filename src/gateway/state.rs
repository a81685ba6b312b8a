//! Shared application state handed to every handler, mirroring the
//! teacher's `AppState` pattern of many `Arc<...>` collaborators.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::Database;
use crate::orchestrator::Orchestrator;
use crate::queue::Queue;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<Queue>,
}

impl AppState {
    pub fn new(db: Database, orchestrator: Arc<Orchestrator>, queue: Arc<Queue>) -> Self {
        Self { db, orchestrator, queue }
    }
}

/// Resolves a path-supplied `shopId` (the marketplace identifier) into the
/// internal shop key the orchestrator expects.
pub async fn resolve_marketplace_shop_id(db: &Database, marketplace_shop_id: i64) -> Option<Uuid> {
    crate::repository::ShopRepository::new(db)
        .find_by_marketplace_shop_id(marketplace_shop_id)
        .await
        .ok()
        .map(|(shop, _)| shop.shop_key)
}
