//! HTTP handlers — literal glue over orchestrator/queue methods
//! (SPEC_FULL.md §6).

use axum::extract::{Path, State};
use serde::Serialize;
use serde_json::json;

use crate::queue::job::QueueName;

use super::response::ApiResponse;
use super::state::{resolve_marketplace_shop_id, AppState};

pub async fn health(State(state): State<AppState>) -> ApiResponse<serde_json::Value> {
    match state.db.health_check().await {
        Ok(()) => ApiResponse::ok(json!({ "status": "ok" })),
        Err(err) => {
            tracing::warn!(error = %err, "health check failed");
            ApiResponse { code: 1, msg: format!("database unavailable: {err}"), data: None }
        }
    }
}

#[derive(Serialize)]
struct QueueStatusEntry {
    queue: &'static str,
    ready: u64,
    delayed: u64,
}

pub async fn queue_status(State(state): State<AppState>) -> ApiResponse<Vec<QueueStatusEntry>> {
    let mut entries = Vec::new();
    for name in QueueName::ALL {
        match state.queue.depth(name).await {
            Ok(depth) => entries.push(QueueStatusEntry { queue: name.as_key(), ready: depth.ready, delayed: depth.delayed }),
            Err(err) => {
                tracing::warn!(error = %err, queue = name.as_key(), "failed to read queue depth");
            }
        }
    }
    ApiResponse::ok(entries)
}

pub async fn system_info() -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "git_hash": option_env!("GIT_HASH").unwrap_or("unknown"),
    }))
}

pub async fn collect_shop(State(state): State<AppState>, Path(shop_id): Path<i64>) -> ApiResponse<serde_json::Value> {
    let Some(shop_key) = resolve_marketplace_shop_id(&state.db, shop_id).await else {
        return ApiResponse { code: 404, msg: format!("shop {shop_id} not found"), data: None };
    };

    match state.orchestrator.run_for_shop(shop_key).await {
        Ok(stats) => ApiResponse::ok(json!({
            "total": stats.total,
            "success": stats.success,
            "failed": stats.failed,
            "order_sns": stats.order_sns,
        })),
        Err(err) => {
            tracing::error!(error = %err, shop_id, "direct order collection failed");
            ApiResponse { code: 1, msg: err.to_string(), data: None }
        }
    }
}

pub async fn get_order(State(state): State<AppState>, Path(order_id): Path<String>) -> ApiResponse<serde_json::Value> {
    let repo = crate::repository::OrderRepository::new();
    match repo.find_order_view(state.db.pool(), &order_id).await {
        Ok(Some(view)) => ApiResponse::ok(json!({
            "order_id": view.order_id,
            "order_num": view.order_num,
            "status": view.status,
            "action_status": view.action_status,
            "tracking_number": view.tracking_number,
            "carrier_name": view.carrier_name,
            "item_count": view.item_count,
        })),
        Ok(None) => ApiResponse { code: 404, msg: format!("order {order_id} not found"), data: None },
        Err(err) => {
            tracing::error!(error = %err, order_id, "order lookup failed");
            ApiResponse { code: 1, msg: err.to_string(), data: None }
        }
    }
}
