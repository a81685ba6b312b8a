//! Thin operator-facing HTTP surface (SPEC_FULL.md §6). Business logic lives
//! in the orchestrator and queue; handlers here are literal glue, mirroring
//! the teacher's `ApiResponse<T>{code,msg,data}` envelope convention.

pub mod handlers;
pub mod response;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/queue/status", get(handlers::queue_status))
        .route("/system/info", get(handlers::system_info))
        .route("/order/collect/:shop_id", post(handlers::collect_shop))
        .route("/order/:order_id", get(handlers::get_order))
        .with_state(state)
}
