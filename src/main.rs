//! Process entrypoint: wires config, logging, database, queue, scheduler,
//! worker pool, and the operator HTTP surface together, and drains
//! cooperatively on SIGINT/SIGTERM (SPEC_FULL.md §5).

use std::sync::Arc;

use shopee_order_sync::api_client::transport::ReqwestTransport;
use shopee_order_sync::api_client::ShopeeClient;
use shopee_order_sync::config::{constants, AppConfig};
use shopee_order_sync::db::Database;
use shopee_order_sync::gateway::{router, AppState};
use shopee_order_sync::logging;
use shopee_order_sync::orchestrator::Orchestrator;
use shopee_order_sync::queue::Queue;
use shopee_order_sync::scheduler::OrderScheduler;
use shopee_order_sync::token_manager::TokenManager;
use shopee_order_sync::worker::WorkerPool;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let _logging_guard = logging::init_logging(&config.logging);

    tracing::info!(
        cluster_enabled = config.cluster.enabled,
        job_concurrency = config.shopee.job_concurrency,
        "shopee-order-sync starting"
    );

    let db = Database::connect(&config.database).await?;
    let queue = Arc::new(Queue::connect(&config.redis.connection_url()).await?);

    let transport = Arc::new(ReqwestTransport::new()?);
    let base_url = ShopeeClient::base_url_for(config.shopee.is_sandbox);
    let client = ShopeeClient::new(transport, base_url, config.shopee.partner_id, config.shopee.partner_key.clone());

    let token_manager = Arc::new(TokenManager::new());
    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        client,
        config.shopee.is_sandbox,
        token_manager,
        config.shopee.max_retry_count,
        config.shopee.order_batch_size,
    ));

    let scheduler = Arc::new(OrderScheduler::new(
        &config.scheduler.cron_expression,
        db.clone(),
        queue.clone(),
        config.shopee.is_sandbox,
    )?);
    let worker_pool = WorkerPool::new(db.clone(), queue.clone(), orchestrator.clone(), scheduler.clone(), config.shopee.job_concurrency);

    let cancel = CancellationToken::new();

    let scheduler_handle = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.run(cancel).await })
    };

    let worker_handle = {
        let cancel = cancel.clone();
        tokio::spawn(async move { worker_pool.run(cancel).await })
    };

    let app = router(AppState::new(db, orchestrator, queue));
    let listener = tokio::net::TcpListener::bind((config.http.host.as_str(), config.http.port)).await?;
    tracing::info!(host = %config.http.host, port = config.http.port, "operator HTTP surface listening");

    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining");
    cancel.cancel();

    let _ = tokio::time::timeout(constants::SHUTDOWN_DRAIN_TIMEOUT, async {
        let _ = scheduler_handle.await;
        let _ = worker_handle.await;
        let _ = server_handle.await;
    })
    .await;

    tracing::info!("shutdown complete");
    Ok(())
}
