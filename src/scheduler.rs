//! Cron-driven fan-out of per-shop collection jobs (SPEC_FULL.md §4.7).
//!
//! Computes the next wakeup from a cron expression and sleeps until it via
//! `tokio::time::sleep_until`, the same "compute next wakeup, sleep, act,
//! repeat" shape as the teacher's poll loop, just cron-paced.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cron::Schedule;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::Shop;
use crate::queue::job::JobPayload;
use crate::queue::{Queue, QueueError};
use crate::repository::{ShopRepository, ShopRepositoryError};
use crate::db::Database;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("invalid cron expression {0:?}: {1}")]
    InvalidCron(String, String),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("shop repository error: {0}")]
    Shop(#[from] ShopRepositoryError),
}

pub struct OrderScheduler {
    schedule: Schedule,
    db: Database,
    queue: Arc<Queue>,
    process_sandbox: bool,
    running: AtomicBool,
    current_jobs: Mutex<HashSet<i64>>,
}

impl OrderScheduler {
    pub fn new(cron_expression: &str, db: Database, queue: Arc<Queue>, process_sandbox: bool) -> Result<Self, SchedulerError> {
        let schedule = Schedule::from_str(cron_expression)
            .map_err(|e| SchedulerError::InvalidCron(cron_expression.to_string(), e.to_string()))?;
        Ok(Self {
            schedule,
            db,
            queue,
            process_sandbox,
            running: AtomicBool::new(false),
            current_jobs: Mutex::new(HashSet::new()),
        })
    }

    /// Runs until `cancel` is triggered: one immediate pass at startup, then
    /// one pass per cron tick.
    pub async fn run(&self, cancel: CancellationToken) {
        self.tick().await;

        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                tracing::error!("cron schedule produced no upcoming occurrence, stopping scheduler");
                return;
            };
            let now = Utc::now();
            let sleep_for = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            let deadline = tokio::time::Instant::now() + sleep_for;

            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => self.tick().await,
                _ = cancel.cancelled() => {
                    tracing::info!("scheduler received shutdown signal");
                    return;
                }
            }
        }
    }

    /// One scheduling pass: if a previous pass is still running, skip
    /// (single-flight across the whole fan-out, not just per-shop).
    async fn tick(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("scheduler tick skipped: previous pass still running");
            return;
        }

        if let Err(err) = self.fan_out().await {
            tracing::error!(error = %err, "scheduler fan-out failed");
        }

        self.running.store(false, Ordering::SeqCst);
    }

    async fn fan_out(&self) -> Result<(), SchedulerError> {
        let shop_repo = ShopRepository::new(&self.db);
        let shops = shop_repo.load_active_shops().await?;

        let mut current = self.current_jobs.lock().await;
        for (shop, company) in shops {
            if Shop::effective_sandbox(&company, self.process_sandbox) != self.process_sandbox {
                continue; // this shop's marketplace mode doesn't match the runtime's
            }
            if !current.insert(shop.marketplace_shop_id) {
                continue; // a job for this shop is already in flight
            }
            self.queue
                .enqueue(JobPayload::CollectShopOrders { shop_key: shop.shop_key }, 0)
                .await?;
        }
        Ok(())
    }

    /// Called by the worker after a `collect-shop-orders` job completes, so
    /// the shop can be scheduled again on the next tick.
    pub async fn release(&self, marketplace_shop_id: i64) {
        self.current_jobs.lock().await.remove(&marketplace_shop_id);
    }
}
