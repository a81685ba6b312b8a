//! Redis-backed durable job queue (SPEC_FULL.md §4.6).
//!
//! Four logical queues, each represented by a delayed sorted set (score =
//! next-eligible epoch-ms) and a ready sorted set (score = priority, lower
//! pops first), with a Lua script moving due jobs from one to the other
//! atomically — the same "durable primitive built on a keyed store" shape
//! as the teacher's WAL/cursor bookkeeping, just backed by Redis instead of
//! Postgres.

pub mod job;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use job::{Job, JobPayload, QueueName};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("job payload could not be serialized: {0}")]
    Encode(#[from] serde_json::Error),
}

fn delayed_key(name: QueueName) -> String {
    format!("queue:{}:delayed", name.as_key())
}

fn ready_key(name: QueueName) -> String {
    format!("queue:{}:ready", name.as_key())
}

fn dedup_key(name: QueueName) -> String {
    format!("queue:{}:dedup", name.as_key())
}

fn completed_key(name: QueueName) -> String {
    format!("queue:{}:completed", name.as_key())
}

fn failed_key(name: QueueName) -> String {
    format!("queue:{}:failed", name.as_key())
}

const RETENTION_CAP: isize = 1000;

/// Atomically moves due jobs (score <= now) from the delayed zset into the
/// ready zset, scored by each job's own `priority` field (lower pops
/// first) so promotion order never overrides priority order.
const PROMOTE_DUE_JOBS: &str = r#"
local delayed_key = KEYS[1]
local ready_key = KEYS[2]
local now_ms = ARGV[1]
local limit = ARGV[2]
local due = redis.call('ZRANGEBYSCORE', delayed_key, '-inf', now_ms, 'LIMIT', 0, limit)
for _, member in ipairs(due) do
    redis.call('ZREM', delayed_key, member)
    local job = cjson.decode(member)
    redis.call('ZADD', ready_key, job.priority, member)
end
return #due
"#;

pub struct Queue {
    conn: ConnectionManager,
}

impl Queue {
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }

    /// Enqueue a job for immediate (or, if `delay_ms` is nonzero, deferred)
    /// processing. Skips the enqueue if a job with the same dedup key is
    /// already pending.
    pub async fn enqueue(&self, payload: JobPayload, delay_ms: i64) -> Result<(), QueueError> {
        self.enqueue_with_priority(payload, delay_ms, job::DEFAULT_PRIORITY).await
    }

    pub async fn enqueue_with_priority(&self, payload: JobPayload, delay_ms: i64, priority: job::Priority) -> Result<(), QueueError> {
        let queue_name = payload.queue();
        let dedup = dedup_key(queue_name);
        let mut conn = self.conn.clone();

        let is_new: bool = conn.sadd(&dedup, payload.dedup_key()).await?;
        if !is_new {
            tracing::debug!(dedup_key = %payload.dedup_key(), "job already queued, skipping duplicate enqueue");
            return Ok(());
        }

        let mut job = Job::with_priority(payload, priority);
        job.enqueued_at = Utc::now().timestamp_millis();
        let ready_at = job.enqueued_at + delay_ms;
        let encoded = serde_json::to_string(&job)?;

        let _: () = conn.zadd(delayed_key(queue_name), encoded, ready_at).await?;
        Ok(())
    }

    /// Move any due jobs from the delayed set into the ready list. Called
    /// periodically by the worker pool's poll loop.
    pub async fn promote_due_jobs(&self, name: QueueName, limit: isize) -> Result<i64, QueueError> {
        let mut conn = self.conn.clone();
        let script = Script::new(PROMOTE_DUE_JOBS);
        let now_ms = Utc::now().timestamp_millis();
        let moved: i64 = script
            .key(delayed_key(name))
            .key(ready_key(name))
            .arg(now_ms)
            .arg(limit)
            .invoke_async(&mut conn)
            .await?;
        Ok(moved)
    }

    /// Pop the highest-priority (lowest `priority` value) ready job, if
    /// any, blocking up to `timeout_secs`.
    pub async fn pop(&self, name: QueueName, timeout_secs: f64) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String, f64)> = conn.bzpopmin(ready_key(name), timeout_secs).await?;
        match popped {
            Some((_, encoded, _)) => Ok(Some(serde_json::from_str(&encoded)?)),
            None => Ok(None),
        }
    }

    /// Record a completed job and clear its dedup entry so a future job
    /// targeting the same shop can be enqueued again.
    pub async fn mark_completed(&self, job: &Job) -> Result<(), QueueError> {
        let name = job.payload.queue();
        let mut conn = self.conn.clone();
        let encoded = serde_json::to_string(job)?;
        let _: () = conn.lpush(completed_key(name), encoded).await?;
        let _: () = conn.ltrim(completed_key(name), 0, RETENTION_CAP - 1).await?;
        let _: () = conn.srem(dedup_key(name), job.payload.dedup_key()).await?;
        Ok(())
    }

    /// Record a failed job. If attempts remain, reschedule with exponential
    /// backoff; otherwise park it on the failed list for operator
    /// inspection and clear its dedup entry.
    pub async fn mark_failed(&self, mut job: Job) -> Result<(), QueueError> {
        job.attempts += 1;
        let name = job.payload.queue();
        let mut conn = self.conn.clone();

        if job.has_attempts_remaining() {
            let ready_at = Utc::now().timestamp_millis() + job.backoff_delay_ms() as i64;
            let encoded = serde_json::to_string(&job)?;
            let _: () = conn.zadd(delayed_key(name), encoded, ready_at).await?;
            return Ok(());
        }

        let encoded = serde_json::to_string(&job)?;
        let _: () = conn.lpush(failed_key(name), encoded).await?;
        let _: () = conn.ltrim(failed_key(name), 0, RETENTION_CAP - 1).await?;
        let _: () = conn.srem(dedup_key(name), job.payload.dedup_key()).await?;
        Ok(())
    }

    /// Approximate queue depth: ready-set cardinality plus delayed-set size.
    pub async fn depth(&self, name: QueueName) -> Result<QueueDepth, QueueError> {
        let mut conn = self.conn.clone();
        let ready: u64 = conn.zcard(ready_key(name)).await?;
        let delayed: u64 = conn.zcard(delayed_key(name)).await?;
        Ok(QueueDepth { ready, delayed })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueDepth {
    pub ready: u64,
    pub delayed: u64,
}
