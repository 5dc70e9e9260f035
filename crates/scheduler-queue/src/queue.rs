//! Dispatch Queue — time-triggered delivery of opaque payloads, backed by
//! Redis (§4.3). One-shot and repeating registrations both live in a single
//! sorted set keyed by due-epoch-millis; a repeating registration re-arms
//! itself for its next occurrence once it has been claimed and handled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use scheduler_core::error::{Error, Result};
use scheduler_core::job::DispatchData;
use scheduler_core::schedule::{parse_cron, RepeatPlan};
use tokio::sync::Semaphore;
use uuid::Uuid;

const READY_KEY: &str = "scheduler:ready";
const DLQ_KEY: &str = "scheduler:dlq";

fn data_key(key: &str) -> String {
    format!("scheduler:data:{key}")
}

fn repeat_key(key: &str) -> String {
    format!("scheduler:repeat:{key}")
}

/// The persisted form of a repeat registration. `RepeatPlan` itself carries
/// a `chrono::Duration`, which does not round-trip through `serde_json`
/// cleanly, so the Queue stores its own small DTO instead.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
enum StoredPlan {
    Cron(String),
    EverySecs(i64),
}

impl From<&RepeatPlan> for StoredPlan {
    fn from(plan: &RepeatPlan) -> Self {
        match plan {
            RepeatPlan::Cron(expr) => StoredPlan::Cron(expr.clone()),
            RepeatPlan::Every(duration) => StoredPlan::EverySecs(duration.num_seconds()),
        }
    }
}

impl StoredPlan {
    /// The next due instant strictly after `from`, as epoch milliseconds.
    fn next_due_millis(&self, from_millis: i64) -> Option<i64> {
        match self {
            StoredPlan::Cron(expr) => {
                let schedule = parse_cron(expr)?;
                let from = chrono::DateTime::from_timestamp_millis(from_millis)?;
                schedule.after(&from).next().map(|t| t.timestamp_millis())
            }
            StoredPlan::EverySecs(secs) => Some(from_millis + secs * 1000),
        }
    }
}

/// The Dispatch Queue contract (§4.3).
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    async fn enqueue_delayed(&self, key: String, data: DispatchData, delay: Duration) -> Result<()>;
    async fn enqueue_repeating(&self, key: String, data: DispatchData, plan: RepeatPlan) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn enqueue_dlq(&self, key: String, data: DispatchData) -> Result<()>;
    async fn remove_dlq(&self, key: &str) -> Result<()>;
    async fn list_dlq(&self) -> Result<Vec<DispatchData>>;
}

/// Redis-backed implementation of the Dispatch Queue, including the
/// consumer loop used by the Delivery Worker.
pub struct RedisDispatchQueue {
    pool: Pool,
}

impl RedisDispatchQueue {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::queue(format!("failed to acquire redis connection: {e}")))
    }

    /// Polls the ready set for due entries, claims each with an atomic
    /// `ZREM` (so at most one consumer wins a given entry), and runs
    /// `handler` for each claimed entry with up to `concurrency` in
    /// flight. Repeating entries are re-armed for their next occurrence
    /// after the handler returns, regardless of outcome; one-shot entries
    /// are not re-armed. Runs until `shutdown` resolves.
    pub async fn consume<H, Fut>(
        self: Arc<Self>,
        handler: H,
        concurrency: usize,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) where
        H: Fn(DispatchData) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut poll = tokio::time::interval(Duration::from_millis(500));

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("dispatch queue consumer stopping");
                    break;
                }
                _ = poll.tick() => {
                    match self.claim_due(100).await {
                        Ok(keys) => {
                            for key in keys {
                                let queue = Arc::clone(&self);
                                let handler = Arc::clone(&handler);
                                let permit = Arc::clone(&semaphore);
                                tokio::spawn(async move {
                                    let _permit = match permit.acquire_owned().await {
                                        Ok(p) => p,
                                        Err(_) => return,
                                    };
                                    queue.process_claimed(key, handler.as_ref()).await;
                                });
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to poll dispatch queue");
                        }
                    }
                }
            }
        }
    }

    async fn claim_due(&self, limit: isize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let now = Utc::now().timestamp_millis();

        let candidates: Vec<String> = conn
            .zrangebyscore_limit(READY_KEY, "-inf", now, 0, limit)
            .await
            .map_err(|e| Error::queue(format!("ZRANGEBYSCORE failed: {e}")))?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for key in candidates {
            let removed: i64 = conn
                .zrem(READY_KEY, &key)
                .await
                .map_err(|e| Error::queue(format!("ZREM failed: {e}")))?;
            if removed > 0 {
                claimed.push(key);
            }
        }
        Ok(claimed)
    }

    async fn process_claimed<H, Fut>(&self, key: String, handler: &H)
    where
        H: Fn(DispatchData) -> Fut + Send + Sync,
        Fut: std::future::Future<Output = Result<()>> + Send,
    {
        let data = match self.load_data(&key).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::warn!(key = %key, "claimed dispatch entry has no data, dropping");
                return;
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "failed to load dispatch data");
                return;
            }
        };

        if let Err(e) = self.retry_handler(handler, data).await {
            tracing::warn!(key = %key, error = %e, "dispatch handler failed after outer retries");
        }

        // Loaded *after* the handler runs, not before: a non-retryable
        // failure removes this key's repeat registration as part of
        // handling it, and that removal must win over re-arming here.
        match self.load_plan(&key).await {
            Ok(Some(plan)) => {
                if let Err(e) = self.rearm(&key, &plan).await {
                    tracing::error!(key = %key, error = %e, "failed to rearm repeating entry");
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(key = %key, error = %e, "failed to load repeat plan for rearm");
            }
        }
    }

    /// The Queue's own bounded retry (§4.3): up to 3 attempts, 1s initial
    /// backoff, factor 2. Unconditional on the handler's error — the
    /// Worker has already decided whether to treat the error as retryable
    /// and re-raised accordingly; the Queue just drives the attempts.
    async fn retry_handler<H, Fut>(&self, handler: &H, data: DispatchData) -> Result<()>
    where
        H: Fn(DispatchData) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let max_attempts = 3u32;
        let mut backoff = Duration::from_secs(1);
        let mut last_err = None;

        for attempt in 1..=max_attempts {
            match handler(data.clone()).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_err = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::internal("dispatch handler exhausted retries")))
    }

    async fn load_data(&self, key: &str) -> Result<Option<DispatchData>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(data_key(key))
            .await
            .map_err(|e| Error::queue(format!("GET failed: {e}")))?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| Error::queue(format!("corrupt dispatch data: {e}")))
        })
        .transpose()
    }

    async fn load_plan(&self, key: &str) -> Result<Option<StoredPlan>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(repeat_key(key))
            .await
            .map_err(|e| Error::queue(format!("GET failed: {e}")))?;
        raw.map(|s| {
            serde_json::from_str(&s).map_err(|e| Error::queue(format!("corrupt repeat plan: {e}")))
        })
        .transpose()
    }

    async fn rearm(&self, key: &str, plan: &StoredPlan) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        if let Some(due) = plan.next_due_millis(now) {
            let mut conn = self.conn().await?;
            conn.zadd::<_, _, _, ()>(READY_KEY, key, due)
                .await
                .map_err(|e| Error::queue(format!("ZADD failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchQueue for RedisDispatchQueue {
    async fn enqueue_delayed(&self, key: String, data: DispatchData, delay: Duration) -> Result<()> {
        let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&data)
            .map_err(|e| Error::queue(format!("failed to serialize dispatch data: {e}")))?;

        conn.set::<_, _, ()>(data_key(&key), payload)
            .await
            .map_err(|e| Error::queue(format!("SET failed: {e}")))?;
        conn.del::<_, ()>(repeat_key(&key))
            .await
            .map_err(|e| Error::queue(format!("DEL failed: {e}")))?;
        conn.zadd::<_, _, _, ()>(READY_KEY, &key, due)
            .await
            .map_err(|e| Error::queue(format!("ZADD failed: {e}")))?;

        tracing::debug!(key = %key, due_ms = due, "enqueued delayed dispatch");
        Ok(())
    }

    async fn enqueue_repeating(&self, key: String, data: DispatchData, plan: RepeatPlan) -> Result<()> {
        let stored = StoredPlan::from(&plan);
        let now = Utc::now().timestamp_millis();
        let due = match &stored {
            StoredPlan::Cron(expr) => {
                let schedule = parse_cron(expr)
                    .ok_or_else(|| Error::validation(format!("invalid cron expression: {expr}")))?;
                let from = Utc::now();
                schedule
                    .after(&from)
                    .next()
                    .map(|t| t.timestamp_millis())
                    .ok_or_else(|| Error::validation("cron expression has no future occurrence"))?
            }
            StoredPlan::EverySecs(secs) => now + secs * 1000,
        };

        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&data)
            .map_err(|e| Error::queue(format!("failed to serialize dispatch data: {e}")))?;
        let plan_payload = serde_json::to_string(&stored)
            .map_err(|e| Error::queue(format!("failed to serialize repeat plan: {e}")))?;

        conn.set::<_, _, ()>(data_key(&key), payload)
            .await
            .map_err(|e| Error::queue(format!("SET failed: {e}")))?;
        conn.set::<_, _, ()>(repeat_key(&key), plan_payload)
            .await
            .map_err(|e| Error::queue(format!("SET failed: {e}")))?;
        conn.zadd::<_, _, _, ()>(READY_KEY, &key, due)
            .await
            .map_err(|e| Error::queue(format!("ZADD failed: {e}")))?;

        tracing::debug!(key = %key, due_ms = due, "enqueued repeating dispatch");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.zrem::<_, _, ()>(READY_KEY, key)
            .await
            .map_err(|e| Error::queue(format!("ZREM failed: {e}")))?;
        conn.del::<_, ()>(data_key(key))
            .await
            .map_err(|e| Error::queue(format!("DEL failed: {e}")))?;
        conn.del::<_, ()>(repeat_key(key))
            .await
            .map_err(|e| Error::queue(format!("DEL failed: {e}")))?;
        tracing::debug!(key = %key, "removed dispatch entry");
        Ok(())
    }

    async fn enqueue_dlq(&self, key: String, data: DispatchData) -> Result<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&data)
            .map_err(|e| Error::queue(format!("failed to serialize dlq entry: {e}")))?;
        conn.hset::<_, _, _, ()>(DLQ_KEY, &key, payload)
            .await
            .map_err(|e| Error::queue(format!("HSET failed: {e}")))?;
        tracing::info!(key = %key, "dead-lettered dispatch entry");
        Ok(())
    }

    async fn remove_dlq(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.hdel::<_, _, ()>(DLQ_KEY, key)
            .await
            .map_err(|e| Error::queue(format!("HDEL failed: {e}")))?;
        Ok(())
    }

    async fn list_dlq(&self) -> Result<Vec<DispatchData>> {
        let mut conn = self.conn().await?;
        let raw: std::collections::HashMap<String, String> = conn
            .hgetall(DLQ_KEY)
            .await
            .map_err(|e| Error::queue(format!("HGETALL failed: {e}")))?;
        raw.into_values()
            .map(|s| {
                serde_json::from_str(&s)
                    .map_err(|e| Error::queue(format!("corrupt dlq entry: {e}")))
            })
            .collect()
    }
}

/// RunNow's time-qualified manual dispatch key (§4.5): independent of the
/// job's normal schedule registration, so it never collides with it.
pub fn manual_key(job_id: Uuid) -> String {
    format!("{job_id}-manual-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_plan_every_secs_advances_by_fixed_duration() {
        let plan = StoredPlan::EverySecs(60);
        let from = 1_000_000_000_000i64;
        assert_eq!(plan.next_due_millis(from), Some(from + 60_000));
    }

    #[test]
    fn stored_plan_cron_next_due_is_strictly_after() {
        let plan = StoredPlan::Cron("* * * * *".to_string());
        let from = Utc::now().timestamp_millis();
        let due = plan.next_due_millis(from).unwrap();
        assert!(due > from);
    }

    #[test]
    fn manual_key_is_distinct_per_call() {
        let id = Uuid::new_v4();
        let a = manual_key(id);
        let b = manual_key(id);
        assert_ne!(a, b);
        assert!(a.starts_with(&id.to_string()));
    }

    #[test]
    fn stored_plan_every_secs_advances_by_arbitrary_fixed_durations() {
        use fake::Fake;

        for _ in 0..20 {
            let secs: i64 = (1..86_400).fake();
            let plan = StoredPlan::EverySecs(secs);
            let from = 1_000_000_000_000i64;
            assert_eq!(plan.next_due_millis(from), Some(from + secs * 1000));
        }
    }

    #[test]
    fn repeat_plan_converts_to_stored_plan() {
        assert!(matches!(
            StoredPlan::from(&RepeatPlan::Cron("* * * * *".into())),
            StoredPlan::Cron(_)
        ));
        assert!(matches!(
            StoredPlan::from(&RepeatPlan::Every(chrono::Duration::minutes(5))),
            StoredPlan::EverySecs(300)
        ));
    }
}
