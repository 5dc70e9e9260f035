//! Dependency health checks — Postgres and Redis, each with a bounded
//! timeout so a stalled dependency cannot hang the health endpoint.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use deadpool_redis::Pool as RedisPool;
use sqlx::PgPool;

use crate::status::{ComponentHealth, HealthReport};

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HealthChecker {
    database: PgPool,
    queue: RedisPool,
    started_at: chrono::DateTime<Utc>,
}

impl HealthChecker {
    pub fn new(database: PgPool, queue: RedisPool) -> Self {
        Self {
            database,
            queue,
            started_at: Utc::now(),
        }
    }

    pub async fn check(&self) -> HealthReport {
        let mut components = HashMap::new();
        components.insert("database".to_string(), self.check_database().await);
        components.insert("queue".to_string(), self.check_queue().await);

        let status = HealthReport::overall_status(&components);
        HealthReport {
            status,
            timestamp: Utc::now(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            components,
        }
    }

    async fn check_database(&self) -> ComponentHealth {
        let start = Instant::now();
        let result = tokio::time::timeout(CHECK_TIMEOUT, async {
            sqlx::query("SELECT 1").execute(&self.database).await
        })
        .await;
        let elapsed = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => ComponentHealth::healthy(elapsed),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "database health check failed");
                ComponentHealth::unhealthy(format!("query failed: {e}"))
            }
            Err(_) => {
                tracing::warn!("database health check timed out");
                ComponentHealth::unhealthy("timed out")
            }
        }
    }

    async fn check_queue(&self) -> ComponentHealth {
        let start = Instant::now();
        let result = tokio::time::timeout(CHECK_TIMEOUT, async {
            let mut conn = self
                .queue
                .get()
                .await
                .map_err(|e| format!("failed to acquire connection: {e}"))?;
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
                .map_err(|e| format!("PING failed: {e}"))
        })
        .await;
        let elapsed = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => ComponentHealth::healthy(elapsed),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "queue health check failed");
                ComponentHealth::unhealthy(e)
            }
            Err(_) => {
                tracing::warn!("queue health check timed out");
                ComponentHealth::unhealthy("timed out")
            }
        }
    }
}
