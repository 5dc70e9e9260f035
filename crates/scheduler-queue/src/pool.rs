//! Redis connection pool construction for the Dispatch Queue.

use scheduler_core::config::QueueConfig;
use scheduler_core::error::{Error, Result};

pub async fn connect(config: &QueueConfig) -> Result<deadpool_redis::Pool> {
    let cfg = deadpool_redis::Config::from_url(config.url());
    let pool = cfg
        .builder()
        .map_err(|e| Error::queue(format!("invalid redis config: {e}")))?
        .max_size(config.pool_size)
        .runtime(deadpool_redis::Runtime::Tokio1)
        .build()
        .map_err(|e| Error::queue(format!("failed to build redis pool: {e}")))?;

    // Fail fast if Redis is unreachable at startup.
    let mut conn = pool
        .get()
        .await
        .map_err(|e| Error::queue(format!("failed to acquire redis connection: {e}")))?;
    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .map_err(|e| Error::queue(format!("redis PING failed: {e}")))?;

    Ok(pool)
}
