//! Delivery Worker — executes one delivery attempt per dispatch entry,
//! including the authoritative re-read, target/payload guards, retrying
//! HTTP POST, error classification, and Store/DLQ writeback (§4.4).

use std::sync::Arc;

use chrono::Utc;
use scheduler_core::config::{DeliveryConfig, TargetConfig};
use scheduler_core::error::{Error, Result};
use scheduler_core::job::{DispatchData, JobStatus};
use scheduler_core::sanitize::{check_size, sanitize};
use scheduler_core::schedule;
use scheduler_queue::DispatchQueue;
use scheduler_store::JobStore;

use crate::delivery::{post_once, with_retry};

pub const USER_AGENT: &str = concat!("scheduler/", env!("CARGO_PKG_VERSION"));

pub struct DeliveryWorker {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
    http_client: reqwest::Client,
    target_config: TargetConfig,
    delivery_config: DeliveryConfig,
}

impl DeliveryWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
        http_client: reqwest::Client,
        target_config: TargetConfig,
        delivery_config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            queue,
            http_client,
            target_config,
            delivery_config,
        }
    }

    /// Executes the full per-dispatch procedure of §4.4. Returns `Ok(())`
    /// for "nothing further to do" outcomes (stale entry, inactive job,
    /// successful delivery) and `Err` for anything the Queue's outer
    /// retry should see, matching the Worker's "re-raise" instructions.
    pub async fn handle(&self, data: DispatchData) -> Result<()> {
        // Step 1: authoritative re-read.
        let job = match self.store.get(data.job_id).await {
            Ok(job) => job,
            Err(Error::NotFound { .. }) => {
                tracing::info!(job_id = %data.job_id, "job no longer exists, dropping stale dispatch");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if job.status == JobStatus::Inactive {
            tracing::debug!(job_id = %data.job_id, "job is inactive, skipping delivery");
            return Ok(());
        }

        // A job already dead-lettered by a prior non-retryable failure stays
        // FAILED until `reactivate`/`complete` brings it back; skip delivery
        // rather than re-attempt (and re-clear the error) behind the DLQ's
        // back.
        if job.status == JobStatus::Failed {
            tracing::debug!(job_id = %data.job_id, "job is failed, skipping delivery");
            return Ok(());
        }

        // Step 2: target validation.
        if let Err(e) = self.validate_target(&job.target) {
            return self.fail_non_retryable(&job.id.to_string(), &data, e).await;
        }

        // Step 3: payload guard.
        let payload = data.payload.clone().unwrap_or(serde_json::json!({}));
        if let Err(size) = check_size(&payload) {
            let e = Error::payload_too_large(size, scheduler_core::sanitize::MAX_PAYLOAD_BYTES);
            return self.fail_non_retryable(&job.id.to_string(), &data, e).await;
        }
        let sanitized = sanitize(&payload);

        // Steps 4-5: HTTP POST with the inner retry.
        let client = &self.http_client;
        let target = job.target.clone();
        let delivery_config = self.delivery_config.clone();
        let result = with_retry(&delivery_config, || {
            post_once(client, &target, &sanitized, USER_AGENT)
        })
        .await;

        match result {
            Ok(()) => self.on_success(&job, &data).await,
            Err(e) if e.is_retryable() => self.fail_retryable(&job.id.to_string(), e).await,
            Err(e) => self.fail_non_retryable(&job.id.to_string(), &data, e).await,
        }
    }

    fn validate_target(&self, target: &str) -> Result<()> {
        let url = url::Url::parse(target)
            .map_err(|e| Error::unauthorized_target(format!("invalid target url: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::unauthorized_target(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| Error::unauthorized_target("target url has no host"))?;
        if !self.target_config.permits(host) {
            return Err(Error::unauthorized_target(host));
        }
        Ok(())
    }

    /// Step 6: on success, advance the schedule and clear the error.
    /// `MONTH`/`YEAR` recurring jobs have no fixed-duration repeat
    /// registration (§9), so the Worker re-enqueues a fresh delayed entry
    /// for the next occurrence here.
    async fn on_success(
        &self,
        job: &scheduler_core::job::Job,
        data: &DispatchData,
    ) -> Result<()> {
        let now = Utc::now();
        let next = schedule::next_run(job, now);
        self.store.record_run(job.id, now, next).await?;

        let needs_manual_reenqueue = job.schedule_type == scheduler_core::job::ScheduleType::Recurring
            && job.interval.map(|i| !i.is_fixed_duration()).unwrap_or(false);

        if needs_manual_reenqueue {
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(std::time::Duration::ZERO);
                self.queue
                    .enqueue_delayed(job.id.to_string(), data.clone(), delay)
                    .await?;
            }
        }

        tracing::info!(job_id = %job.id, next_run = ?next, "delivery succeeded");
        Ok(())
    }

    /// Step 7, retryable branch: keep the job `ACTIVE` and let the
    /// Queue's outer retry re-attempt.
    async fn fail_retryable(&self, key: &str, e: Error) -> Result<()> {
        let message = format!("Temporary failure: {}. The job will be retried.", e);
        let job_id = parse_job_id(key)?;
        self.store
            .update_status(job_id, JobStatus::Active, Some(message))
            .await?;
        tracing::warn!(job_id = %key, error = %e, "retryable delivery failure");
        Err(e)
    }

    /// Step 7, non-retryable branch: fail the job, dead-letter it, and strip
    /// its active Queue registration (repeating or delayed) so it stops
    /// re-dispatching — `reactivate`/`complete` are the only paths back in.
    async fn fail_non_retryable(&self, key: &str, data: &DispatchData, e: Error) -> Result<()> {
        let job_id = parse_job_id(key)?;
        self.store
            .update_status(job_id, JobStatus::Failed, Some(e.to_string()))
            .await?;
        self.queue.enqueue_dlq(key.to_string(), data.clone()).await?;
        if let Err(remove_err) = self.queue.remove(key).await {
            tracing::warn!(job_id = %key, error = %remove_err, "failed to remove queue registration after dead-lettering");
        }
        tracing::warn!(job_id = %key, error = %e, "non-retryable delivery failure, dead-lettered");
        Err(e)
    }
}

fn parse_job_id(key: &str) -> Result<uuid::Uuid> {
    // `key` is either the job id itself (scheduled dispatch) or a
    // `<id>-manual-<ts>` key (RunNow); the job id is always the prefix
    // before the first manual-dispatch marker, or the whole string.
    let id_part = key.split("-manual-").next().unwrap_or(key);
    uuid::Uuid::parse_str(id_part)
        .map_err(|e| Error::internal(format!("dispatch key is not a valid job id: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use crate::delivery::build_http_client;
    use scheduler_core::job::{Job, JobType, ScheduleType};
    use scheduler_queue::MockDispatchQueue;
    use scheduler_store::MockJobStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parse_job_id_from_scheduled_key() {
        let id = uuid::Uuid::new_v4();
        assert_eq!(parse_job_id(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn parse_job_id_from_manual_key() {
        let id = uuid::Uuid::new_v4();
        let key = format!("{id}-manual-12345");
        assert_eq!(parse_job_id(&key).unwrap(), id);
    }

    fn fast_delivery_config() -> DeliveryConfig {
        DeliveryConfig {
            concurrency: 5,
            http_timeout_secs: 5,
            max_redirects: 5,
            max_attempts: 2,
            initial_backoff_secs: 0,
            backoff_factor: 2,
            max_backoff_secs: 0,
        }
    }

    fn sample_job(id: uuid::Uuid, target: String, status: JobStatus) -> Job {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Job {
            id,
            name: "nightly-sync".into(),
            description: None,
            job_type: JobType::Http,
            target,
            payload: None,
            schedule_type: ScheduleType::Cron,
            cron_expression: Some("* * * * *".into()),
            specific_time: None,
            interval: None,
            interval_value: None,
            status,
            created_at: now,
            updated_at: now,
            last_run: None,
            next_run: Some(now + chrono::Duration::minutes(1)),
            error_message: None,
        }
    }

    fn dispatch_data(job_id: uuid::Uuid, target: &str) -> DispatchData {
        DispatchData {
            job_id,
            target: target.to_string(),
            job_type: JobType::Http,
            payload: Some(serde_json::json!({"k": "v"})),
        }
    }

    #[tokio::test]
    async fn stale_dispatch_for_deleted_job_is_dropped_without_error() {
        let id = uuid::Uuid::new_v4();
        let mut store = MockJobStore::new();
        store
            .expect_get()
            .returning(|id| Err(Error::not_found("job", id.to_string())));
        let queue = MockDispatchQueue::new();

        let worker = DeliveryWorker::new(
            Arc::new(store),
            Arc::new(queue),
            build_http_client(&fast_delivery_config()).unwrap(),
            TargetConfig::default(),
            fast_delivery_config(),
        );

        let result = worker.handle(dispatch_data(id, "https://example.com/hook")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn inactive_job_is_skipped_without_contacting_the_target() {
        let id = uuid::Uuid::new_v4();
        let job = sample_job(id, "https://example.com/hook".into(), JobStatus::Inactive);
        let mut store = MockJobStore::new();
        store.expect_get().returning(move |_| Ok(job.clone()));
        let queue = MockDispatchQueue::new();

        let worker = DeliveryWorker::new(
            Arc::new(store),
            Arc::new(queue),
            build_http_client(&fast_delivery_config()).unwrap(),
            TargetConfig::default(),
            fast_delivery_config(),
        );

        let result = worker.handle(dispatch_data(id, "https://example.com/hook")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn target_outside_the_allow_list_fails_non_retryable_and_is_dead_lettered() {
        let id = uuid::Uuid::new_v4();
        let job = sample_job(id, "https://blocked.example.com/hook".into(), JobStatus::Active);
        let mut store = MockJobStore::new();
        store.expect_get().returning(move |_| Ok(job.clone()));
        store
            .expect_update_status()
            .withf(|_, status, _| *status == JobStatus::Failed)
            .returning(move |id, status, error_message| {
                Ok(Job {
                    status,
                    error_message,
                    ..sample_job(id, "https://blocked.example.com/hook".into(), JobStatus::Active)
                })
            });

        let mut queue = MockDispatchQueue::new();
        queue.expect_enqueue_dlq().returning(|_, _| Ok(()));
        queue.expect_remove().times(1).returning(|_| Ok(()));

        let target_config = TargetConfig::from_env_value("allowed.example.com");
        let worker = DeliveryWorker::new(
            Arc::new(store),
            Arc::new(queue),
            build_http_client(&fast_delivery_config()).unwrap(),
            target_config,
            fast_delivery_config(),
        );

        let result = worker
            .handle(dispatch_data(id, "https://blocked.example.com/hook"))
            .await;
        assert!(matches!(result, Err(Error::UnauthorizedTarget { .. })));
    }

    #[tokio::test]
    async fn failed_job_is_skipped_without_contacting_the_target() {
        let id = uuid::Uuid::new_v4();
        let job = sample_job(id, "https://example.com/hook".into(), JobStatus::Failed);
        let mut store = MockJobStore::new();
        store.expect_get().returning(move |_| Ok(job.clone()));
        let queue = MockDispatchQueue::new();

        let worker = DeliveryWorker::new(
            Arc::new(store),
            Arc::new(queue),
            build_http_client(&fast_delivery_config()).unwrap(),
            TargetConfig::default(),
            fast_delivery_config(),
        );

        let result = worker.handle(dispatch_data(id, "https://example.com/hook")).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn successful_delivery_records_the_run_and_advances_the_schedule() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let target = format!("{}/hook", server.uri());

        let id = uuid::Uuid::new_v4();
        let job = sample_job(id, target.clone(), JobStatus::Active);
        let mut store = MockJobStore::new();
        store.expect_get().returning(move |_| Ok(job.clone()));
        store
            .expect_record_run()
            .times(1)
            .returning(move |id, _last_run, next_run| {
                Ok(Job {
                    next_run,
                    ..sample_job(id, target.clone(), JobStatus::Active)
                })
            });
        let queue = MockDispatchQueue::new();

        let worker = DeliveryWorker::new(
            Arc::new(store),
            Arc::new(queue),
            build_http_client(&fast_delivery_config()).unwrap(),
            TargetConfig::default(),
            fast_delivery_config(),
        );

        let result = worker.handle(dispatch_data(id, &target)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn retryable_upstream_failure_keeps_the_job_active_with_a_temporary_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let target = format!("{}/hook", server.uri());

        let id = uuid::Uuid::new_v4();
        let job = sample_job(id, target.clone(), JobStatus::Active);
        let mut store = MockJobStore::new();
        store.expect_get().returning(move |_| Ok(job.clone()));
        store
            .expect_update_status()
            .withf(|_, status, message| {
                *status == JobStatus::Active
                    && message.as_deref().unwrap_or("").starts_with("Temporary failure:")
            })
            .returning(move |id, status, error_message| {
                Ok(Job {
                    status,
                    error_message,
                    ..sample_job(id, target.clone(), JobStatus::Active)
                })
            });
        let queue = MockDispatchQueue::new();

        let worker = DeliveryWorker::new(
            Arc::new(store),
            Arc::new(queue),
            build_http_client(&fast_delivery_config()).unwrap(),
            TargetConfig::default(),
            fast_delivery_config(),
        );

        let result = worker.handle(dispatch_data(id, &target)).await;
        assert!(matches!(result, Err(Error::UpstreamServer { .. })));
    }
}
