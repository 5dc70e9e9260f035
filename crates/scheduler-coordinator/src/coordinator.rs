//! Engine Coordinator — the façade enforcing the invariants between the Job
//! Store and the Dispatch Queue on every external operation (§4.5).

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use scheduler_core::error::{Error, Result};
use scheduler_core::job::{DispatchData, Job, JobInput, JobStatus, ScheduleType};
use scheduler_core::schedule;
use scheduler_queue::{manual_key, DispatchQueue};
use scheduler_store::{JobFilter, JobStore, JobUpdate};
use uuid::Uuid;

pub struct Coordinator {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn DispatchQueue>) -> Self {
        Self { store, queue }
    }

    /// Steps 1-5 of §4.5's `Create`.
    pub async fn create(&self, input: JobInput) -> Result<Job> {
        schedule::validate_schedule_fields(&input).map_err(Error::validation)?;

        let now = Utc::now();
        let candidate = job_from_input(Uuid::new_v4(), &input, now, now, None);
        let next = schedule::next_run(&candidate, now);
        if candidate.schedule_type != ScheduleType::SpecificTime && next.is_none() {
            return Err(Error::validation("schedule produces no future occurrence"));
        }

        let mut candidate = candidate;
        candidate.next_run = next;

        let inserted = self.store.insert(candidate).await?;

        // A past SPECIFIC_TIME never errors out of `register` (it is a
        // deliberate dormant no-op, see below), so any error reaching here
        // is a genuine Cron/Recurring registration failure; roll the insert
        // back (§4.5 step 5).
        if let Err(e) = self.register(&inserted, now).await {
            let _ = self.store.delete(inserted.id).await;
            return Err(e);
        }

        tracing::info!(job_id = %inserted.id, "job created");
        Ok(inserted)
    }

    /// `Update(id, job_input)` — equivalent to delete+create but preserving
    /// `id`, `created_at`, `last_run`.
    pub async fn update(&self, id: Uuid, input: JobInput) -> Result<Job> {
        let existing = self.store.get(id).await?;
        schedule::validate_schedule_fields(&input).map_err(Error::validation)?;

        let now = Utc::now();
        let candidate = job_from_input(id, &input, existing.created_at, now, existing.last_run);
        let next = schedule::next_run(&candidate, now);
        if candidate.schedule_type != ScheduleType::SpecificTime && next.is_none() {
            return Err(Error::validation("schedule produces no future occurrence"));
        }

        let update = JobUpdate {
            name: candidate.name.clone(),
            description: candidate.description.clone(),
            job_type: candidate.job_type,
            target: candidate.target.clone(),
            payload: candidate.payload.clone(),
            schedule_type: candidate.schedule_type,
            cron_expression: candidate.cron_expression.clone(),
            specific_time: candidate.specific_time,
            interval: candidate.interval,
            interval_value: candidate.interval_value,
            status: candidate.status,
            next_run: next,
            error_message: None,
            last_run: existing.last_run,
        };
        let updated = self.store.update(id, update).await?;

        self.queue.remove(&id.to_string()).await?;
        self.register(&updated, now).await?;

        tracing::info!(job_id = %id, "job updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: Uuid) -> Result<Job> {
        let job = self.store.delete(id).await?;
        let key = id.to_string();
        self.queue.remove(&key).await?;
        self.queue.remove_dlq(&key).await?;
        tracing::info!(job_id = %id, "job deleted");
        Ok(job)
    }

    /// `RunNow(id)` — a time-qualified manual dispatch independent of the
    /// job's normal schedule registration.
    pub async fn run_now(&self, id: Uuid) -> Result<()> {
        let job = self.store.get(id).await?;
        let key = manual_key(id);
        self.queue
            .enqueue_delayed(key, to_dispatch_data(&job), StdDuration::ZERO)
            .await?;
        tracing::info!(job_id = %id, "manual run enqueued");
        Ok(())
    }

    pub async fn toggle_status(&self, id: Uuid, status: JobStatus) -> Result<Job> {
        let job = self.store.update_status(id, status, None).await?;
        tracing::info!(job_id = %id, status = ?status, "job status toggled");
        Ok(job)
    }

    pub async fn list_dlq(&self) -> Result<Vec<Job>> {
        self.store
            .list(JobFilter {
                status: Some(JobStatus::Failed),
            })
            .await
    }

    /// Plain read-through for `GET /jobs/:id` — no Queue interaction.
    pub async fn get(&self, id: Uuid) -> Result<Job> {
        self.store.get(id).await
    }

    /// Plain read-through for `GET /jobs[?status=…]` — no Queue interaction.
    pub async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        self.store.list(JobFilter { status }).await
    }

    /// `reactivate(id)` — clears the failure, recomputes `next_run`, and
    /// re-registers the job with the active Queue.
    pub async fn reactivate(&self, id: Uuid) -> Result<Job> {
        let job = self.store.get(id).await?;
        let now = Utc::now();
        let next = schedule::next_run(&job, now);
        let update = job_update_preserving(&job, JobStatus::Active, next, None, job.last_run);
        let updated = self.store.update(id, update).await?;

        self.register(&updated, now).await?;
        self.queue.remove_dlq(&id.to_string()).await?;

        tracing::info!(job_id = %id, "job reactivated from dlq");
        Ok(updated)
    }

    /// `complete(id)` — marks the job as if it had succeeded once (setting
    /// `last_run = now` and recomputing `next_run`), without re-registering
    /// with the Queue (it is assumed to already be registered).
    pub async fn complete(&self, id: Uuid) -> Result<Job> {
        let job = self.store.get(id).await?;
        let now = Utc::now();
        let next = schedule::next_run(&job, now);
        let update = job_update_preserving(&job, JobStatus::Active, next, None, Some(now));
        let updated = self.store.update(id, update).await?;

        self.queue.remove_dlq(&id.to_string()).await?;

        tracing::info!(job_id = %id, "job marked complete from dlq");
        Ok(updated)
    }

    pub async fn delete_dlq(&self, id: Uuid) -> Result<Job> {
        self.delete(id).await
    }

    /// Registers `job` with the active Dispatch Queue per its schedule
    /// type. `MONTH`/`YEAR` recurring intervals have no fixed-duration
    /// repeat plan (§9 design note): they are registered as a one-shot
    /// delayed entry to `job.next_run`, and the Worker re-arms the next
    /// occurrence on every successful dispatch.
    async fn register(&self, job: &Job, now: DateTime<Utc>) -> Result<()> {
        let key = job.id.to_string();
        let data = to_dispatch_data(job);

        match job.schedule_type {
            ScheduleType::SpecificTime => match schedule::initial_delay(job, now) {
                Some(delay) => {
                    self.queue
                        .enqueue_delayed(key, data, to_std_duration(delay))
                        .await
                }
                None => {
                    // SpecificTimeInPast (§4.5 step 4): not an error, the
                    // Job stays dormant with no queue entry and a null
                    // `next_run` (already computed that way in `create`).
                    tracing::info!(
                        job_id = %job.id,
                        "specific_time is in the past, job created dormant with no queue entry"
                    );
                    Ok(())
                }
            },
            ScheduleType::Cron => match schedule::repeat_plan(job) {
                Some(plan) => self.queue.enqueue_repeating(key, data, plan).await,
                None => Err(Error::validation(format!(
                    "no repeat plan could be computed for job {}",
                    job.id
                ))),
            },
            ScheduleType::Recurring => match schedule::repeat_plan(job) {
                Some(plan) => self.queue.enqueue_repeating(key, data, plan).await,
                None => {
                    let next = job.next_run.ok_or_else(|| {
                        Error::validation(format!(
                            "recurring job {} has no fixed repeat plan and no next_run",
                            job.id
                        ))
                    })?;
                    let delay = to_std_duration(next - now);
                    self.queue.enqueue_delayed(key, data, delay).await
                }
            },
        }
    }
}

fn to_std_duration(delay: chrono::Duration) -> StdDuration {
    delay.to_std().unwrap_or(StdDuration::ZERO)
}

fn to_dispatch_data(job: &Job) -> DispatchData {
    DispatchData {
        job_id: job.id,
        target: job.target.clone(),
        job_type: job.job_type,
        payload: job.payload.clone(),
    }
}

fn job_from_input(
    id: Uuid,
    input: &JobInput,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
) -> Job {
    Job {
        id,
        name: input.name.clone(),
        description: input.description.clone(),
        job_type: input.job_type,
        target: input.target.clone(),
        payload: input.payload.clone(),
        schedule_type: input.schedule_type,
        cron_expression: input.cron_expression.clone(),
        specific_time: input.specific_time,
        interval: input.interval,
        interval_value: input.interval_value,
        status: input.status.unwrap_or_default(),
        created_at,
        updated_at,
        last_run,
        next_run: None,
        error_message: None,
    }
}

fn job_update_preserving(
    job: &Job,
    status: JobStatus,
    next_run: Option<DateTime<Utc>>,
    error_message: Option<String>,
    last_run: Option<DateTime<Utc>>,
) -> JobUpdate {
    JobUpdate {
        name: job.name.clone(),
        description: job.description.clone(),
        job_type: job.job_type,
        target: job.target.clone(),
        payload: job.payload.clone(),
        schedule_type: job.schedule_type,
        cron_expression: job.cron_expression.clone(),
        specific_time: job.specific_time,
        interval: job.interval,
        interval_value: job.interval_value,
        status,
        next_run,
        error_message,
        last_run,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use scheduler_core::job::{JobInput, JobType, RecurringInterval};
    use scheduler_queue::MockDispatchQueue;
    use scheduler_store::MockJobStore;

    fn base_input(schedule_type: ScheduleType) -> JobInput {
        JobInput {
            name: "nightly-sync".into(),
            description: None,
            job_type: JobType::Http,
            target: "https://example.com/hook".into(),
            payload: None,
            schedule_type,
            cron_expression: None,
            specific_time: None,
            interval: None,
            interval_value: None,
            status: None,
        }
    }

    fn sample_job(id: Uuid, schedule_type: ScheduleType) -> Job {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Job {
            id,
            name: "nightly-sync".into(),
            description: None,
            job_type: JobType::Http,
            target: "https://example.com/hook".into(),
            payload: None,
            schedule_type,
            cron_expression: Some("* * * * *".into()),
            specific_time: None,
            interval: None,
            interval_value: None,
            status: JobStatus::Active,
            created_at: now,
            updated_at: now,
            last_run: None,
            next_run: Some(now + chrono::Duration::minutes(1)),
            error_message: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_invalid_schedule_fields() {
        let store = MockJobStore::new();
        let queue = MockDispatchQueue::new();
        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));

        let mut input = base_input(ScheduleType::Cron);
        input.cron_expression = None;

        let err = coordinator.create(input).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[tokio::test]
    async fn create_specific_time_in_the_past_succeeds_dormant_with_no_queue_entry() {
        let mut store = MockJobStore::new();
        let queue = MockDispatchQueue::new(); // no enqueue_* expectation set: none must be called

        store.expect_insert().returning(|job| Ok(job));

        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));
        let mut input = base_input(ScheduleType::SpecificTime);
        input.specific_time = Some(Utc::now() - chrono::Duration::seconds(5));

        let job = coordinator.create(input).await.unwrap();
        assert_eq!(job.next_run, None);
        assert_eq!(job.status, JobStatus::Active);
    }

    #[tokio::test]
    async fn create_cron_job_inserts_then_registers_repeating() {
        let mut store = MockJobStore::new();
        let mut queue = MockDispatchQueue::new();

        store
            .expect_insert()
            .withf(|job| job.schedule_type == ScheduleType::Cron)
            .returning(|job| Ok(job));
        queue
            .expect_enqueue_repeating()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));
        let mut input = base_input(ScheduleType::Cron);
        input.cron_expression = Some("* * * * *".into());

        let job = coordinator.create(input).await.unwrap();
        assert_eq!(job.schedule_type, ScheduleType::Cron);
    }

    #[tokio::test]
    async fn create_month_recurring_registers_a_one_shot_delay() {
        let mut store = MockJobStore::new();
        let mut queue = MockDispatchQueue::new();

        store.expect_insert().returning(|job| Ok(job));
        queue
            .expect_enqueue_delayed()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));
        let mut input = base_input(ScheduleType::Recurring);
        input.interval = Some(RecurringInterval::Month);
        input.interval_value = Some(1);

        let job = coordinator.create(input).await.unwrap();
        assert_eq!(job.interval, Some(RecurringInterval::Month));
    }

    #[tokio::test]
    async fn delete_removes_queue_and_dlq_entries() {
        let id = Uuid::new_v4();
        let mut store = MockJobStore::new();
        let mut queue = MockDispatchQueue::new();

        let job = sample_job(id, ScheduleType::Cron);
        store.expect_delete().returning(move |_| Ok(job.clone()));
        queue.expect_remove().times(1).returning(|_| Ok(()));
        queue.expect_remove_dlq().times(1).returning(|_| Ok(()));

        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));
        coordinator.delete(id).await.unwrap();
    }

    #[tokio::test]
    async fn run_now_uses_a_manual_key_distinct_from_the_schedule() {
        let id = Uuid::new_v4();
        let mut store = MockJobStore::new();
        let mut queue = MockDispatchQueue::new();

        let job = sample_job(id, ScheduleType::Cron);
        store.expect_get().returning(move |_| Ok(job.clone()));
        queue
            .expect_enqueue_delayed()
            .withf(move |key, _, _| key.starts_with(&id.to_string()) && key.contains("-manual-"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));
        coordinator.run_now(id).await.unwrap();
    }

    #[tokio::test]
    async fn reactivate_clears_error_and_re_registers() {
        let id = Uuid::new_v4();
        let mut store = MockJobStore::new();
        let mut queue = MockDispatchQueue::new();

        let mut failed = sample_job(id, ScheduleType::Cron);
        failed.status = JobStatus::Failed;
        failed.error_message = Some("boom".into());
        store.expect_get().returning(move |_| Ok(failed.clone()));
        store.expect_update().returning(|_, update| {
            assert_eq!(update.status, JobStatus::Active);
            assert!(update.error_message.is_none());
            Ok(sample_job(Uuid::new_v4(), ScheduleType::Cron))
        });
        queue
            .expect_enqueue_repeating()
            .times(1)
            .returning(|_, _, _| Ok(()));
        queue.expect_remove_dlq().times(1).returning(|_| Ok(()));

        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));
        coordinator.reactivate(id).await.unwrap();
    }

    #[tokio::test]
    async fn complete_does_not_re_register_with_the_queue() {
        let id = Uuid::new_v4();
        let mut store = MockJobStore::new();
        let mut queue = MockDispatchQueue::new();

        let job = sample_job(id, ScheduleType::Cron);
        store.expect_get().returning(move |_| Ok(job.clone()));
        store.expect_update().returning(|_, update| {
            assert_eq!(update.status, JobStatus::Active);
            assert!(update.error_message.is_none());
            assert!(update.last_run.is_some());
            Ok(sample_job(Uuid::new_v4(), ScheduleType::Cron))
        });
        queue.expect_remove_dlq().times(1).returning(|_| Ok(()));

        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));
        coordinator.complete(id).await.unwrap();
    }

    #[tokio::test]
    async fn list_dlq_filters_by_failed_status() {
        let mut store = MockJobStore::new();
        let queue = MockDispatchQueue::new();

        store
            .expect_list()
            .withf(|filter| filter.status == Some(JobStatus::Failed))
            .returning(|_| Ok(vec![]));

        let coordinator = Coordinator::new(Arc::new(store), Arc::new(queue));
        coordinator.list_dlq().await.unwrap();
    }
}
