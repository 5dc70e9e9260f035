//! Job Store — durable table of job records (§4.2).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_core::error::{Error, Result};
use scheduler_core::job::{Job, JobStatus, JobType, RecurringInterval, ScheduleType};
use sqlx::PgPool;
use uuid::Uuid;

/// Optional filter for `list`.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
}

/// Fields an update may touch. `None` leaves the column untouched except
/// where noted.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub name: String,
    pub description: Option<String>,
    pub job_type: JobType,
    pub target: String,
    pub payload: Option<serde_json::Value>,
    pub schedule_type: ScheduleType,
    pub cron_expression: Option<String>,
    pub specific_time: Option<DateTime<Utc>>,
    pub interval: Option<RecurringInterval>,
    pub interval_value: Option<i32>,
    pub status: JobStatus,
    pub next_run: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert(&self, job: Job) -> Result<Job>;
    async fn get(&self, id: Uuid) -> Result<Job>;
    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>>;
    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<Job>;
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<Job>;
    async fn delete(&self, id: Uuid) -> Result<Job>;
    async fn record_run(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<Job>;
}

pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: Job) -> Result<Job> {
        let existing: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM jobs WHERE id = $1")
            .bind(job.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::database_with_source("failed to check job existence", e))?;
        if existing.is_some() {
            return Err(Error::conflict(format!("job {} already exists", job.id)));
        }

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, name, description, job_type, target, payload,
                schedule_type, cron_expression, specific_time, interval, interval_value,
                status, created_at, updated_at, last_run, next_run, error_message
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.description)
        .bind(job_type_to_str(job.job_type))
        .bind(&job.target)
        .bind(&job.payload)
        .bind(schedule_type_to_str(job.schedule_type))
        .bind(&job.cron_expression)
        .bind(job.specific_time)
        .bind(job.interval.map(interval_to_str))
        .bind(job.interval_value)
        .bind(status_to_str(job.status))
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.last_run)
        .bind(job.next_run)
        .bind(&job.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to insert job", e))?;

        tracing::debug!(job_id = %job.id, "job inserted");
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::database_with_source("failed to read job", e))?;

        row.map(Job::from)
            .ok_or_else(|| Error::not_found("Job", id.to_string()))
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = if let Some(status) = filter.status {
            sqlx::query_as("SELECT * FROM jobs WHERE status = $1 ORDER BY created_at DESC")
                .bind(status_to_str(status))
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query_as("SELECT * FROM jobs ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|e| Error::database_with_source("failed to list jobs", e))?;

        Ok(rows.into_iter().map(Job::from).collect())
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs SET
                name = $2, description = $3, job_type = $4, target = $5, payload = $6,
                schedule_type = $7, cron_expression = $8, specific_time = $9,
                interval = $10, interval_value = $11, status = $12,
                next_run = $13, error_message = $14, last_run = $15, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(job_type_to_str(update.job_type))
        .bind(&update.target)
        .bind(&update.payload)
        .bind(schedule_type_to_str(update.schedule_type))
        .bind(&update.cron_expression)
        .bind(update.specific_time)
        .bind(update.interval.map(interval_to_str))
        .bind(update.interval_value)
        .bind(status_to_str(update.status))
        .bind(update.next_run)
        .bind(&update.error_message)
        .bind(update.last_run)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to update job", e))?;

        row.map(Job::from)
            .ok_or_else(|| Error::not_found("Job", id.to_string()))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs SET status = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status_to_str(status))
        .bind(&error_message)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to update job status", e))?;

        row.map(Job::from)
            .ok_or_else(|| Error::not_found("Job", id.to_string()))
    }

    async fn delete(&self, id: Uuid) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as("DELETE FROM jobs WHERE id = $1 RETURNING *")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::database_with_source("failed to delete job", e))?;

        row.map(Job::from)
            .ok_or_else(|| Error::not_found("Job", id.to_string()))
    }

    async fn record_run(
        &self,
        id: Uuid,
        last_run: DateTime<Utc>,
        next_run: Option<DateTime<Utc>>,
    ) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as(
            r#"
            UPDATE jobs SET last_run = $2, next_run = $3, error_message = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(last_run)
        .bind(next_run)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::database_with_source("failed to record job run", e))?;

        row.map(Job::from)
            .ok_or_else(|| Error::not_found("Job", id.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    job_type: String,
    target: String,
    payload: Option<serde_json::Value>,
    schedule_type: String,
    cron_expression: Option<String>,
    specific_time: Option<DateTime<Utc>>,
    interval: Option<String>,
    interval_value: Option<i32>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            name: row.name,
            description: row.description,
            job_type: job_type_from_str(&row.job_type),
            target: row.target,
            payload: row.payload,
            schedule_type: schedule_type_from_str(&row.schedule_type),
            cron_expression: row.cron_expression,
            specific_time: row.specific_time,
            interval: row.interval.as_deref().map(interval_from_str),
            interval_value: row.interval_value,
            status: status_from_str(&row.status),
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_run: row.last_run,
            next_run: row.next_run,
            error_message: row.error_message,
        }
    }
}

fn job_type_to_str(t: JobType) -> &'static str {
    match t {
        JobType::Http => "HTTP",
    }
}

fn job_type_from_str(_s: &str) -> JobType {
    JobType::Http
}

fn schedule_type_to_str(t: ScheduleType) -> &'static str {
    match t {
        ScheduleType::Cron => "CRON",
        ScheduleType::SpecificTime => "SPECIFIC_TIME",
        ScheduleType::Recurring => "RECURRING",
    }
}

fn schedule_type_from_str(s: &str) -> ScheduleType {
    match s {
        "SPECIFIC_TIME" => ScheduleType::SpecificTime,
        "RECURRING" => ScheduleType::Recurring,
        _ => ScheduleType::Cron,
    }
}

fn interval_to_str(i: RecurringInterval) -> &'static str {
    match i {
        RecurringInterval::Minute => "MINUTE",
        RecurringInterval::Hour => "HOUR",
        RecurringInterval::Day => "DAY",
        RecurringInterval::Week => "WEEK",
        RecurringInterval::Month => "MONTH",
        RecurringInterval::Year => "YEAR",
    }
}

fn interval_from_str(s: &str) -> RecurringInterval {
    match s {
        "HOUR" => RecurringInterval::Hour,
        "DAY" => RecurringInterval::Day,
        "WEEK" => RecurringInterval::Week,
        "MONTH" => RecurringInterval::Month,
        "YEAR" => RecurringInterval::Year,
        _ => RecurringInterval::Minute,
    }
}

fn status_to_str(s: JobStatus) -> &'static str {
    match s {
        JobStatus::Active => "ACTIVE",
        JobStatus::Inactive => "INACTIVE",
        JobStatus::Failed => "FAILED",
    }
}

fn status_from_str(s: &str) -> JobStatus {
    match s {
        "INACTIVE" => JobStatus::Inactive,
        "FAILED" => JobStatus::Failed,
        _ => JobStatus::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_type_round_trips_through_its_column_encoding() {
        for t in [
            ScheduleType::Cron,
            ScheduleType::SpecificTime,
            ScheduleType::Recurring,
        ] {
            assert_eq!(schedule_type_from_str(schedule_type_to_str(t)), t);
        }
    }

    #[test]
    fn recurring_interval_round_trips_through_its_column_encoding() {
        for i in [
            RecurringInterval::Minute,
            RecurringInterval::Hour,
            RecurringInterval::Day,
            RecurringInterval::Week,
            RecurringInterval::Month,
            RecurringInterval::Year,
        ] {
            assert_eq!(interval_from_str(interval_to_str(i)), i);
        }
    }

    #[test]
    fn job_status_round_trips_through_its_column_encoding() {
        for s in [JobStatus::Active, JobStatus::Inactive, JobStatus::Failed] {
            assert_eq!(status_from_str(status_to_str(s)), s);
        }
    }

    #[test]
    fn job_row_conversion_preserves_every_field() {
        let now = Utc::now();
        let id = Uuid::new_v4();
        let row = JobRow {
            id,
            name: "nightly-sync".to_string(),
            description: Some("syncs things".to_string()),
            job_type: "HTTP".to_string(),
            target: "https://example.com/hook".to_string(),
            payload: Some(serde_json::json!({"k": "v"})),
            schedule_type: "RECURRING".to_string(),
            cron_expression: None,
            specific_time: None,
            interval: Some("DAY".to_string()),
            interval_value: Some(2),
            status: "FAILED".to_string(),
            created_at: now,
            updated_at: now,
            last_run: Some(now),
            next_run: Some(now),
            error_message: Some("boom".to_string()),
        };

        let job = Job::from(row);
        assert_eq!(job.id, id);
        assert_eq!(job.schedule_type, ScheduleType::Recurring);
        assert_eq!(job.interval, Some(RecurringInterval::Day));
        assert_eq!(job.interval_value, Some(2));
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
    }
}
