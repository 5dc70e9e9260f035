//! The `Job` entity and its schedule/status sub-types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Currently the only supported job type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobType {
    Http,
}

impl Default for JobType {
    fn default() -> Self {
        JobType::Http
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    Cron,
    SpecificTime,
    Recurring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecurringInterval {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Active,
    Inactive,
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Active
    }
}

/// A scheduled delivery job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub target: String,
    pub payload: Option<serde_json::Value>,
    pub schedule_type: ScheduleType,
    pub cron_expression: Option<String>,
    pub specific_time: Option<DateTime<Utc>>,
    pub interval: Option<RecurringInterval>,
    pub interval_value: Option<i32>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Fields accepted from a create/update request. Validated by the
/// Coordinator before being applied to a `Job`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub job_type: JobType,
    pub target: String,
    pub payload: Option<serde_json::Value>,
    pub schedule_type: ScheduleType,
    pub cron_expression: Option<String>,
    pub specific_time: Option<DateTime<Utc>>,
    pub interval: Option<RecurringInterval>,
    pub interval_value: Option<i32>,
    pub status: Option<JobStatus>,
}

/// The opaque unit of work carried through the Dispatch Queue. Carries only
/// what the Worker needs to perform an authoritative re-read; the payload
/// travels alongside so the Worker does not need a second Store round trip
/// before validating and sending it, but the Store record is always the
/// source of truth for `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchData {
    pub job_id: Uuid,
    pub target: String,
    pub job_type: JobType,
    pub payload: Option<serde_json::Value>,
}

/// A reference to a `Job` awaiting operator action in the DLQ. Carries no
/// state beyond the id; the authoritative error and metadata live on the
/// Job record itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub job_id: Uuid,
}

impl RecurringInterval {
    /// Whether this interval has a fixed calendar-independent duration.
    /// `Month`/`Year` do not (see §9) and must be re-enqueued per dispatch.
    pub fn is_fixed_duration(self) -> bool {
        !matches!(self, RecurringInterval::Month | RecurringInterval::Year)
    }
}
