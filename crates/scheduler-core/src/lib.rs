//! Shared types for the scheduler workspace: the `Job` data model, the
//! unified `Error` taxonomy, process configuration, the Schedule
//! Calculator, and the payload sanitizer.

pub mod config;
pub mod error;
pub mod job;
pub mod sanitize;
pub mod schedule;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use job::{DispatchData, DlqEntry, Job, JobInput, JobStatus, JobType, RecurringInterval, ScheduleType};
pub use schedule::{initial_delay, next_run, parse_cron, repeat_plan, validate_schedule_fields, RepeatPlan};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
