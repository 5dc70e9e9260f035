//! Schedule Calculator — pure functions mapping a schedule specification to
//! dispatch times. No I/O, no side effects; every function here is a plain
//! computation over `Job` fields and the current instant.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Months, Utc};
use cron::Schedule as CronSchedule;

use crate::job::{Job, JobInput, RecurringInterval, ScheduleType};

/// The repeat plan computed for a job's schedule, as used to register a
/// repeating entry with the Dispatch Queue.
#[derive(Debug, Clone, PartialEq)]
pub enum RepeatPlan {
    Cron(String),
    Every(chrono::Duration),
}

/// Validates a cron expression and normalizes it to the `cron` crate's
/// expected 6-field (seconds-first) form, accepting the conventional 5-field
/// form by prepending a `0` seconds field. Any other field count is invalid.
pub fn parse_cron(expr: &str) -> Option<CronSchedule> {
    let field_count = expr.split_whitespace().count();
    let normalized = match field_count {
        5 => format!("0 {expr}"),
        6 => expr.to_string(),
        _ => return None,
    };
    CronSchedule::from_str(&normalized).ok()
}

/// `initial_delay(job) → duration | null` — for `SPECIFIC_TIME`, the
/// remaining time until `specific_time` if it is still in the future, else
/// `None`. Other schedule types always return `None`; they use
/// `repeat_plan` instead.
pub fn initial_delay(job: &Job, now: DateTime<Utc>) -> Option<chrono::Duration> {
    if job.schedule_type != ScheduleType::SpecificTime {
        return None;
    }
    let specific_time = job.specific_time?;
    let delta = specific_time - now;
    if delta > chrono::Duration::zero() {
        Some(delta)
    } else {
        None
    }
}

/// `repeat_plan(job) → {cron} | {every} | null`.
pub fn repeat_plan(job: &Job) -> Option<RepeatPlan> {
    match job.schedule_type {
        ScheduleType::Cron => {
            let expr = job.cron_expression.as_ref()?;
            parse_cron(expr)?;
            Some(RepeatPlan::Cron(expr.clone()))
        }
        ScheduleType::Recurring => {
            let interval = job.interval?;
            let value = job.interval_value?;
            if value <= 0 || !interval.is_fixed_duration() {
                return None;
            }
            Some(RepeatPlan::Every(fixed_duration(interval, value)))
        }
        ScheduleType::SpecificTime => None,
    }
}

fn fixed_duration(interval: RecurringInterval, value: i32) -> chrono::Duration {
    let value = value as i64;
    match interval {
        RecurringInterval::Minute => chrono::Duration::minutes(value),
        RecurringInterval::Hour => chrono::Duration::hours(value),
        RecurringInterval::Day => chrono::Duration::days(value),
        RecurringInterval::Week => chrono::Duration::weeks(value),
        RecurringInterval::Month | RecurringInterval::Year => unreachable!(
            "fixed_duration is only called for fixed-duration intervals"
        ),
    }
}

/// `next_run(job, from) → timestamp | null` — the first dispatch instant
/// strictly ≥ `from` consistent with the schedule.
pub fn next_run(job: &Job, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match job.schedule_type {
        ScheduleType::SpecificTime => {
            let specific_time = job.specific_time?;
            if specific_time > from {
                Some(specific_time)
            } else {
                None
            }
        }
        ScheduleType::Cron => {
            let expr = job.cron_expression.as_ref()?;
            let schedule = parse_cron(expr)?;
            schedule.after(&from).next()
        }
        ScheduleType::Recurring => {
            let interval = job.interval?;
            let value = job.interval_value?;
            if value <= 0 {
                return None;
            }
            Some(calendar_advance(from, interval, value))
        }
    }
}

/// Adds `value` units of `interval` to `from` using calendar arithmetic, so
/// `MONTH`/`YEAR` respect month lengths and year boundaries, and `WEEK`
/// means 7 calendar days.
fn calendar_advance(from: DateTime<Utc>, interval: RecurringInterval, value: i32) -> DateTime<Utc> {
    match interval {
        RecurringInterval::Minute => from + chrono::Duration::minutes(value as i64),
        RecurringInterval::Hour => from + chrono::Duration::hours(value as i64),
        RecurringInterval::Day => from + chrono::Duration::days(value as i64),
        RecurringInterval::Week => from + chrono::Duration::weeks(value as i64),
        RecurringInterval::Month => {
            if value >= 0 {
                from.checked_add_months(Months::new(value as u32)).unwrap_or(from)
            } else {
                from.checked_sub_months(Months::new((-value) as u32)).unwrap_or(from)
            }
        }
        RecurringInterval::Year => {
            let years = value as i32;
            let target_year = from.year() + years;
            from.with_year(target_year).unwrap_or(from)
        }
    }
}

/// Validates a `JobInput`'s schedule fields for internal consistency: the
/// engine requires that exactly the fields appropriate to `schedule_type`
/// be populated.
pub fn validate_schedule_fields(input: &JobInput) -> Result<(), String> {
    match input.schedule_type {
        ScheduleType::Cron => {
            let expr = input
                .cron_expression
                .as_deref()
                .ok_or("cron_expression is required for schedule_type CRON")?;
            if parse_cron(expr).is_none() {
                return Err(format!("invalid cron expression: {expr}"));
            }
        }
        ScheduleType::SpecificTime => {
            if input.specific_time.is_none() {
                return Err("specific_time is required for schedule_type SPECIFIC_TIME".into());
            }
        }
        ScheduleType::Recurring => {
            let interval = input
                .interval
                .ok_or("interval is required for schedule_type RECURRING")?;
            let value = input
                .interval_value
                .ok_or("interval_value is required for schedule_type RECURRING")?;
            if value <= 0 {
                return Err("interval_value must be a positive integer".into());
            }
            let _ = interval;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, JobStatus, JobType};
    use chrono::TimeZone;

    fn base_job(schedule_type: ScheduleType) -> Job {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Job {
            id: uuid::Uuid::new_v4(),
            name: "test".into(),
            description: None,
            job_type: JobType::Http,
            target: "http://example.com".into(),
            payload: None,
            schedule_type,
            cron_expression: None,
            specific_time: None,
            interval: None,
            interval_value: None,
            status: JobStatus::Active,
            created_at: now,
            updated_at: now,
            last_run: None,
            next_run: None,
            error_message: None,
        }
    }

    #[test]
    fn specific_time_in_future_has_initial_delay() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut job = base_job(ScheduleType::SpecificTime);
        job.specific_time = Some(now + chrono::Duration::seconds(5));
        assert_eq!(
            initial_delay(&job, now),
            Some(chrono::Duration::seconds(5))
        );
    }

    #[test]
    fn specific_time_exactly_now_is_treated_as_past() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut job = base_job(ScheduleType::SpecificTime);
        job.specific_time = Some(now);
        assert_eq!(initial_delay(&job, now), None);
        assert_eq!(next_run(&job, now), None);
    }

    #[test]
    fn recurring_month_year_has_no_fixed_repeat_plan() {
        let mut job = base_job(ScheduleType::Recurring);
        job.interval = Some(RecurringInterval::Month);
        job.interval_value = Some(1);
        assert_eq!(repeat_plan(&job), None);

        job.interval = Some(RecurringInterval::Day);
        assert!(matches!(repeat_plan(&job), Some(RepeatPlan::Every(_))));
    }

    #[test]
    fn recurring_minute_next_run_is_strictly_after() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut job = base_job(ScheduleType::Recurring);
        job.interval = Some(RecurringInterval::Minute);
        job.interval_value = Some(1);
        let next = next_run(&job, now).unwrap();
        assert!(next > now);
        assert_eq!(next, now + chrono::Duration::minutes(1));
    }

    #[test]
    fn recurring_month_respects_month_length() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap();
        let mut job = base_job(ScheduleType::Recurring);
        job.interval = Some(RecurringInterval::Month);
        job.interval_value = Some(1);
        let next = next_run(&job, now).unwrap();
        assert!(next > now);
        assert_eq!(next.month(), 2);
    }

    #[test]
    fn zero_or_negative_interval_value_is_invalid() {
        let input = JobInput {
            name: "x".into(),
            description: None,
            job_type: JobType::Http,
            target: "http://example.com".into(),
            payload: None,
            schedule_type: ScheduleType::Recurring,
            cron_expression: None,
            specific_time: None,
            interval: Some(RecurringInterval::Day),
            interval_value: Some(0),
            status: None,
        };
        assert!(validate_schedule_fields(&input).is_err());
    }

    #[test]
    fn four_or_seven_field_cron_is_invalid() {
        assert!(parse_cron("* * * *").is_none());
        assert!(parse_cron("* * * * * * *").is_none());
        assert!(parse_cron("* * * * *").is_some());
        assert!(parse_cron("0 * * * * *").is_some());
    }

    #[test]
    fn cron_every_minute_next_run_after_from() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 30).unwrap();
        let mut job = base_job(ScheduleType::Cron);
        job.cron_expression = Some("* * * * *".to_string());
        let next = next_run(&job, now).unwrap();
        assert!(next > now);
    }
}
