//! Daily firing: a cron expression gates both scheduler passes, a poll loop
//! drives them. The exact wall-clock time is not significant, only "once per
//! day".

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::error;

use crate::notify::Notifier;
use crate::recurrence::{RecurrenceRunReport, RecurrenceScheduler};
use crate::reminder::{ReminderRunReport, ReminderScheduler};
use crate::store::SqliteTaskStore;
use crate::types::SchedulerError;

pub fn validate_cron_expression(expression: &str) -> Result<(), SchedulerError> {
    let fields = expression.split_whitespace().count();
    if fields != 6 {
        return Err(SchedulerError::InvalidCron(fields));
    }
    Ok(())
}

pub fn next_run_after(
    expression: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, SchedulerError> {
    validate_cron_expression(expression)?;
    let schedule = CronSchedule::from_str(expression)?;
    schedule
        .after(&after)
        .next()
        .ok_or(SchedulerError::NoNextRun)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DailyRunReport {
    pub reminders: ReminderRunReport,
    pub recurrence: RecurrenceRunReport,
}

/// Drives the reminder and recurrence passes once per cron firing.
pub struct DailyRunner<'a, N: Notifier> {
    reminder: ReminderScheduler<'a, N>,
    recurrence: RecurrenceScheduler<'a, N>,
    expression: String,
    next_run: DateTime<Utc>,
}

impl<'a, N: Notifier> DailyRunner<'a, N> {
    pub fn new(
        store: &'a SqliteTaskStore,
        notifier: &'a N,
        frontend_url: &'a str,
        expression: &str,
    ) -> Result<Self, SchedulerError> {
        let next_run = next_run_after(expression, Utc::now())?;
        Ok(Self {
            reminder: ReminderScheduler::new(store, notifier, frontend_url),
            recurrence: RecurrenceScheduler::new(store, notifier, frontend_url),
            expression: expression.to_string(),
            next_run,
        })
    }

    pub fn next_run(&self) -> DateTime<Utc> {
        self.next_run
    }

    /// Fire both passes if the cron gate has passed. A failed pass is logged
    /// and the next firing is still scheduled; there is no crash loop.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<Option<DailyRunReport>, SchedulerError> {
        if now < self.next_run {
            return Ok(None);
        }
        self.next_run = next_run_after(&self.expression, now)?;

        let mut report = DailyRunReport::default();
        match self.reminder.run(now) {
            Ok(reminders) => report.reminders = reminders,
            Err(err) => error!("reminder run failed: {}", err),
        }
        match self.recurrence.run(now) {
            Ok(recurrence) => report.recurrence = recurrence,
            Err(err) => error!("recurrence run failed: {}", err),
        }
        Ok(Some(report))
    }

    pub fn run_loop(&mut self, poll_interval: Duration, stop_flag: &AtomicBool) {
        while !stop_flag.load(Ordering::Relaxed) {
            if let Err(err) = self.tick(Utc::now()) {
                error!("scheduler tick failed: {}", err);
            }
            std::thread::sleep(poll_interval);
        }
    }
}
