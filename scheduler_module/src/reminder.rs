//! Daily reminder pass: select tasks whose configured reminder offset lands
//! on today, fan the notification out, then flip the sent flag for the whole
//! batch in one update.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::interval::reminder_offset;
use crate::notify::{resolve_recipient_emails, task_template_data, MailTemplate, Notifier};
use crate::store::SqliteTaskStore;
use crate::task::Task;
use crate::types::SchedulerError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReminderRunReport {
    /// Tasks whose offset matched today.
    pub matched: usize,
    /// Dispatches that went out.
    pub sent: usize,
    /// Dispatches that failed (logged, flag still flipped).
    pub failed: usize,
    /// Matched tasks with no assignee; nothing to send.
    pub skipped_no_recipient: usize,
}

pub struct ReminderScheduler<'a, N: Notifier> {
    store: &'a SqliteTaskStore,
    notifier: &'a N,
    frontend_url: &'a str,
}

impl<'a, N: Notifier> ReminderScheduler<'a, N> {
    pub fn new(store: &'a SqliteTaskStore, notifier: &'a N, frontend_url: &'a str) -> Self {
        Self {
            store,
            notifier,
            frontend_url,
        }
    }

    /// One daily run. Selection re-reads persisted flag state, so a repeated
    /// run on the same day selects nothing new. A crash before the batch
    /// flag flip re-selects (and may re-send) tomorrow; delivery is
    /// at-least-once.
    pub fn run(&self, today: DateTime<Utc>) -> Result<ReminderRunReport, SchedulerError> {
        let candidates = self.store.reminder_candidates()?;
        let matched: Vec<Task> = candidates
            .into_iter()
            .filter(|task| is_due_for_reminder(task, today))
            .collect();

        let mut report = ReminderRunReport {
            matched: matched.len(),
            ..ReminderRunReport::default()
        };

        for task in &matched {
            match self.dispatch(task) {
                Ok(true) => report.sent += 1,
                Ok(false) => report.skipped_no_recipient += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        "reminder dispatch failed for {}: {}",
                        task.task_unique_id, err
                    );
                }
            }
        }

        // The flag flips for every matched task, sent or not. The batch is
        // the synchronization point: it runs after all dispatch attempts.
        let ids: Vec<i64> = matched.iter().map(|task| task.id).collect();
        self.store.bulk_mark_reminder_sent(&ids)?;

        if report.matched > 0 {
            info!(
                "reminder run: {} matched, {} sent, {} failed, {} without recipients",
                report.matched, report.sent, report.failed, report.skipped_no_recipient
            );
        }
        Ok(report)
    }

    fn dispatch(&self, task: &Task) -> Result<bool, SchedulerError> {
        let emails = resolve_recipient_emails(self.store, task.assignee)?;
        if emails.is_empty() {
            return Ok(false);
        }
        let context = task_template_data(task, &emails, self.frontend_url)?;
        self.notifier
            .send_templated(&emails, MailTemplate::TaskReminder, &context)?;
        Ok(true)
    }
}

/// The selection predicate: the task's offset from today to its end date,
/// measured in its own reminder unit, equals its configured step count. A
/// weekly rule is only ever compared in weeks, so the five interval
/// comparisons are mutually exclusive.
fn is_due_for_reminder(task: &Task, today: DateTime<Utc>) -> bool {
    let Some(rule) = task.reminder else {
        return false;
    };
    match reminder_offset(today, task.ending_datetime, rule.interval) {
        Some(offset) => offset == i64::from(rule.count),
        None => false,
    }
}
