//! Daily recurrence pass, two phases:
//!
//! 1. bootstrap: a task whose recurrence was just configured gets one
//!    unshifted clone queued up immediately, no date gate;
//! 2. forward roll: once the original's end date plus one interval lands on
//!    today, a date-shifted clone is produced and the original is marked
//!    rolled.
//!
//! The bootstrap phase controls when users first see the upcoming occurrence
//! appear; the roll phase keeps exactly one future occurrence queued.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::cloner::{ClonePlan, OccurrenceCloner};
use crate::interval::{add_interval, is_same_calendar_day};
use crate::notify::Notifier;
use crate::store::SqliteTaskStore;
use crate::task::Task;
use crate::types::SchedulerError;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceRunReport {
    pub bootstrapped: usize,
    pub rolled: usize,
    /// Per-task clone failures; siblings in the batch are unaffected.
    pub failed: usize,
}

pub struct RecurrenceScheduler<'a, N: Notifier> {
    store: &'a SqliteTaskStore,
    cloner: OccurrenceCloner<'a, N>,
}

impl<'a, N: Notifier> RecurrenceScheduler<'a, N> {
    pub fn new(store: &'a SqliteTaskStore, notifier: &'a N, frontend_url: &'a str) -> Self {
        Self {
            store,
            cloner: OccurrenceCloner::new(store, notifier, frontend_url),
        }
    }

    pub fn run(&self, today: DateTime<Utc>) -> Result<RecurrenceRunReport, SchedulerError> {
        let mut report = RecurrenceRunReport::default();

        // Phase 1: bootstrap clones, unconditionally for any recurring task
        // not yet bootstrapped.
        for task in self.store.recurring_not_bootstrapped()? {
            match self.bootstrap(&task) {
                Ok(()) => report.bootstrapped += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        "bootstrap clone failed for {}: {}",
                        task.task_unique_id, err
                    );
                }
            }
        }

        // Phase 2: forward rolls, date-gated on end date plus one interval.
        for task in self.store.recurring_awaiting_roll()? {
            if !is_roll_due(&task, today) {
                continue;
            }
            match self.roll_forward(&task) {
                Ok(()) => report.rolled += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!("forward roll failed for {}: {}", task.task_unique_id, err);
                }
            }
        }

        if report.bootstrapped > 0 || report.rolled > 0 || report.failed > 0 {
            info!(
                "recurrence run: {} bootstrapped, {} rolled, {} failed",
                report.bootstrapped, report.rolled, report.failed
            );
        }
        Ok(report)
    }

    fn bootstrap(&self, task: &Task) -> Result<(), SchedulerError> {
        self.cloner
            .clone_occurrence(task, &ClonePlan::recurrence(task, false))?;
        self.store.mark_bootstrapped(task.id)
    }

    fn roll_forward(&self, task: &Task) -> Result<(), SchedulerError> {
        self.cloner
            .clone_occurrence(task, &ClonePlan::recurrence(task, true))?;
        self.store.mark_rolled(task.id)
    }
}

/// The forward roll fires on the calendar day the next occurrence starts:
/// end date plus one repetition step (Quarterly stepping three months per
/// count).
fn is_roll_due(task: &Task, today: DateTime<Utc>) -> bool {
    let Some(rule) = task.repetition else {
        return false;
    };
    let candidate = add_interval(task.ending_datetime, rule.interval, rule.count);
    // Ongoing yields no shifted date and therefore never rolls.
    if candidate == task.ending_datetime {
        return false;
    }
    is_same_calendar_day(candidate, today)
}
