//! Occurrence cloning: the shared primitive behind the manual "duplicate
//! task" feature and both recurrence passes.

use chrono::Utc;
use tracing::{info, warn};

use crate::interval::add_interval;
use crate::notify::{resolve_recipient_emails, task_template_data, MailTemplate, Notifier};
use crate::store::{ActivityType, SqliteTaskStore};
use crate::task::{generate_unique_id, CreatedBy, Task, TaskDraft, TaskStatus};
use crate::types::SchedulerError;

/// How a clone is derived from its source.
#[derive(Debug, Clone)]
pub struct ClonePlan {
    /// Advance the schedule window by one repetition step.
    pub shift_forward: bool,
    /// Keep the source's parent link (subtask clones); top-level clones drop
    /// it.
    pub keep_parent: bool,
    /// Scheduler-produced clones carry `is_repeat`/`is_repeated` so they are
    /// not re-bootstrapped or rolled before their own due date.
    pub scheduler_produced: bool,
    /// Attributed author of the clone.
    pub actor: Option<CreatedBy>,
}

impl ClonePlan {
    /// Plan for a recurrence-scheduler clone: authorship falls back to the
    /// source task's own creator, the parent link survives when present.
    pub fn recurrence(source: &Task, shift_forward: bool) -> ClonePlan {
        ClonePlan {
            shift_forward,
            keep_parent: source.parent_id.is_some(),
            scheduler_produced: true,
            actor: source.created_by,
        }
    }

    /// Plan for a user-initiated duplicate.
    pub fn duplicate(actor: CreatedBy, is_subtask: bool) -> ClonePlan {
        ClonePlan {
            shift_forward: false,
            keep_parent: is_subtask,
            scheduler_produced: false,
            actor: Some(actor),
        }
    }
}

pub struct OccurrenceCloner<'a, N: Notifier> {
    store: &'a SqliteTaskStore,
    notifier: &'a N,
    frontend_url: &'a str,
}

impl<'a, N: Notifier> OccurrenceCloner<'a, N> {
    pub fn new(store: &'a SqliteTaskStore, notifier: &'a N, frontend_url: &'a str) -> Self {
        Self {
            store,
            notifier,
            frontend_url,
        }
    }

    /// Duplicate a task by its public token on behalf of `actor`.
    pub fn duplicate_task(
        &self,
        actor: CreatedBy,
        task_unique_id: &str,
        is_subtask: bool,
    ) -> Result<Task, SchedulerError> {
        let source = self
            .store
            .find_by_unique_id(task_unique_id)?
            .ok_or_else(|| SchedulerError::TaskNotFound(task_unique_id.to_string()))?;
        self.clone_occurrence(&source, &ClonePlan::duplicate(actor, is_subtask))
    }

    /// Create a new task row derived from `source`. The clone row, its
    /// attachment copies and its tag links commit in a single transaction;
    /// the activity entry and assignee notification afterwards are
    /// best-effort.
    pub fn clone_occurrence(
        &self,
        source: &Task,
        plan: &ClonePlan,
    ) -> Result<Task, SchedulerError> {
        let draft = self.build_draft(source, plan);
        let tags = self.store.tags_for_task(source.id)?;

        let mut conn = self.store.open()?;
        let tx = conn.transaction()?;
        let clone_id = SqliteTaskStore::insert_task_in(&tx, &draft)?;
        let copied = SqliteTaskStore::copy_attachments_in(&tx, source.id, clone_id)?;
        let linked =
            SqliteTaskStore::associate_tags_in(&tx, source.workspace_id, clone_id, &tags)?;
        let clone = SqliteTaskStore::fetch_task_in(&tx, clone_id)?;
        tx.commit()?;

        info!(
            "cloned task {} -> {} ({} attachments, {} tags)",
            source.task_unique_id, clone.task_unique_id, copied, linked
        );

        let body = match plan.actor {
            Some(actor) => format!("{} #{} has duplicated a task.", actor.kind(), actor.actor_id()),
            None => "A task was duplicated.".to_string(),
        };
        if let Err(err) = self.store.record_activity(
            source.id,
            &body,
            ActivityType::TaskCreated,
            plan.actor,
        ) {
            warn!(
                "failed to record duplicate activity for {}: {}",
                source.task_unique_id, err
            );
        }

        let template = if plan.scheduler_produced {
            MailTemplate::TaskRepetition
        } else {
            MailTemplate::TaskAssignment
        };
        if let Err(err) = self.notify_assignees(&clone, template) {
            warn!(
                "failed to notify assignees for clone {}: {}",
                clone.task_unique_id, err
            );
        }

        Ok(clone)
    }

    fn build_draft(&self, source: &Task, plan: &ClonePlan) -> TaskDraft {
        let mut starting = source.starting_datetime;
        let mut ending = source.ending_datetime;
        if plan.shift_forward {
            if let Some(rule) = source.repetition {
                starting = add_interval(starting, rule.interval, rule.count);
                ending = add_interval(ending, rule.interval, rule.count);
            }
        }

        TaskDraft {
            task_unique_id: generate_unique_id("T"),
            task_name: source.task_name.clone(),
            task_description: source.task_description.clone(),
            priority: source.priority,
            status: TaskStatus::Assigned,
            starting_datetime: starting,
            ending_datetime: ending,
            to_be_done_at_from: source.to_be_done_at_from,
            to_be_done_at_to: source.to_be_done_at_to,
            estimated_time_seconds: source.estimated_time_seconds,
            is_archived: source.is_archived,
            parent_id: if plan.keep_parent {
                source.parent_id
            } else {
                None
            },
            workspace_id: source.workspace_id,
            academic_year_id: source.academic_year_id,
            assignee: source.assignee,
            created_by: plan.actor.or(source.created_by),
            reminder: source.reminder,
            is_reminder_sent: false,
            repetition: source.repetition,
            is_repeat: plan.scheduler_produced,
            is_repeated: plan.scheduler_produced,
            last_repeated_at: plan.scheduler_produced.then(Utc::now),
        }
    }

    fn notify_assignees(&self, clone: &Task, template: MailTemplate) -> Result<(), SchedulerError> {
        let emails = resolve_recipient_emails(self.store, clone.assignee)?;
        if emails.is_empty() {
            return Ok(());
        }
        let context = task_template_data(clone, &emails, self.frontend_url)?;
        self.notifier.send_templated(&emails, template, &context)
    }
}
