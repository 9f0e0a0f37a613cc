pub mod cloner;
pub mod config;
pub mod interval;
pub mod notify;
pub mod recurrence;
pub mod reminder;
pub mod schedule;
pub mod store;
pub mod task;
pub mod types;

pub use cloner::{ClonePlan, OccurrenceCloner};
pub use config::ServiceConfig;
pub use notify::{MailTemplate, MailTemplates, Notifier, SendgridNotifier};
pub use recurrence::{RecurrenceRunReport, RecurrenceScheduler};
pub use reminder::{ReminderRunReport, ReminderScheduler};
pub use schedule::DailyRunner;
pub use store::{ActivityRecord, ActivityType, AttachmentRecord, SqliteTaskStore};
pub use task::{
    generate_unique_id, Assignee, CreatedBy, Interval, IntervalRule, Task, TaskDraft,
    TaskPriority, TaskStatus,
};
pub use types::SchedulerError;

#[cfg(test)]
mod tests;
