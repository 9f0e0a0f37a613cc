use chrono::{DateTime, NaiveTime, Utc};
use rusqlite::{params, Row, Transaction};

use crate::task::{
    Assignee, CreatedBy, Interval, IntervalRule, Task, TaskDraft, TaskPriority, TaskStatus,
};
use crate::types::SchedulerError;

pub(super) const TASK_COLUMNS: &str = "id, task_unique_id, task_name, task_description, priority, status, \
     starting_datetime, ending_datetime, to_be_done_at_from, to_be_done_at_to, \
     estimated_time_seconds, is_archived, parent_id, workspace_id, academic_year_id, \
     assigned_user_id, assigned_team_id, created_by_kind, created_by_id, \
     reminder_interval_number, reminder_interval, is_reminder_sent, \
     repetition_interval_number, repetition_interval, is_repeat, is_repeated, \
     last_repeated_at, created_at, updated_at";

pub(super) fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(super) fn parse_datetime(value: &str) -> Result<DateTime<Utc>, SchedulerError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn parse_optional_datetime(value: Option<&str>) -> Result<Option<DateTime<Utc>>, SchedulerError> {
    match value {
        Some(raw) => Ok(Some(parse_datetime(raw)?)),
        None => Ok(None),
    }
}

fn format_time(value: NaiveTime) -> String {
    value.format("%H:%M:%S").to_string()
}

fn parse_optional_time(value: Option<&str>) -> Option<NaiveTime> {
    value.and_then(|raw| NaiveTime::parse_from_str(raw, "%H:%M:%S").ok())
}

pub(super) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn interval_rule(number: Option<i64>, label: Option<&str>) -> Option<IntervalRule> {
    // Co-required: a half-configured row yields no rule.
    let count = u32::try_from(number?).ok()?;
    let interval = Interval::parse(label?)?;
    Some(IntervalRule { interval, count })
}

fn assignee(user_id: Option<i64>, team_id: Option<i64>) -> Option<Assignee> {
    match (user_id, team_id) {
        (Some(id), _) => Some(Assignee::User(id)),
        (None, Some(id)) => Some(Assignee::Team(id)),
        (None, None) => None,
    }
}

fn created_by(kind: Option<&str>, id: Option<i64>) -> Option<CreatedBy> {
    match (kind, id) {
        (Some("admin"), Some(id)) => Some(CreatedBy::Admin(id)),
        (Some("super_admin"), Some(id)) => Some(CreatedBy::SuperAdmin(id)),
        (Some("user"), Some(id)) => Some(CreatedBy::User(id)),
        _ => None,
    }
}

pub(super) fn task_from_row(row: &Row<'_>) -> Result<Task, SchedulerError> {
    let priority: Option<String> = row.get(4)?;
    let status: String = row.get(5)?;
    let starting: String = row.get(6)?;
    let ending: String = row.get(7)?;
    let done_from: Option<String> = row.get(8)?;
    let done_to: Option<String> = row.get(9)?;
    let created_kind: Option<String> = row.get(17)?;
    let reminder_label: Option<String> = row.get(20)?;
    let repetition_label: Option<String> = row.get(23)?;
    let last_repeated: Option<String> = row.get(26)?;
    let created_at: String = row.get(27)?;
    let updated_at: String = row.get(28)?;

    let status = TaskStatus::parse(&status)
        .ok_or_else(|| SchedulerError::Storage(format!("unknown task status '{}'", status)))?;

    Ok(Task {
        id: row.get(0)?,
        task_unique_id: row.get(1)?,
        task_name: row.get(2)?,
        task_description: row.get(3)?,
        priority: priority.as_deref().and_then(TaskPriority::parse),
        status,
        starting_datetime: parse_datetime(&starting)?,
        ending_datetime: parse_datetime(&ending)?,
        to_be_done_at_from: parse_optional_time(done_from.as_deref()),
        to_be_done_at_to: parse_optional_time(done_to.as_deref()),
        estimated_time_seconds: row.get(10)?,
        is_archived: row.get::<_, i64>(11)? != 0,
        parent_id: row.get(12)?,
        workspace_id: row.get(13)?,
        academic_year_id: row.get(14)?,
        assignee: assignee(row.get(15)?, row.get(16)?),
        created_by: created_by(created_kind.as_deref(), row.get(18)?),
        reminder: interval_rule(row.get(19)?, reminder_label.as_deref()),
        is_reminder_sent: row.get::<_, i64>(21)? != 0,
        repetition: interval_rule(row.get(22)?, repetition_label.as_deref()),
        is_repeat: row.get::<_, i64>(24)? != 0,
        is_repeated: row.get::<_, i64>(25)? != 0,
        last_repeated_at: parse_optional_datetime(last_repeated.as_deref())?,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

pub(super) fn insert_task_row(
    tx: &Transaction<'_>,
    draft: &TaskDraft,
    now: DateTime<Utc>,
) -> Result<i64, SchedulerError> {
    let (assigned_user_id, assigned_team_id) = match draft.assignee {
        Some(Assignee::User(id)) => (Some(id), None),
        Some(Assignee::Team(id)) => (None, Some(id)),
        None => (None, None),
    };
    let (created_by_kind, created_by_id) = match draft.created_by {
        Some(actor) => (Some(actor.kind()), Some(actor.actor_id())),
        None => (None, None),
    };

    tx.execute(
        "INSERT INTO tasks (task_unique_id, task_name, task_description, priority, status, \
             starting_datetime, ending_datetime, to_be_done_at_from, to_be_done_at_to, \
             estimated_time_seconds, is_archived, parent_id, workspace_id, academic_year_id, \
             assigned_user_id, assigned_team_id, created_by_kind, created_by_id, \
             reminder_interval_number, reminder_interval, is_reminder_sent, \
             repetition_interval_number, repetition_interval, is_repeat, is_repeated, \
             last_repeated_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
             ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
        params![
            draft.task_unique_id,
            draft.task_name,
            draft.task_description,
            draft.priority.map(|p| p.as_str()),
            draft.status.as_str(),
            format_datetime(draft.starting_datetime),
            format_datetime(draft.ending_datetime),
            draft.to_be_done_at_from.map(format_time),
            draft.to_be_done_at_to.map(format_time),
            draft.estimated_time_seconds,
            bool_to_int(draft.is_archived),
            draft.parent_id,
            draft.workspace_id,
            draft.academic_year_id,
            assigned_user_id,
            assigned_team_id,
            created_by_kind,
            created_by_id,
            draft.reminder.map(|r| i64::from(r.count)),
            draft.reminder.map(|r| r.interval.as_str()),
            bool_to_int(draft.is_reminder_sent),
            draft.repetition.map(|r| i64::from(r.count)),
            draft.repetition.map(|r| r.interval.as_str()),
            bool_to_int(draft.is_repeat),
            bool_to_int(draft.is_repeated),
            draft.last_repeated_at.map(format_datetime),
            format_datetime(now),
            format_datetime(now),
        ],
    )?;
    Ok(tx.last_insert_rowid())
}
