//! End-to-end runs against a temp-file sqlite store with a recording
//! notifier standing in for the mail channel.

use std::cell::RefCell;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::params;
use serde_json::Value;
use tempfile::TempDir;

use crate::cloner::{ClonePlan, OccurrenceCloner};
use crate::notify::{MailTemplate, Notifier};
use crate::recurrence::RecurrenceScheduler;
use crate::reminder::ReminderScheduler;
use crate::store::SqliteTaskStore;
use crate::task::{
    generate_unique_id, Assignee, CreatedBy, Interval, IntervalRule, TaskDraft, TaskPriority,
    TaskStatus,
};
use crate::types::SchedulerError;

const FRONTEND_URL: &str = "http://app.test";

#[derive(Default)]
struct RecordingNotifier {
    calls: RefCell<Vec<(Vec<String>, MailTemplate, Value)>>,
}

impl RecordingNotifier {
    fn calls(&self) -> Vec<(Vec<String>, MailTemplate, Value)> {
        self.calls.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send_templated(
        &self,
        to: &[String],
        template: MailTemplate,
        context: &Value,
    ) -> Result<(), SchedulerError> {
        self.calls
            .borrow_mut()
            .push((to.to_vec(), template, context.clone()));
        Ok(())
    }
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn send_templated(
        &self,
        _to: &[String],
        _template: MailTemplate,
        _context: &Value,
    ) -> Result<(), SchedulerError> {
        Err(SchedulerError::Notify("mail channel down".to_string()))
    }
}

struct TestEnv {
    _dir: TempDir,
    store: SqliteTaskStore,
    workspace_id: i64,
    academic_year_id: i64,
}

fn env() -> TestEnv {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = SqliteTaskStore::new(dir.path().join("taskmgr.db")).expect("store");
    let workspace_id = store.insert_workspace("Compliance").expect("workspace");
    let academic_year_id = store.insert_academic_year("2024/2025").expect("year");
    TestEnv {
        _dir: dir,
        store,
        workspace_id,
        academic_year_id,
    }
}

fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

fn draft(env: &TestEnv, name: &str) -> TaskDraft {
    TaskDraft {
        task_unique_id: generate_unique_id("T"),
        task_name: name.to_string(),
        task_description: "Quarterly compliance audit".to_string(),
        priority: Some(TaskPriority::Normal),
        status: TaskStatus::Assigned,
        starting_datetime: utc(2024, 3, 1),
        ending_datetime: utc(2024, 3, 1),
        to_be_done_at_from: None,
        to_be_done_at_to: None,
        estimated_time_seconds: Some(3600),
        is_archived: false,
        parent_id: None,
        workspace_id: env.workspace_id,
        academic_year_id: env.academic_year_id,
        assignee: None,
        created_by: Some(CreatedBy::Admin(1)),
        reminder: None,
        is_reminder_sent: false,
        repetition: None,
        is_repeat: false,
        is_repeated: false,
        last_repeated_at: None,
    }
}

fn rule(interval: Interval, count: u32) -> IntervalRule {
    IntervalRule { interval, count }
}

#[test]
fn recurrence_bootstraps_once_then_rolls_on_the_due_day() {
    let env = env();
    let notifier = RecordingNotifier::default();
    let scheduler = RecurrenceScheduler::new(&env.store, &notifier, FRONTEND_URL);

    let mut d = draft(&env, "Monthly audit");
    d.repetition = Some(rule(Interval::Monthly, 1));
    d.ending_datetime = utc(2024, 3, 1);
    d.starting_datetime = utc(2024, 2, 25);
    let source = env.store.insert_task(&d).expect("insert");

    // First run: one unshifted bootstrap clone, no roll yet.
    let report = scheduler.run(utc(2024, 3, 10)).expect("run");
    assert_eq!(report.bootstrapped, 1);
    assert_eq!(report.rolled, 0);
    assert_eq!(report.failed, 0);

    let source_after = env.store.find_by_id(source.id).expect("find").expect("row");
    assert!(source_after.is_repeat);
    assert!(!source_after.is_repeated);

    let bootstrapped = env.store.recurring_not_bootstrapped().expect("query");
    assert!(bootstrapped.is_empty());

    // Same-day rerun selects nothing new.
    let report = scheduler.run(utc(2024, 3, 10)).expect("run");
    assert_eq!(report.bootstrapped, 0);
    assert_eq!(report.rolled, 0);

    // End date plus one month: the forward roll fires, shifted one step.
    let report = scheduler.run(utc(2024, 4, 1)).expect("run");
    assert_eq!(report.rolled, 1);
    assert_eq!(report.failed, 0);

    let source_after = env.store.find_by_id(source.id).expect("find").expect("row");
    assert!(source_after.is_repeated);
    assert!(source_after.last_repeated_at.is_some());

    let awaiting = env.store.recurring_awaiting_roll().expect("query");
    assert!(awaiting.is_empty());

    // One roll per configuration; a later matching day produces nothing.
    let report = scheduler.run(utc(2024, 5, 1)).expect("run");
    assert_eq!(report.bootstrapped + report.rolled, 0);
}

#[test]
fn bootstrap_clone_is_unshifted_and_roll_clone_moves_one_step() {
    let env = env();
    let notifier = RecordingNotifier::default();
    let scheduler = RecurrenceScheduler::new(&env.store, &notifier, FRONTEND_URL);

    let mut d = draft(&env, "Quarterly filing");
    d.repetition = Some(rule(Interval::Quarterly, 1));
    d.starting_datetime = utc(2024, 1, 10);
    d.ending_datetime = utc(2024, 1, 15);
    let source = env.store.insert_task(&d).expect("insert");

    scheduler.run(utc(2024, 2, 1)).expect("bootstrap run");
    scheduler.run(utc(2024, 4, 15)).expect("roll run");

    let conn = env.store.open().expect("conn");
    let mut stmt = conn
        .prepare("SELECT id FROM tasks WHERE id != ?1 ORDER BY id")
        .expect("prepare");
    let clone_ids: Vec<i64> = stmt
        .query_map(params![source.id], |row| row.get(0))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows");
    assert_eq!(clone_ids.len(), 2);

    let bootstrap = env
        .store
        .find_by_id(clone_ids[0])
        .expect("find")
        .expect("row");
    assert_eq!(bootstrap.starting_datetime, source.starting_datetime);
    assert_eq!(bootstrap.ending_datetime, source.ending_datetime);

    let rolled = env
        .store
        .find_by_id(clone_ids[1])
        .expect("find")
        .expect("row");
    assert_eq!(rolled.starting_datetime, utc(2024, 4, 10));
    assert_eq!(rolled.ending_datetime, utc(2024, 4, 15));

    for clone in [&bootstrap, &rolled] {
        assert_ne!(clone.task_unique_id, source.task_unique_id);
        assert_eq!(clone.task_name, source.task_name);
        assert_eq!(clone.status, TaskStatus::Assigned);
        assert_eq!(clone.repetition, source.repetition);
        assert!(!clone.is_reminder_sent);
        assert!(clone.is_repeat);
        assert!(clone.is_repeated);
    }
}

#[test]
fn reminder_run_sends_once_and_is_idempotent_per_flag() {
    let env = env();
    let user_id = env
        .store
        .insert_user("Dana", "dana@example.com")
        .expect("user");
    let notifier = RecordingNotifier::default();
    let scheduler = ReminderScheduler::new(&env.store, &notifier, FRONTEND_URL);

    let mut d = draft(&env, "Submit report");
    d.reminder = Some(rule(Interval::Daily, 2));
    d.ending_datetime = utc(2024, 3, 3);
    d.assignee = Some(Assignee::User(user_id));
    let task = env.store.insert_task(&d).expect("insert");

    let report = scheduler.run(utc(2024, 3, 1)).expect("run");
    assert_eq!(report.matched, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.failed, 0);

    let calls = notifier.calls();
    assert_eq!(calls.len(), 1);
    let (to, template, context) = &calls[0];
    assert_eq!(to, &vec!["dana@example.com".to_string()]);
    assert_eq!(*template, MailTemplate::TaskReminder);
    assert_eq!(
        context["task"]["taskUrl"],
        Value::String(format!("{}/tasks?t={}", FRONTEND_URL, task.task_unique_id))
    );

    let task_after = env.store.find_by_id(task.id).expect("find").expect("row");
    assert!(task_after.is_reminder_sent);

    // The flag gates re-selection; a second run on the same day sends nothing.
    let report = scheduler.run(utc(2024, 3, 1)).expect("run");
    assert_eq!(report.matched, 0);
    assert_eq!(notifier.calls().len(), 1);
}

#[test]
fn team_reminder_fans_out_to_every_member_in_one_dispatch() {
    let env = env();
    let team_id = env.store.insert_team("Finance").expect("team");
    for (name, email) in [
        ("Ana", "ana@example.com"),
        ("Ben", "ben@example.com"),
        ("Cleo", "cleo@example.com"),
    ] {
        let user_id = env.store.insert_user(name, email).expect("user");
        env.store.add_team_member(team_id, user_id).expect("member");
    }
    let notifier = RecordingNotifier::default();
    let scheduler = ReminderScheduler::new(&env.store, &notifier, FRONTEND_URL);

    let mut d = draft(&env, "Close the books");
    d.reminder = Some(rule(Interval::Weekly, 1));
    d.ending_datetime = utc(2024, 3, 8);
    d.assignee = Some(Assignee::Team(team_id));
    env.store.insert_task(&d).expect("insert");

    let report = scheduler.run(utc(2024, 3, 1)).expect("run");
    assert_eq!(report.sent, 1);

    let calls = notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].0,
        vec![
            "ana@example.com".to_string(),
            "ben@example.com".to_string(),
            "cleo@example.com".to_string(),
        ]
    );
}

#[test]
fn matched_task_without_assignee_is_skipped_but_still_marked() {
    let env = env();
    let notifier = RecordingNotifier::default();
    let scheduler = ReminderScheduler::new(&env.store, &notifier, FRONTEND_URL);

    let mut d = draft(&env, "Orphan task");
    d.reminder = Some(rule(Interval::Daily, 1));
    d.ending_datetime = utc(2024, 3, 2);
    let task = env.store.insert_task(&d).expect("insert");

    let report = scheduler.run(utc(2024, 3, 1)).expect("run");
    assert_eq!(report.matched, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(report.skipped_no_recipient, 1);
    assert!(notifier.calls().is_empty());

    let task_after = env.store.find_by_id(task.id).expect("find").expect("row");
    assert!(task_after.is_reminder_sent);
}

#[test]
fn failed_dispatch_is_counted_and_the_flag_still_flips() {
    let env = env();
    let user_id = env
        .store
        .insert_user("Dana", "dana@example.com")
        .expect("user");
    let notifier = FailingNotifier;
    let scheduler = ReminderScheduler::new(&env.store, &notifier, FRONTEND_URL);

    let mut d = draft(&env, "Flaky mail");
    d.reminder = Some(rule(Interval::Daily, 1));
    d.ending_datetime = utc(2024, 3, 2);
    d.assignee = Some(Assignee::User(user_id));
    let task = env.store.insert_task(&d).expect("insert");

    let report = scheduler.run(utc(2024, 3, 1)).expect("run");
    assert_eq!(report.matched, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.sent, 0);

    let task_after = env.store.find_by_id(task.id).expect("find").expect("row");
    assert!(task_after.is_reminder_sent);
}

#[test]
fn archived_and_completed_tasks_are_not_reminder_candidates() {
    let env = env();

    let mut archived = draft(&env, "Archived");
    archived.reminder = Some(rule(Interval::Daily, 1));
    archived.is_archived = true;
    env.store.insert_task(&archived).expect("insert");

    let mut completed = draft(&env, "Completed");
    completed.reminder = Some(rule(Interval::Daily, 1));
    completed.status = TaskStatus::Completed;
    env.store.insert_task(&completed).expect("insert");

    assert!(env.store.reminder_candidates().expect("query").is_empty());
}

#[test]
fn clone_copies_attachments_and_tags_without_duplicating_workspace_tags() {
    let env = env();
    let notifier = RecordingNotifier::default();
    let cloner = OccurrenceCloner::new(&env.store, &notifier, FRONTEND_URL);

    let source = env.store.insert_task(&draft(&env, "Audit pack")).expect("insert");
    env.store
        .add_attachment(source.id, "checklist.pdf", "files/checklist.pdf", Some("application/pdf"))
        .expect("attachment");
    env.store
        .add_attachment(source.id, "notes.txt", "files/notes.txt", None)
        .expect("attachment");
    env.store
        .associate_tags(
            env.workspace_id,
            source.id,
            &[
                "audit".to_string(),
                "finance".to_string(),
                "q1".to_string(),
            ],
        )
        .expect("tags");

    let clone = cloner
        .clone_occurrence(&source, &ClonePlan::duplicate(CreatedBy::Admin(1), false))
        .expect("clone");

    let source_attachments = env.store.attachments_for_task(source.id).expect("query");
    let clone_attachments = env.store.attachments_for_task(clone.id).expect("query");
    assert_eq!(source_attachments.len(), 2);
    assert_eq!(clone_attachments.len(), 2);
    for (original, copy) in source_attachments.iter().zip(&clone_attachments) {
        assert_eq!(copy.file_name, original.file_name);
        assert_eq!(copy.file_path, original.file_path);
        assert_eq!(copy.media_type, original.media_type);
        assert_ne!(copy.attachment_unique_id, original.attachment_unique_id);
    }

    assert_eq!(
        env.store.tags_for_task(clone.id).expect("query"),
        vec!["audit", "finance", "q1"]
    );
    // The workspace tag rows are reused, not re-created.
    assert_eq!(env.store.workspace_tag_count(env.workspace_id).expect("count"), 3);
}

#[test]
fn duplicate_task_resets_scheduler_state_and_notifies_assignment() {
    let env = env();
    let user_id = env
        .store
        .insert_user("Dana", "dana@example.com")
        .expect("user");
    let notifier = RecordingNotifier::default();
    let cloner = OccurrenceCloner::new(&env.store, &notifier, FRONTEND_URL);

    let mut d = draft(&env, "Recurring source");
    d.repetition = Some(rule(Interval::Weekly, 1));
    d.reminder = Some(rule(Interval::Daily, 1));
    d.is_reminder_sent = true;
    d.assignee = Some(Assignee::User(user_id));
    let source = env.store.insert_task(&d).expect("insert");

    let clone = cloner
        .duplicate_task(CreatedBy::User(42), &source.task_unique_id, false)
        .expect("duplicate");

    assert_ne!(clone.task_unique_id, source.task_unique_id);
    assert_eq!(clone.created_by, Some(CreatedBy::User(42)));
    assert_eq!(clone.parent_id, None);
    assert_eq!(clone.repetition, source.repetition);
    assert!(!clone.is_reminder_sent);
    assert!(!clone.is_repeat);
    assert!(!clone.is_repeated);
    assert_eq!(clone.last_repeated_at, None);

    let calls = notifier.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, MailTemplate::TaskAssignment);

    let activities = env.store.activities_for_task(source.id).expect("query");
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].actor, Some(CreatedBy::User(42)));
    assert_eq!(activities[0].body, "user #42 has duplicated a task.");

    let missing = cloner.duplicate_task(CreatedBy::User(42), "Tmissing", false);
    assert!(matches!(missing, Err(SchedulerError::TaskNotFound(_))));
}

#[test]
fn bulk_flag_flip_covers_batches_larger_than_one_chunk() {
    let env = env();
    let mut ids = Vec::new();
    for i in 0..crate::store::FLAG_FLIP_CHUNK + 5 {
        let mut d = draft(&env, &format!("Task {}", i));
        d.reminder = Some(rule(Interval::Daily, 1));
        ids.push(env.store.insert_task(&d).expect("insert").id);
    }

    let changed = env.store.bulk_mark_reminder_sent(&ids).expect("mark");
    assert_eq!(changed, ids.len());
    assert!(env.store.reminder_candidates().expect("query").is_empty());
}

#[test]
fn half_configured_recurrence_is_never_selected() {
    let env = env();
    let task = env.store.insert_task(&draft(&env, "Half configured")).expect("insert");

    // Only reachable through raw SQL; the typed API keeps the pair together.
    let conn = env.store.open().expect("conn");
    conn.execute(
        "UPDATE tasks SET repetition_interval_number = 2 WHERE id = ?1",
        params![task.id],
    )
    .expect("update");

    assert!(env.store.recurring_not_bootstrapped().expect("query").is_empty());
    let row = env.store.find_by_id(task.id).expect("find").expect("row");
    assert_eq!(row.repetition, None);
}

#[test]
fn editing_reminder_or_end_date_reopens_the_scheduling_window() {
    let env = env();

    let mut d = draft(&env, "Rescheduled");
    d.reminder = Some(rule(Interval::Daily, 3));
    d.repetition = Some(rule(Interval::Monthly, 1));
    d.is_reminder_sent = true;
    d.is_repeat = true;
    let task = env.store.insert_task(&d).expect("insert");

    env.store
        .update_reminder_config(task.id, Some(rule(Interval::Weekly, 1)))
        .expect("update");
    let row = env.store.find_by_id(task.id).expect("find").expect("row");
    assert_eq!(row.reminder, Some(rule(Interval::Weekly, 1)));
    assert!(!row.is_reminder_sent);

    env.store.mark_bootstrapped(task.id).expect("mark");
    env.store
        .bulk_mark_reminder_sent(&[task.id])
        .expect("mark sent");

    env.store
        .update_ending_datetime(task.id, utc(2024, 6, 30))
        .expect("update");
    let row = env.store.find_by_id(task.id).expect("find").expect("row");
    assert_eq!(row.ending_datetime, utc(2024, 6, 30));
    assert!(!row.is_reminder_sent);
    assert!(!row.is_repeat);
}
