use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::fs;
use std::path::PathBuf;

use crate::task::{generate_unique_id, CreatedBy, IntervalRule, Task, TaskDraft};
use crate::types::SchedulerError;

mod schema;
mod task_rows;

use schema::TASKMGR_SCHEMA;
use task_rows::{format_datetime, insert_task_row, task_from_row, TASK_COLUMNS};

// Well under the sqlite default host-parameter limit, leaving room for the
// leading timestamp parameter.
pub(crate) const FLAG_FLIP_CHUNK: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRecord {
    pub id: i64,
    pub attachment_unique_id: String,
    pub task_id: i64,
    pub file_name: String,
    pub file_path: String,
    pub media_type: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub task_id: i64,
    pub body: String,
    pub activity_type: ActivityType,
    pub actor: Option<CreatedBy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    TaskCreated,
    TaskUpdated,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::TaskCreated => "task_created",
            ActivityType::TaskUpdated => "task_updated",
        }
    }

    fn parse(raw: &str) -> Option<ActivityType> {
        match raw {
            "task_created" => Some(ActivityType::TaskCreated),
            "task_updated" => Some(ActivityType::TaskUpdated),
            _ => None,
        }
    }
}

/// Sqlite-backed task repository. Every scheduler read re-evaluates persisted
/// flag state; nothing is cached between runs.
#[derive(Debug)]
pub struct SqliteTaskStore {
    path: PathBuf,
}

impl SqliteTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, SchedulerError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let store = Self { path };
        let _ = store.open()?;
        Ok(store)
    }

    pub(crate) fn open(&self) -> Result<Connection, SchedulerError> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(TASKMGR_SCHEMA)?;
        Ok(conn)
    }

    // Collaborator rows (workspace/user/team CRUD itself lives outside this
    // engine; these exist so the contracts below operate on real data).

    pub fn insert_workspace(&self, name: &str) -> Result<i64, SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO workspaces (workspace_unique_id, workspace_name) VALUES (?1, ?2)",
            params![generate_unique_id("W"), name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_user(&self, name: &str, email: &str) -> Result<i64, SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO users (user_unique_id, name, email) VALUES (?1, ?2, ?3)",
            params![generate_unique_id("U"), name, email],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_team(&self, name: &str) -> Result<i64, SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO teams (team_unique_id, team_name) VALUES (?1, ?2)",
            params![generate_unique_id("TM"), name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn add_team_member(&self, team_id: i64, user_id: i64) -> Result<(), SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT OR IGNORE INTO team_user_mapping (team_id, user_id) VALUES (?1, ?2)",
            params![team_id, user_id],
        )?;
        Ok(())
    }

    pub fn insert_academic_year(&self, label: &str) -> Result<i64, SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO academic_years (label) VALUES (?1)",
            params![label],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // Task rows.

    pub fn insert_task(&self, draft: &TaskDraft) -> Result<Task, SchedulerError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let id = insert_task_row(&tx, draft, Utc::now())?;
        let task = Self::fetch_task_in(&tx, id)?;
        tx.commit()?;
        Ok(task)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Task>, SchedulerError> {
        let conn = self.open()?;
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row(params![id], |row| Ok(task_from_row(row)))
            .optional()?;
        row.transpose()
    }

    pub fn find_by_unique_id(&self, token: &str) -> Result<Option<Task>, SchedulerError> {
        let conn = self.open()?;
        let sql = format!(
            "SELECT {} FROM tasks WHERE task_unique_id = ?1",
            TASK_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row(params![token], |row| Ok(task_from_row(row)))
            .optional()?;
        row.transpose()
    }

    /// Tasks eligible for a reminder check: both reminder fields configured,
    /// reminder not yet sent, not archived, not completed. The date predicate
    /// itself is evaluated in Rust by the reminder scheduler.
    pub fn reminder_candidates(&self) -> Result<Vec<Task>, SchedulerError> {
        self.select_tasks(
            "reminder_interval_number IS NOT NULL
               AND reminder_interval IS NOT NULL
               AND is_reminder_sent = 0
               AND is_archived = 0
               AND status != 'Completed'",
        )
    }

    /// Recurring tasks whose bootstrap clone has not been produced yet.
    pub fn recurring_not_bootstrapped(&self) -> Result<Vec<Task>, SchedulerError> {
        self.select_tasks(
            "repetition_interval_number IS NOT NULL
               AND repetition_interval IS NOT NULL
               AND is_repeat = 0",
        )
    }

    /// Recurring tasks bootstrapped but not yet rolled forward.
    pub fn recurring_awaiting_roll(&self) -> Result<Vec<Task>, SchedulerError> {
        self.select_tasks(
            "repetition_interval_number IS NOT NULL
               AND repetition_interval IS NOT NULL
               AND is_repeat = 1
               AND is_repeated = 0",
        )
    }

    fn select_tasks(&self, predicate: &str) -> Result<Vec<Task>, SchedulerError> {
        let conn = self.open()?;
        let sql = format!(
            "SELECT {} FROM tasks WHERE {} ORDER BY id",
            TASK_COLUMNS, predicate
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok(task_from_row(row)))?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row??);
        }
        Ok(tasks)
    }

    /// One bulk flag flip after the whole reminder batch has been attempted.
    /// The id list is chunked to stay under sqlite's host-parameter limit;
    /// all chunks commit in one transaction.
    pub fn bulk_mark_reminder_sent(&self, ids: &[i64]) -> Result<usize, SchedulerError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let now = format_datetime(Utc::now());
        let mut changed = 0usize;
        for chunk in ids.chunks(FLAG_FLIP_CHUNK) {
            let placeholders = (0..chunk.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE tasks SET is_reminder_sent = 1, updated_at = ?1 WHERE id IN ({})",
                placeholders
            );
            let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now.clone())];
            for id in chunk {
                values.push(Box::new(*id));
            }
            changed += tx.execute(&sql, params_from_iter(values.iter().map(|v| v.as_ref())))?;
        }
        tx.commit()?;
        Ok(changed)
    }

    pub fn mark_bootstrapped(&self, id: i64) -> Result<(), SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE tasks SET is_repeat = 1, updated_at = ?1 WHERE id = ?2",
            params![format_datetime(Utc::now()), id],
        )?;
        Ok(())
    }

    pub fn mark_rolled(&self, id: i64) -> Result<(), SchedulerError> {
        let now = Utc::now();
        let conn = self.open()?;
        conn.execute(
            "UPDATE tasks SET is_repeated = 1, last_repeated_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![format_datetime(now), id],
        )?;
        Ok(())
    }

    /// Changing the reminder configuration always clears the sent flag; a
    /// stale "sent" must not survive a reschedule.
    pub fn update_reminder_config(
        &self,
        id: i64,
        rule: Option<IntervalRule>,
    ) -> Result<(), SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE tasks SET reminder_interval_number = ?1, reminder_interval = ?2, \
                 is_reminder_sent = 0, updated_at = ?3 WHERE id = ?4",
            params![
                rule.map(|r| i64::from(r.count)),
                rule.map(|r| r.interval.as_str()),
                format_datetime(Utc::now()),
                id
            ],
        )?;
        Ok(())
    }

    /// Moving the end date clears the sent flag and re-opens the recurrence
    /// window for the bootstrap pass.
    pub fn update_ending_datetime(
        &self,
        id: i64,
        ending: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "UPDATE tasks SET ending_datetime = ?1, is_reminder_sent = 0, is_repeat = 0, \
                 updated_at = ?2 WHERE id = ?3",
            params![
                format_datetime(ending),
                format_datetime(Utc::now()),
                id
            ],
        )?;
        Ok(())
    }

    // Attachments and tags.

    pub fn add_attachment(
        &self,
        task_id: i64,
        file_name: &str,
        file_path: &str,
        media_type: Option<&str>,
    ) -> Result<i64, SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO task_attachments (attachment_unique_id, task_id, file_name, file_path, \
                 media_type, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                generate_unique_id("TA"),
                task_id,
                file_name,
                file_path,
                media_type,
                format_datetime(Utc::now()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn attachments_for_task(
        &self,
        task_id: i64,
    ) -> Result<Vec<AttachmentRecord>, SchedulerError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT id, attachment_unique_id, task_id, file_name, file_path, media_type
             FROM task_attachments WHERE task_id = ?1 AND is_deleted = 0 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok(AttachmentRecord {
                id: row.get(0)?,
                attachment_unique_id: row.get(1)?,
                task_id: row.get(2)?,
                file_name: row.get(3)?,
                file_path: row.get(4)?,
                media_type: row.get(5)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn associate_tags(
        &self,
        workspace_id: i64,
        task_id: i64,
        tags: &[String],
    ) -> Result<usize, SchedulerError> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let linked = Self::associate_tags_in(&tx, workspace_id, task_id, tags)?;
        tx.commit()?;
        Ok(linked)
    }

    pub fn tags_for_task(&self, task_id: i64) -> Result<Vec<String>, SchedulerError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT tags.tag FROM task_tags
             JOIN tags ON tags.id = task_tags.tag_id
             WHERE task_tags.task_id = ?1 ORDER BY tags.tag",
        )?;
        let rows = stmt.query_map(params![task_id], |row| row.get::<_, String>(0))?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row?);
        }
        Ok(tags)
    }

    pub fn workspace_tag_count(&self, workspace_id: i64) -> Result<i64, SchedulerError> {
        let conn = self.open()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM tags WHERE workspace_id = ?1",
            params![workspace_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // Recipients.

    pub fn user_email(&self, user_id: i64) -> Result<Option<String>, SchedulerError> {
        let conn = self.open()?;
        let email = conn
            .query_row(
                "SELECT email FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(email)
    }

    pub fn team_member_emails(&self, team_id: i64) -> Result<Vec<String>, SchedulerError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT users.email FROM team_user_mapping
             JOIN users ON users.id = team_user_mapping.user_id
             WHERE team_user_mapping.team_id = ?1 ORDER BY users.id",
        )?;
        let rows = stmt.query_map(params![team_id], |row| row.get::<_, String>(0))?;
        let mut emails = Vec::new();
        for row in rows {
            emails.push(row?);
        }
        Ok(emails)
    }

    // Activity log.

    pub fn record_activity(
        &self,
        task_id: i64,
        body: &str,
        activity_type: ActivityType,
        actor: Option<CreatedBy>,
    ) -> Result<(), SchedulerError> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO task_activities (task_id, body, activity_type, actor_kind, actor_id, \
                 created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                task_id,
                body,
                activity_type.as_str(),
                actor.map(|a| a.kind()),
                actor.map(|a| a.actor_id()),
                format_datetime(Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn activities_for_task(
        &self,
        task_id: i64,
    ) -> Result<Vec<ActivityRecord>, SchedulerError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT task_id, body, activity_type, actor_kind, actor_id
             FROM task_activities WHERE task_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![task_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })?;
        let mut records = Vec::new();
        for row in rows {
            let (task_id, body, type_raw, actor_kind, actor_id) = row?;
            let activity_type = ActivityType::parse(&type_raw).ok_or_else(|| {
                SchedulerError::Storage(format!("unknown activity type '{}'", type_raw))
            })?;
            let actor = match (actor_kind.as_deref(), actor_id) {
                (Some("admin"), Some(id)) => Some(CreatedBy::Admin(id)),
                (Some("super_admin"), Some(id)) => Some(CreatedBy::SuperAdmin(id)),
                (Some("user"), Some(id)) => Some(CreatedBy::User(id)),
                _ => None,
            };
            records.push(ActivityRecord {
                task_id,
                body,
                activity_type,
                actor,
            });
        }
        Ok(records)
    }

    // Transaction-scoped pieces used by the occurrence cloner. The clone row,
    // its attachment copies and its tag links commit or roll back together.

    pub(crate) fn insert_task_in(
        tx: &Transaction<'_>,
        draft: &TaskDraft,
    ) -> Result<i64, SchedulerError> {
        insert_task_row(tx, draft, Utc::now())
    }

    pub(crate) fn fetch_task_in(tx: &Transaction<'_>, id: i64) -> Result<Task, SchedulerError> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        let mut stmt = tx.prepare(&sql)?;
        stmt.query_row(params![id], |row| Ok(task_from_row(row)))?
    }

    /// Copy every non-deleted attachment row of `source_task_id` onto
    /// `dest_task_id`, each with a fresh public token. The source rows are
    /// never touched; the underlying file bytes belong to the storage layer.
    pub(crate) fn copy_attachments_in(
        tx: &Transaction<'_>,
        source_task_id: i64,
        dest_task_id: i64,
    ) -> Result<usize, SchedulerError> {
        let mut select = tx.prepare(
            "SELECT file_name, file_path, media_type FROM task_attachments
             WHERE task_id = ?1 AND is_deleted = 0 ORDER BY id",
        )?;
        let rows = select.query_map(params![source_task_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;
        let now = format_datetime(Utc::now());
        let mut insert = tx.prepare(
            "INSERT INTO task_attachments (attachment_unique_id, task_id, file_name, file_path, \
                 media_type, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut copied = 0usize;
        for row in rows {
            let (file_name, file_path, media_type) = row?;
            insert.execute(params![
                generate_unique_id("TA"),
                dest_task_id,
                file_name,
                file_path,
                media_type,
                now,
            ])?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Associate `tags` with `dest_task_id`, creating missing workspace tag
    /// rows. Dedup-on-write both ways: no duplicate tag rows per workspace,
    /// no duplicate links per task.
    pub(crate) fn associate_tags_in(
        tx: &Transaction<'_>,
        workspace_id: i64,
        dest_task_id: i64,
        tags: &[String],
    ) -> Result<usize, SchedulerError> {
        let mut seen: Vec<String> = Vec::new();
        let mut linked = 0usize;
        for raw in tags {
            let tag = raw.trim();
            if tag.is_empty() || seen.iter().any(|s| s == tag) {
                continue;
            }
            seen.push(tag.to_string());
            tx.execute(
                "INSERT OR IGNORE INTO tags (workspace_id, tag) VALUES (?1, ?2)",
                params![workspace_id, tag],
            )?;
            let tag_id: i64 = tx.query_row(
                "SELECT id FROM tags WHERE workspace_id = ?1 AND tag = ?2",
                params![workspace_id, tag],
                |row| row.get(0),
            )?;
            linked += tx.execute(
                "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
                params![dest_task_id, tag_id],
            )?;
        }
        Ok(linked)
    }
}
