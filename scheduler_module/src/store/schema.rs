pub(super) const TASKMGR_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS workspaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_unique_id TEXT NOT NULL UNIQUE,
    workspace_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_unique_id TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    email TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    team_unique_id TEXT NOT NULL UNIQUE,
    team_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS team_user_mapping (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    UNIQUE (team_id, user_id)
);

CREATE TABLE IF NOT EXISTS academic_years (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_unique_id TEXT NOT NULL UNIQUE,
    task_name TEXT NOT NULL,
    task_description TEXT NOT NULL DEFAULT '',
    priority TEXT,
    status TEXT NOT NULL,
    starting_datetime TEXT NOT NULL,
    ending_datetime TEXT NOT NULL,
    to_be_done_at_from TEXT,
    to_be_done_at_to TEXT,
    estimated_time_seconds INTEGER,
    is_archived INTEGER NOT NULL DEFAULT 0,
    parent_id INTEGER REFERENCES tasks(id) ON DELETE CASCADE,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    academic_year_id INTEGER NOT NULL REFERENCES academic_years(id),
    assigned_user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
    assigned_team_id INTEGER REFERENCES teams(id) ON DELETE CASCADE,
    created_by_kind TEXT,
    created_by_id INTEGER,
    reminder_interval_number INTEGER,
    reminder_interval TEXT,
    is_reminder_sent INTEGER NOT NULL DEFAULT 0,
    repetition_interval_number INTEGER,
    repetition_interval TEXT,
    is_repeat INTEGER NOT NULL DEFAULT 0,
    is_repeated INTEGER NOT NULL DEFAULT 0,
    last_repeated_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (assigned_user_id IS NULL OR assigned_team_id IS NULL)
);

CREATE TABLE IF NOT EXISTS task_attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    attachment_unique_id TEXT NOT NULL UNIQUE,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    file_name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    media_type TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    workspace_id INTEGER NOT NULL REFERENCES workspaces(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    UNIQUE (workspace_id, tag)
);

CREATE TABLE IF NOT EXISTS task_tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
    UNIQUE (task_id, tag_id)
);

CREATE TABLE IF NOT EXISTS task_activities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    activity_type TEXT NOT NULL,
    actor_kind TEXT,
    actor_id INTEGER,
    created_at TEXT NOT NULL
);
"#;
