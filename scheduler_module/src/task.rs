use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Calendar interval used by both reminder and repetition settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interval {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
    Ongoing,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Daily => "Daily",
            Interval::Weekly => "Weekly",
            Interval::Monthly => "Monthly",
            Interval::Quarterly => "Quarterly",
            Interval::Yearly => "Yearly",
            Interval::Ongoing => "Ongoing",
        }
    }

    pub fn parse(raw: &str) -> Option<Interval> {
        match raw {
            "Daily" => Some(Interval::Daily),
            "Weekly" => Some(Interval::Weekly),
            "Monthly" => Some(Interval::Monthly),
            "Quarterly" => Some(Interval::Quarterly),
            "Yearly" => Some(Interval::Yearly),
            "Ongoing" | "ongoing" => Some(Interval::Ongoing),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    NotAssigned,
    Assigned,
    Started,
    FollowUp,
    Completed,
    Checked,
    NotApplicable,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotAssigned => "Not assigned",
            TaskStatus::Assigned => "Assigned",
            TaskStatus::Started => "Started",
            TaskStatus::FollowUp => "Follow up",
            TaskStatus::Completed => "Completed",
            TaskStatus::Checked => "Checked",
            TaskStatus::NotApplicable => "Not applicable",
        }
    }

    pub fn parse(raw: &str) -> Option<TaskStatus> {
        match raw {
            "Not assigned" => Some(TaskStatus::NotAssigned),
            "Assigned" => Some(TaskStatus::Assigned),
            "Started" => Some(TaskStatus::Started),
            "Follow up" => Some(TaskStatus::FollowUp),
            "Completed" => Some(TaskStatus::Completed),
            "Checked" => Some(TaskStatus::Checked),
            "Not applicable" => Some(TaskStatus::NotApplicable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    Urgent,
    High,
    Normal,
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Urgent => "Urgent",
            TaskPriority::High => "High",
            TaskPriority::Normal => "Normal",
            TaskPriority::Low => "Low",
        }
    }

    pub fn parse(raw: &str) -> Option<TaskPriority> {
        match raw {
            "Urgent" => Some(TaskPriority::Urgent),
            "High" => Some(TaskPriority::High),
            "Normal" => Some(TaskPriority::Normal),
            "Low" => Some(TaskPriority::Low),
            _ => None,
        }
    }
}

/// Who a task is assigned to. A task is assigned to a user or a team, never
/// both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Assignee {
    User(i64),
    Team(i64),
}

/// Which actor created a task (or initiated a duplicate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum CreatedBy {
    Admin(i64),
    SuperAdmin(i64),
    User(i64),
}

impl CreatedBy {
    pub fn kind(&self) -> &'static str {
        match self {
            CreatedBy::Admin(_) => "admin",
            CreatedBy::SuperAdmin(_) => "super_admin",
            CreatedBy::User(_) => "user",
        }
    }

    pub fn actor_id(&self) -> i64 {
        match self {
            CreatedBy::Admin(id) | CreatedBy::SuperAdmin(id) | CreatedBy::User(id) => *id,
        }
    }
}

/// A reminder or repetition setting: `count` steps of `interval`.
///
/// Both halves are co-required; a rule only exists when the interval and the
/// step count are both present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalRule {
    pub interval: Interval,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub task_unique_id: String,
    pub task_name: String,
    pub task_description: String,
    pub priority: Option<TaskPriority>,
    pub status: TaskStatus,
    pub starting_datetime: DateTime<Utc>,
    pub ending_datetime: DateTime<Utc>,
    pub to_be_done_at_from: Option<NaiveTime>,
    pub to_be_done_at_to: Option<NaiveTime>,
    pub estimated_time_seconds: Option<i64>,
    pub is_archived: bool,
    pub parent_id: Option<i64>,
    pub workspace_id: i64,
    pub academic_year_id: i64,
    pub assignee: Option<Assignee>,
    pub created_by: Option<CreatedBy>,
    pub reminder: Option<IntervalRule>,
    pub is_reminder_sent: bool,
    pub repetition: Option<IntervalRule>,
    pub is_repeat: bool,
    pub is_repeated: bool,
    pub last_repeated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A task row about to be inserted: everything except the identity the store
/// assigns on insert.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub task_unique_id: String,
    pub task_name: String,
    pub task_description: String,
    pub priority: Option<TaskPriority>,
    pub status: TaskStatus,
    pub starting_datetime: DateTime<Utc>,
    pub ending_datetime: DateTime<Utc>,
    pub to_be_done_at_from: Option<NaiveTime>,
    pub to_be_done_at_to: Option<NaiveTime>,
    pub estimated_time_seconds: Option<i64>,
    pub is_archived: bool,
    pub parent_id: Option<i64>,
    pub workspace_id: i64,
    pub academic_year_id: i64,
    pub assignee: Option<Assignee>,
    pub created_by: Option<CreatedBy>,
    pub reminder: Option<IntervalRule>,
    pub is_reminder_sent: bool,
    pub repetition: Option<IntervalRule>,
    pub is_repeat: bool,
    pub is_repeated: bool,
    pub last_repeated_at: Option<DateTime<Utc>>,
}

/// Public-facing token: prefix, four random bytes as hex, unix seconds.
/// Assigned at creation and never mutated afterwards.
pub fn generate_unique_id(prefix: &str) -> String {
    let bytes: [u8; 4] = rand::random();
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}{}", prefix, hex, Utc::now().timestamp())
}
