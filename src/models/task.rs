use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{not_blank, utc, AuditFields, Auditable};
use crate::error::AppError;

/// Represents the status of a task.
///
/// Persisted by symbolic name through `as_str`/`FromStr`, never by ordinal.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskStatus {
    /// Task is yet to be started.
    #[default]
    Todo,
    /// Task is currently being worked on.
    InProgress,
    /// Task is completed.
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::InProgress, TaskStatus::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "Todo",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Done => "Done",
        }
    }
}

/// Represents the priority of a task.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub const ALL: [TaskPriority; 3] = [TaskPriority::Low, TaskPriority::Medium, TaskPriority::High];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
        }
    }
}

macro_rules! stored_name {
    ($ty:ident, $label:literal) => {
        impl FromStr for $ty {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .into_iter()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| AppError::Unexpected(format!("unknown {} '{}'", $label, s)))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

stored_name!(TaskStatus, "task status");
stored_name!(TaskPriority, "task priority");

/// Represents a task entity as stored and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    #[serde(flatten)]
    pub audit: AuditFields,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
    /// The only user who can see or change this task.
    pub owner_user_id: Uuid,
    pub is_deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Auditable for Task {
    fn audit(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

impl Task {
    /// Builds a not-yet-persisted task owned by `owner_user_id`.
    pub fn new(draft: TaskDraft, owner_user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            audit: AuditFields::new(now),
            title: draft.title,
            description: draft.description,
            status: draft.status,
            priority: draft.priority,
            due_date: draft.due_date,
            owner_user_id,
            is_deleted: false,
            deleted_at: None,
        }
    }

    /// Replaces every mutable field with the draft's values.
    pub fn apply(&mut self, draft: TaskDraft) {
        self.title = draft.title;
        self.description = draft.description;
        self.status = draft.status;
        self.priority = draft.priority;
        self.due_date = draft.due_date;
    }
}

/// The caller-controlled fields of a task, used for both create and full update.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDraft {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<DateTime<Utc>>,
}

/// Input structure for creating a task.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTaskRequest {
    /// Must be between 3 and 120 characters and not just whitespace.
    #[validate(length(min = 3, max = 120), custom = "not_blank")]
    pub title: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    /// Defaults to `Todo`.
    #[serde(default)]
    pub status: Option<TaskStatus>,

    /// Defaults to `Medium`.
    #[serde(default)]
    pub priority: Option<TaskPriority>,

    /// Read as UTC when no offset is given.
    #[serde(default, deserialize_with = "utc::deserialize_option")]
    pub due_date: Option<DateTime<Utc>>,
}

impl CreateTaskRequest {
    pub fn into_draft(self) -> TaskDraft {
        TaskDraft {
            title: self.title,
            description: self.description,
            status: self.status.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            due_date: self.due_date,
        }
    }
}

/// Input structure for a full task update. Every field must be resent.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 3, max = 120), custom = "not_blank")]
    pub title: String,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    pub status: TaskStatus,

    pub priority: TaskPriority,

    #[serde(default, deserialize_with = "utc::deserialize_option")]
    pub due_date: Option<DateTime<Utc>>,
}

impl UpdateTaskRequest {
    pub fn into_draft(self) -> TaskDraft {
        TaskDraft {
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            due_date: self.due_date,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkMarkDoneRequest {
    pub task_ids: Vec<Uuid>,
}

/// Query-string parameters accepted when listing tasks.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TaskListQuery {
    /// 1-indexed page number.
    #[serde(default = "default_page_number")]
    #[validate(range(min = 1))]
    pub page_number: u32,
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1))]
    pub page_size: u32,
    /// One of `title`, `status`, `priority`, `dueDate`, `createdAt`.
    pub sort_by: Option<String>,
    /// `asc` or `desc`.
    pub sort_direction: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    #[serde(default, deserialize_with = "utc::deserialize_option")]
    pub due_date_from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "utc::deserialize_option")]
    pub due_date_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
}

fn default_page_number() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

impl TaskListQuery {
    pub fn into_query(self) -> Result<TaskQuery, AppError> {
        Ok(TaskQuery {
            filter: TaskFilter {
                status: self.status,
                priority: self.priority,
                due_from: self.due_date_from,
                due_to: self.due_date_to,
                title_contains: self.search,
            },
            sort: SortSpec::parse(self.sort_by.as_deref(), self.sort_direction.as_deref()),
            page: PageRequest::new(self.page_number, self.page_size)?,
        })
    }
}

/// Optional, AND-combined list filters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub title_contains: Option<String>,
}

impl TaskFilter {
    /// The title search term, or `None` when it is absent or blank.
    pub fn search_term(&self) -> Option<&str> {
        self.title_contains
            .as_deref()
            .filter(|term| !term.trim().is_empty())
    }

    /// Whether a visible task passes every filter that is set.
    pub fn matches(&self, task: &Task) -> bool {
        if self.status.is_some_and(|status| task.status != status) {
            return false;
        }
        if self.priority.is_some_and(|priority| task.priority != priority) {
            return false;
        }
        if let Some(from) = self.due_from {
            if !task.due_date.is_some_and(|due| due >= from) {
                return false;
            }
        }
        if let Some(to) = self.due_to {
            if !task.due_date.is_some_and(|due| due <= to) {
                return false;
            }
        }
        match self.search_term() {
            Some(term) => task.title.to_lowercase().contains(&term.to_lowercase()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    Status,
    Priority,
    DueDate,
    CreatedAt,
}

impl SortField {
    fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "title" => Some(SortField::Title),
            "status" => Some(SortField::Status),
            "priority" => Some(SortField::Priority),
            "duedate" => Some(SortField::DueDate),
            "createdat" => Some(SortField::CreatedAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Single-key ordering for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl SortSpec {
    /// An absent or unknown field falls back to `createdAt` descending; any
    /// direction other than `desc` is ascending.
    pub fn parse(sort_by: Option<&str>, direction: Option<&str>) -> Self {
        match sort_by.and_then(SortField::parse) {
            Some(field) => {
                let direction = match direction {
                    Some(d) if d.trim().eq_ignore_ascii_case("desc") => SortDirection::Desc,
                    _ => SortDirection::Asc,
                };
                Self { field, direction }
            }
            None => Self::default(),
        }
    }
}

/// A 1-indexed page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    number: u32,
    size: u32,
}

impl PageRequest {
    pub fn new(number: u32, size: u32) -> Result<Self, AppError> {
        if number == 0 {
            return Err(AppError::invalid_field("page_number", "must be at least 1"));
        }
        if size == 0 {
            return Err(AppError::invalid_field("page_size", "must be at least 1"));
        }
        Ok(Self { number, size })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}

/// Everything a store needs to answer a list request.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskQuery {
    pub filter: TaskFilter,
    pub sort: SortSpec,
    pub page: PageRequest,
}

impl TaskQuery {
    pub fn first_page(size: u32) -> Result<Self, AppError> {
        Ok(Self {
            filter: TaskFilter::default(),
            sort: SortSpec::default(),
            page: PageRequest::new(1, size)?,
        })
    }
}
