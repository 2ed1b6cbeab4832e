pub mod task;
pub mod user;
pub mod utc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidationError;

pub use task::{
    BulkMarkDoneRequest, CreateTaskRequest, PageRequest, SortDirection, SortField, SortSpec,
    Task, TaskDraft, TaskFilter, TaskListQuery, TaskPriority, TaskQuery, TaskStatus,
    UpdateTaskRequest,
};
pub use user::{NewUser, User};

/// Rejects text that is empty once surrounding whitespace is removed.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("must not be blank".into());
        return Err(error);
    }
    Ok(())
}

/// Identity and audit timestamps shared by every stored entity.
///
/// Stores set `created_at` once on insert and refresh `updated_at` on every
/// mutating write; services never touch these fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditFields {
    /// Fresh fields for an entity inserted at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}

/// Capability of entities that carry `AuditFields`.
pub trait Auditable {
    fn audit(&self) -> &AuditFields;
    fn audit_mut(&mut self) -> &mut AuditFields;

    fn id(&self) -> Uuid {
        self.audit().id
    }
}

/// One page of a filtered, sorted result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Size of the whole filtered set, independent of paging.
    pub total_count: u64,
    pub page_number: u32,
    pub page_size: u32,
}
