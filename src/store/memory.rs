use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{TaskStore, UserStore};
use crate::error::AppError;
use crate::models::{
    AuditFields, Auditable, NewUser, Page, SortDirection, SortField, SortSpec, Task, TaskDraft,
    TaskQuery, TaskStatus, User,
};

/// In-process store with the same observable semantics as `PgStore`.
///
/// Tasks are kept in insertion order, so equal sort keys come back in the
/// order they were created.
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    tasks: RwLock<Vec<Task>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }
}

fn visible(task: &Task, owner: Uuid) -> bool {
    task.owner_user_id == owner && !task.is_deleted
}

fn compare(sort: SortSpec, a: &Task, b: &Task) -> Ordering {
    let ordering = match sort.field {
        SortField::Title => a.title.cmp(&b.title),
        SortField::Status => a.status.cmp(&b.status),
        SortField::Priority => a.priority.cmp(&b.priority),
        // Missing due dates rank above every date, as in Postgres.
        SortField::DueDate => {
            (a.due_date.is_none(), a.due_date).cmp(&(b.due_date.is_none(), b.due_date))
        }
        SortField::CreatedAt => a.audit.created_at.cmp(&b.audit.created_at),
    };
    match sort.direction {
        SortDirection::Asc => ordering,
        SortDirection::Desc => ordering.reverse(),
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Err(AppError::DuplicateEmail);
        }
        let created = User {
            audit: AuditFields::new(Utc::now()),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
        };
        users.insert(created.email.clone(), created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(email).cloned())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert(&self, owner: Uuid, draft: TaskDraft) -> Result<Task, AppError> {
        let task = Task::new(draft, owner, Utc::now());
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn find(&self, owner: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .find(|task| task.id() == id && visible(task, owner))
            .cloned())
    }

    async fn list(&self, owner: Uuid, query: &TaskQuery) -> Result<Page<Task>, AppError> {
        let tasks = self.tasks.read().await;
        let mut matching: Vec<&Task> = tasks
            .iter()
            .filter(|task| visible(task, owner) && query.filter.matches(task))
            .collect();
        matching.sort_by(|a, b| compare(query.sort, a, b));

        let offset = usize::try_from(query.page.offset()).unwrap_or(usize::MAX);
        let size = usize::try_from(query.page.size()).unwrap_or(usize::MAX);
        Ok(Page {
            total_count: matching.len() as u64,
            items: matching.into_iter().skip(offset).take(size).cloned().collect(),
            page_number: query.page.number(),
            page_size: query.page.size(),
        })
    }

    async fn update(
        &self,
        owner: Uuid,
        id: Uuid,
        draft: TaskDraft,
    ) -> Result<Option<Task>, AppError> {
        let mut tasks = self.tasks.write().await;
        match tasks
            .iter_mut()
            .find(|task| task.id() == id && visible(task, owner))
        {
            Some(task) => {
                task.apply(draft);
                task.audit_mut().touch(Utc::now());
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError> {
        let mut tasks = self.tasks.write().await;
        match tasks
            .iter_mut()
            .find(|task| task.id() == id && visible(task, owner))
        {
            Some(task) => {
                let now = Utc::now();
                task.is_deleted = true;
                task.deleted_at = Some(now);
                task.audit_mut().touch(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_done(&self, owner: Uuid, ids: &[Uuid]) -> Result<bool, AppError> {
        let wanted: HashSet<Uuid> = ids.iter().copied().collect();
        let mut tasks = self.tasks.write().await;

        let found = tasks
            .iter()
            .filter(|task| visible(task, owner) && wanted.contains(&task.id()))
            .count();
        if found != wanted.len() {
            return Ok(false);
        }

        let now = Utc::now();
        for task in tasks
            .iter_mut()
            .filter(|task| visible(task, owner) && wanted.contains(&task.id()))
        {
            task.status = TaskStatus::Done;
            task.audit_mut().touch(now);
        }
        Ok(true)
    }
}
