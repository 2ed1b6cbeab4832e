//! Task lifecycle for an authenticated caller.
//!
//! Every operation takes the caller's id and passes it to the store, which
//! only ever touches that caller's live tasks. A task owned by someone else
//! and a task that does not exist are indistinguishable here.

use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Auditable, Page, Task, TaskDraft, TaskQuery};
use crate::store::{CallPolicy, TaskStore};

#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    calls: CallPolicy,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>, calls: CallPolicy) -> Self {
        Self { store, calls }
    }

    pub async fn create(&self, user_id: Uuid, draft: TaskDraft) -> Result<Task, AppError> {
        let task = self.calls.once(self.store.insert(user_id, draft)).await?;
        log::info!("User {} created task {}", user_id, task.id());
        Ok(task)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
        self.calls.retrying(|| self.store.find(user_id, id)).await
    }

    pub async fn list(&self, user_id: Uuid, query: &TaskQuery) -> Result<Page<Task>, AppError> {
        let page = self.calls.retrying(|| self.store.list(user_id, query)).await?;
        log::debug!(
            "User {} listed {} of {} tasks (page {})",
            user_id,
            page.items.len(),
            page.total_count,
            page.page_number
        );
        Ok(page)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        draft: TaskDraft,
    ) -> Result<Option<Task>, AppError> {
        let updated = self
            .calls
            .retrying(|| self.store.update(user_id, id, draft.clone()))
            .await?;
        if updated.is_some() {
            log::info!("User {} updated task {}", user_id, id);
        }
        Ok(updated)
    }

    /// Soft delete. `false` when the task is not visible to the caller.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<bool, AppError> {
        let deleted = self
            .calls
            .retrying(|| self.store.soft_delete(user_id, id))
            .await?;
        if deleted {
            log::info!("User {} deleted task {}", user_id, id);
        }
        Ok(deleted)
    }

    /// Marks every listed task done, or none of them.
    ///
    /// Repeated ids count once. An empty list succeeds without touching the store.
    pub async fn bulk_mark_done(&self, user_id: Uuid, ids: &[Uuid]) -> Result<bool, AppError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<Uuid> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if unique.is_empty() {
            return Ok(true);
        }

        let done = self
            .calls
            .retrying(|| self.store.mark_done(user_id, &unique))
            .await?;
        if done {
            log::info!("User {} marked {} tasks done", user_id, unique.len());
        } else {
            log::info!(
                "User {} bulk mark-done rejected: not every task was found",
                user_id
            );
        }
        Ok(done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CreateTaskRequest, PageRequest, SortSpec, TaskFilter, TaskPriority, TaskStatus,
    };
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn service() -> TaskService {
        TaskService::new(
            Arc::new(MemoryStore::new()),
            CallPolicy::new(Duration::from_secs(5), 0),
        )
    }

    fn draft(title: &str) -> TaskDraft {
        CreateTaskRequest {
            title: title.to_string(),
            description: None,
            status: None,
            priority: None,
            due_date: None,
        }
        .into_draft()
    }

    fn first_page(size: u32) -> TaskQuery {
        TaskQuery::first_page(size).unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let service = service();
        let user = Uuid::new_v4();
        let mut input = draft("Test Task");
        input.priority = TaskPriority::High;

        let created = service.create(user, input).await.unwrap();
        let fetched = service.get(user, created.id()).await.unwrap().unwrap();

        assert_eq!(fetched.title, "Test Task");
        assert_eq!(fetched.status, TaskStatus::Todo);
        assert_eq!(fetched.priority, TaskPriority::High);
        assert_eq!(fetched.owner_user_id, user);
        assert!(!fetched.is_deleted);
        assert_eq!(fetched.audit.created_at, fetched.audit.updated_at);
    }

    #[tokio::test]
    async fn test_other_users_cannot_see_or_change_task() {
        let service = service();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let task = service.create(alice, draft("Private")).await.unwrap();

        assert!(service.get(bob, task.id()).await.unwrap().is_none());
        assert!(service
            .update(bob, task.id(), draft("Mine now"))
            .await
            .unwrap()
            .is_none());
        assert!(!service.delete(bob, task.id()).await.unwrap());
        assert_eq!(service.list(bob, &first_page(10)).await.unwrap().total_count, 0);
    }

    #[tokio::test]
    async fn test_update_replaces_fields() {
        let service = service();
        let user = Uuid::new_v4();
        let task = service.create(user, draft("Original")).await.unwrap();

        let mut replacement = draft("Replaced");
        replacement.status = TaskStatus::InProgress;
        replacement.description = Some("now with details".into());
        let updated = service
            .update(user, task.id(), replacement)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.title, "Replaced");
        assert_eq!(updated.status, TaskStatus::InProgress);
        assert_eq!(updated.description.as_deref(), Some("now with details"));
        assert_eq!(updated.audit.created_at, task.audit.created_at);
        assert!(updated.audit.updated_at >= task.audit.updated_at);
    }

    #[tokio::test]
    async fn test_delete_is_not_repeatable() {
        let service = service();
        let user = Uuid::new_v4();
        let task = service.create(user, draft("Short lived")).await.unwrap();

        assert!(service.delete(user, task.id()).await.unwrap());
        assert!(!service.delete(user, task.id()).await.unwrap());
        assert!(service.get(user, task.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_defaults_to_newest_first() {
        let service = service();
        let user = Uuid::new_v4();
        for i in 0..5 {
            service.create(user, draft(&format!("Task {}", i))).await.unwrap();
        }

        let page = service.list(user, &first_page(10)).await.unwrap();
        assert_eq!(page.total_count, 5);
        assert!(page
            .items
            .windows(2)
            .all(|pair| pair[0].audit.created_at >= pair[1].audit.created_at));
    }

    #[tokio::test]
    async fn test_pages_reconstruct_filtered_set() {
        let service = service();
        let user = Uuid::new_v4();
        for i in 0..12 {
            let mut input = draft(&format!("Item {:02}", i));
            if i % 3 == 0 {
                input.status = TaskStatus::Done;
            }
            service.create(user, input).await.unwrap();
        }

        let filter = TaskFilter {
            status: Some(TaskStatus::Todo),
            ..Default::default()
        };
        let sort = SortSpec::parse(Some("title"), None);
        let mut titles = Vec::new();
        for number in 1..=4 {
            let query = TaskQuery {
                filter: filter.clone(),
                sort,
                page: PageRequest::new(number, 3).unwrap(),
            };
            let page = service.list(user, &query).await.unwrap();
            assert_eq!(page.total_count, 8);
            assert!(page.items.len() <= 3);
            titles.extend(page.items.into_iter().map(|task| task.title));
        }

        let expected: Vec<String> = (0..12)
            .filter(|i| i % 3 != 0)
            .map(|i| format!("Item {:02}", i))
            .collect();
        assert_eq!(titles, expected);
    }

    #[tokio::test]
    async fn test_bulk_mark_done_with_foreign_task_changes_nothing() {
        let service = service();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let x = service.create(alice, draft("X")).await.unwrap();
        let y = service.create(bob, draft("Y")).await.unwrap();

        assert!(!service.bulk_mark_done(alice, &[x.id(), y.id()]).await.unwrap());
        let x_after = service.get(alice, x.id()).await.unwrap().unwrap();
        assert_eq!(x_after.status, TaskStatus::Todo);
        assert_eq!(x_after.audit.updated_at, x.audit.updated_at);
    }

    #[tokio::test]
    async fn test_bulk_mark_done_collapses_duplicates() {
        let service = service();
        let user = Uuid::new_v4();
        let a = service.create(user, draft("A")).await.unwrap();
        let b = service.create(user, draft("B")).await.unwrap();

        assert!(service
            .bulk_mark_done(user, &[a.id(), b.id(), a.id()])
            .await
            .unwrap());
        for id in [a.id(), b.id()] {
            let task = service.get(user, id).await.unwrap().unwrap();
            assert_eq!(task.status, TaskStatus::Done);
        }
    }

    #[tokio::test]
    async fn test_bulk_mark_done_with_no_ids_succeeds() {
        assert!(service()
            .bulk_mark_done(Uuid::new_v4(), &[])
            .await
            .unwrap());
    }

    /// Reports storage as unavailable for the first `outages` reads and writes.
    struct FlakyStore {
        inner: MemoryStore,
        outages: AtomicU32,
    }

    impl FlakyStore {
        fn new(outages: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                outages: AtomicU32::new(outages),
            }
        }

        fn trip(&self) -> Result<(), AppError> {
            let outage = self
                .outages
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
            match outage {
                Ok(_) => Err(AppError::StorageUnavailable("connection reset".into())),
                Err(_) => Ok(()),
            }
        }
    }

    #[async_trait]
    impl TaskStore for FlakyStore {
        async fn insert(&self, owner: Uuid, draft: TaskDraft) -> Result<Task, AppError> {
            self.trip()?;
            self.inner.insert(owner, draft).await
        }

        async fn find(&self, owner: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
            self.trip()?;
            self.inner.find(owner, id).await
        }

        async fn list(&self, owner: Uuid, query: &TaskQuery) -> Result<Page<Task>, AppError> {
            self.trip()?;
            self.inner.list(owner, query).await
        }

        async fn update(
            &self,
            owner: Uuid,
            id: Uuid,
            draft: TaskDraft,
        ) -> Result<Option<Task>, AppError> {
            self.trip()?;
            self.inner.update(owner, id, draft).await
        }

        async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError> {
            self.trip()?;
            self.inner.soft_delete(owner, id).await
        }

        async fn mark_done(&self, owner: Uuid, ids: &[Uuid]) -> Result<bool, AppError> {
            self.trip()?;
            self.inner.mark_done(owner, ids).await
        }
    }

    fn flaky_service(store: Arc<FlakyStore>, max_retries: u32) -> TaskService {
        let mut calls = CallPolicy::new(Duration::from_secs(5), max_retries);
        calls.base_delay = Duration::from_millis(1);
        TaskService::new(store, calls)
    }

    #[tokio::test]
    async fn test_reads_and_updates_survive_a_transient_outage() {
        let store = Arc::new(FlakyStore::new(0));
        let service = flaky_service(store.clone(), 3);
        let user = Uuid::new_v4();
        let task = service.create(user, draft("Flaky")).await.unwrap();

        store.outages.store(1, Ordering::SeqCst);
        assert!(service.get(user, task.id()).await.unwrap().is_some());

        store.outages.store(1, Ordering::SeqCst);
        assert_eq!(service.list(user, &first_page(10)).await.unwrap().total_count, 1);

        store.outages.store(1, Ordering::SeqCst);
        assert!(service.bulk_mark_done(user, &[task.id()]).await.unwrap());

        store.outages.store(1, Ordering::SeqCst);
        assert!(service.delete(user, task.id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_is_not_retried() {
        let store = Arc::new(FlakyStore::new(1));
        let service = flaky_service(store.clone(), 3);
        let user = Uuid::new_v4();

        let result = service.create(user, draft("Once only")).await;
        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
        assert_eq!(service.list(user, &first_page(10)).await.unwrap().total_count, 0);
    }

    #[tokio::test]
    async fn test_outage_longer_than_retries_is_reported() {
        let store = Arc::new(FlakyStore::new(5));
        let service = flaky_service(store, 2);

        let result = service.get(Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    }
}
