//! Persistence seam between the services and a storage backend.
//!
//! Every task operation takes the caller's id and applies the same visibility
//! rule: a task is reachable only when it belongs to the caller and is not
//! soft-deleted. Anything else is reported as absent.

pub mod memory;
pub mod postgres;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{NewUser, Page, Task, TaskDraft, TaskQuery, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts a user. A taken email yields `AppError::DuplicateEmail`.
    async fn create_user(&self, user: NewUser) -> Result<User, AppError>;

    /// Looks a user up by normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, owner: Uuid, draft: TaskDraft) -> Result<Task, AppError>;

    async fn find(&self, owner: Uuid, id: Uuid) -> Result<Option<Task>, AppError>;

    /// Filters, sorts and pages the caller's visible tasks. `total_count`
    /// reflects the whole filtered set.
    async fn list(&self, owner: Uuid, query: &TaskQuery) -> Result<Page<Task>, AppError>;

    /// Replaces the mutable fields. `None` when the task is not visible.
    async fn update(&self, owner: Uuid, id: Uuid, draft: TaskDraft)
        -> Result<Option<Task>, AppError>;

    /// Returns `false` when nothing visible matched, including a second delete.
    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError>;

    /// Sets every listed task to `Done`, or none of them. `ids` holds no
    /// duplicates. Returns `false` when any id is not visible.
    async fn mark_done(&self, owner: Uuid, ids: &[Uuid]) -> Result<bool, AppError>;
}

/// Runs a store call under a deadline; running out of time is a storage outage.
async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::StorageUnavailable(format!(
            "storage call timed out after {:?}",
            limit
        ))),
    }
}

/// How the services run store calls.
///
/// Every attempt gets its own deadline. Calls that are safe to repeat may be
/// retried after `StorageUnavailable`, with exponential backoff capped at
/// `max_delay`. Inserts are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl CallPolicy {
    pub fn new(timeout: Duration, max_retries: u32) -> Self {
        Self {
            timeout,
            max_retries,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.store_timeout, config.store_max_retries)
    }

    /// Single attempt under the deadline.
    pub async fn once<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        bounded(self.timeout, call).await
    }

    /// Runs an idempotent call, repeating it while storage is unavailable.
    pub async fn retrying<T, F, Fut>(&self, mut call: F) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut retries = 0;
        loop {
            match bounded(self.timeout, call()).await {
                Err(AppError::StorageUnavailable(reason)) if retries < self.max_retries => {
                    let delay = self.backoff(retries);
                    retries += 1;
                    log::warn!(
                        "Storage unavailable ({}), retry {}/{} in {:?}",
                        reason,
                        retries,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(retry))
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_policy(max_retries: u32) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_secs(1),
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    /// Fails with `StorageUnavailable` for the first `failures` calls.
    async fn flaky(calls: &AtomicU32, failures: u32) -> Result<u32, AppError> {
        let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= failures {
            Err(AppError::StorageUnavailable("connection reset".into()))
        } else {
            Ok(call)
        }
    }

    #[tokio::test]
    async fn test_retrying_recovers_from_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3).retrying(|| flaky(&calls, 1)).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retrying_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(2).retrying(|| flaky(&calls, 10)).await;
        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_leaves_other_errors_alone() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .retrying(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::Unexpected("constraint".into()))
            })
            .await;
        assert!(matches!(result, Err(AppError::Unexpected(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_once_does_not_retry() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3).once(flaky(&calls, 1)).await;
        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = CallPolicy::new(Duration::from_secs(1), 10);
        assert_eq!(policy.backoff(0), Duration::from_millis(200));
        assert_eq!(policy.backoff(1), Duration::from_millis(400));
        assert_eq!(policy.backoff(5), Duration::from_secs(5));
        assert_eq!(policy.backoff(40), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let ok = bounded(Duration::from_secs(1), async { Ok::<_, AppError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let err = bounded(Duration::from_secs(1), async {
            Err::<(), _>(AppError::NotFound("Task".into()))
        })
        .await;
        assert!(matches!(err, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_bounded_times_out_as_unavailable() {
        let result = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AppError>(())
        })
        .await;
        assert!(matches!(result, Err(AppError::StorageUnavailable(_))));
    }
}
