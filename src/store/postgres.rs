use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{TaskStore, UserStore};
use crate::config::Config;
use crate::error::{AppError, UNIQUE_VIOLATION};
use crate::models::{
    AuditFields, NewUser, Page, SortDirection, SortField, Task, TaskDraft, TaskFilter,
    TaskPriority, TaskQuery, TaskStatus, User,
};

const TASK_COLUMNS: &str = "id, title, description, status, priority, due_date, owner_user_id, \
     is_deleted, deleted_at, created_at, updated_at";

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, created_at, updated_at";

/// PostgreSQL-backed store. Task statements are assembled with `QueryBuilder`
/// so that every one of them goes through `owned_by`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    status: String,
    priority: String,
    due_date: Option<DateTime<Utc>>,
    owner_user_id: Uuid,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Task {
            audit: AuditFields {
                id: row.id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            title: row.title,
            description: row.description,
            status: row.status.parse()?,
            priority: row.priority.parse()?,
            due_date: row.due_date,
            owner_user_id: row.owner_user_id,
            is_deleted: row.is_deleted,
            deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            audit: AuditFields {
                id: row.id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
        }
    }
}

/// Visibility predicate shared by every task statement.
fn owned_by(qb: &mut QueryBuilder<'_, Postgres>, owner: Uuid) {
    qb.push("owner_user_id = ")
        .push_bind(owner)
        .push(" AND is_deleted = FALSE");
}

/// Escapes `LIKE` metacharacters so the term matches literally.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &TaskFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(priority) = filter.priority {
        qb.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(from) = filter.due_from {
        qb.push(" AND due_date >= ").push_bind(from);
    }
    if let Some(to) = filter.due_to {
        qb.push(" AND due_date <= ").push_bind(to);
    }
    if let Some(term) = filter.search_term() {
        qb.push(" AND title ILIKE ")
            .push_bind(format!("%{}%", escape_like(term)));
    }
}

/// Ranks stored names by declaration order instead of alphabetically.
fn push_rank(qb: &mut QueryBuilder<'_, Postgres>, column: &str, names: &[&'static str]) {
    qb.push("CASE ").push(column);
    for (rank, name) in names.iter().enumerate() {
        qb.push(" WHEN '").push(name).push("' THEN ").push(rank);
    }
    qb.push(" END");
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, field: SortField, direction: SortDirection) {
    qb.push(" ORDER BY ");
    match field {
        SortField::Title => {
            qb.push("title");
        }
        SortField::Status => {
            let names = TaskStatus::ALL.map(TaskStatus::as_str);
            push_rank(qb, "status", &names);
        }
        SortField::Priority => {
            let names = TaskPriority::ALL.map(TaskPriority::as_str);
            push_rank(qb, "priority", &names);
        }
        // Postgres puts NULLs last for ASC and first for DESC.
        SortField::DueDate => {
            qb.push("due_date");
        }
        SortField::CreatedAt => {
            qb.push("created_at");
        }
    }
    qb.push(match direction {
        SortDirection::Asc => " ASC",
        SortDirection::Desc => " DESC",
    });
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db) => db.code().as_deref() == Some(UNIQUE_VIOLATION),
        _ => false,
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Unexpected(format!("Failed to run migrations: {}", e)))
    }
}

/// Opens the connection pool, retrying with exponential backoff.
pub async fn connect_with_retry(config: &Config) -> Result<PgPool, AppError> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::Unexpected("DATABASE_URL is not set".into()))?;
    let attempts = config.db_connect_retries.max(1);
    let mut delay = Duration::from_millis(500);

    for attempt in 1..=attempts {
        let result = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.store_timeout)
            .connect(url)
            .await;
        match result {
            Ok(pool) => {
                log::info!("Connected to database on attempt {}", attempt);
                return Ok(pool);
            }
            Err(e) if attempt < attempts => {
                log::warn!(
                    "Database connection attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::StorageUnavailable(
        "no database connection attempts were made".into(),
    ))
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, AppError> {
        let now = Utc::now();
        let sql = format!(
            "INSERT INTO users (id, email, password_hash, first_name, last_name, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::DuplicateEmail
                } else {
                    AppError::from(e)
                }
            })?;
        Ok(row.into())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn insert(&self, owner: Uuid, draft: TaskDraft) -> Result<Task, AppError> {
        let task = Task::new(draft, owner, Utc::now());
        let sql = format!(
            "INSERT INTO tasks (id, title, description, status, priority, due_date, owner_user_id, \
             is_deleted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $8) RETURNING {}",
            TASK_COLUMNS
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(task.audit.id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status.as_str())
            .bind(task.priority.as_str())
            .bind(task.due_date)
            .bind(owner)
            .bind(task.audit.created_at)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn find(&self, owner: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM tasks WHERE id = ", TASK_COLUMNS));
        qb.push_bind(id).push(" AND ");
        owned_by(&mut qb, owner);

        let row: Option<TaskRow> = qb.build_query_as::<TaskRow>().fetch_optional(&self.pool).await?;
        row.map(Task::try_from).transpose()
    }

    async fn list(&self, owner: Uuid, query: &TaskQuery) -> Result<Page<Task>, AppError> {
        // Count and page are read from one snapshot.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM tasks WHERE ");
        owned_by(&mut count, owner);
        push_filters(&mut count, &query.filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&mut *tx).await?;

        let mut select = QueryBuilder::new(format!("SELECT {} FROM tasks WHERE ", TASK_COLUMNS));
        owned_by(&mut select, owner);
        push_filters(&mut select, &query.filter);
        push_order(&mut select, query.sort.field, query.sort.direction);
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.page.size()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.page.offset()).unwrap_or(i64::MAX));
        let rows: Vec<TaskRow> = select.build_query_as::<TaskRow>().fetch_all(&mut *tx).await?;

        tx.commit().await?;

        let items = rows
            .into_iter()
            .map(Task::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            total_count: u64::try_from(total).unwrap_or_default(),
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
        let mut qb = QueryBuilder::new("UPDATE tasks SET title = ");
        qb.push_bind(draft.title)
            .push(", description = ")
            .push_bind(draft.description)
            .push(", status = ")
            .push_bind(draft.status.as_str())
            .push(", priority = ")
            .push_bind(draft.priority.as_str())
            .push(", due_date = ")
            .push_bind(draft.due_date)
            .push(", updated_at = ")
            .push_bind(Utc::now())
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND ");
        owned_by(&mut qb, owner);
        qb.push(" RETURNING ").push(TASK_COLUMNS);

        let row: Option<TaskRow> = qb.build_query_as::<TaskRow>().fetch_optional(&self.pool).await?;
        row.map(Task::try_from).transpose()
    }

    async fn soft_delete(&self, owner: Uuid, id: Uuid) -> Result<bool, AppError> {
        let now = Utc::now();
        let mut qb = QueryBuilder::new("UPDATE tasks SET is_deleted = TRUE, deleted_at = ");
        qb.push_bind(now)
            .push(", updated_at = ")
            .push_bind(now)
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" AND ");
        owned_by(&mut qb, owner);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_done(&self, owner: Uuid, ids: &[Uuid]) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        // Lock the visible rows so a concurrent delete cannot slip in between.
        let mut lock = QueryBuilder::new("SELECT id FROM tasks WHERE id = ANY(");
        lock.push_bind(ids.to_vec()).push(") AND ");
        owned_by(&mut lock, owner);
        lock.push(" FOR UPDATE");
        let locked: Vec<Uuid> = lock.build_query_scalar::<Uuid>().fetch_all(&mut *tx).await?;

        if locked.len() != ids.len() {
            tx.rollback().await?;
            return Ok(false);
        }

        let mut update = QueryBuilder::new("UPDATE tasks SET status = ");
        update
            .push_bind(TaskStatus::Done.as_str())
            .push(", updated_at = ")
            .push_bind(Utc::now())
            .push(" WHERE id = ANY(")
            .push_bind(ids.to_vec())
            .push(") AND ");
        owned_by(&mut update, owner);
        update.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(true)
    }
}
