use crate::{
    auth::AuthenticatedUserId,
    error::AppError,
    models::{BulkMarkDoneRequest, CreateTaskRequest, TaskListQuery, UpdateTaskRequest},
    tasks::TaskService,
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

fn task_not_found() -> AppError {
    AppError::NotFound("Task".into())
}

/// Retrieves one page of the authenticated user's tasks.
///
/// Soft-deleted tasks and tasks owned by other users are never included.
///
/// ## Query Parameters:
/// - `page_number` (optional, default 1) and `page_size` (optional, default 10): both at least 1.
/// - `sort_by` (optional): `title`, `status`, `priority`, `dueDate` or `createdAt`.
///   Anything else sorts by creation date, newest first.
/// - `sort_direction` (optional): `asc` (default) or `desc`.
/// - `status`, `priority` (optional): exact match, e.g. `InProgress`, `High`.
/// - `due_date_from`, `due_date_to` (optional): inclusive bounds on the due date.
/// - `search` (optional): case-insensitive substring of the title.
///
/// ## Responses:
/// - `200 OK`: `{items, total_count, page_number, page_size}`.
/// - `400 Bad Request`: If a query parameter cannot be parsed.
/// - `401 Unauthorized`: If the request lacks a valid authentication token.
/// - `422 Unprocessable Entity`: If `page_number` or `page_size` is below 1.
#[get("")]
pub async fn get_tasks(
    service: web::Data<TaskService>,
    query_params: web::Query<TaskListQuery>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    query_params.validate()?;
    let query = query_params.into_inner().into_query()?;

    let page = service.list(user.0, &query).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// Creates a new task for the authenticated user.
///
/// ## Request Body:
/// - `title`: 3 to 120 characters (required).
/// - `description` (optional): at most 2000 characters.
/// - `status` (optional): defaults to `Todo`.
/// - `priority` (optional): defaults to `Medium`.
/// - `due_date` (optional): read as UTC when it carries no offset.
///
/// ## Responses:
/// - `201 Created`: Returns the newly created `Task` object as JSON.
/// - `400 Bad Request`: If the body is not valid JSON for this shape.
/// - `401 Unauthorized`: If the request lacks a valid authentication token.
/// - `422 Unprocessable Entity`: If field validation fails (e.g., title too short).
#[post("")]
pub async fn create_task(
    service: web::Data<TaskService>,
    task_data: web::Json<CreateTaskRequest>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;

    let task = service
        .create(user.0, task_data.into_inner().into_draft())
        .await?;
    Ok(HttpResponse::Created().json(task))
}

/// Marks several tasks as done in one all-or-nothing step.
///
/// ## Request Body:
/// `{"task_ids": [uuid, ...]}`
///
/// ## Responses:
/// - `200 OK`: Every task was marked done.
/// - `400 Bad Request`: At least one id is missing, deleted or owned by someone
///   else; no task was changed.
/// - `401 Unauthorized`: If the request lacks a valid authentication token.
#[post("/bulk-mark-done")]
pub async fn bulk_mark_done(
    service: web::Data<TaskService>,
    request: web::Json<BulkMarkDoneRequest>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    if !service.bulk_mark_done(user.0, &request.task_ids).await? {
        return Err(AppError::BadRequest(
            "One or more tasks were not found".into(),
        ));
    }
    Ok(HttpResponse::Ok().json(json!({
        "message": "Tasks marked as done successfully"
    })))
}

/// Retrieves a specific task by its ID.
///
/// ## Path Parameters:
/// - `id`: The UUID of the task to retrieve.
///
/// ## Responses:
/// - `200 OK`: Returns the `Task` object as JSON if found and owned by the user.
/// - `401 Unauthorized`: If the request lacks a valid authentication token.
/// - `404 Not Found`: If the task does not exist, was deleted, or is not owned by the authenticated user.
#[get("/{id}")]
pub async fn get_task(
    service: web::Data<TaskService>,
    task_id: web::Path<Uuid>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    let task = service
        .get(user.0, task_id.into_inner())
        .await?
        .ok_or_else(task_not_found)?;
    Ok(HttpResponse::Ok().json(task))
}

/// Replaces the editable fields of a task.
///
/// ## Path Parameters:
/// - `id`: The UUID of the task to update.
///
/// ## Request Body:
/// `title`, `status` and `priority` are required; `description` and `due_date`
/// are cleared when omitted. Validation rules match `create_task`.
///
/// ## Responses:
/// - `200 OK`: Returns the updated `Task` object as JSON.
/// - `401 Unauthorized`: If the request lacks a valid authentication token.
/// - `404 Not Found`: If the task does not exist, was deleted, or is not owned by the authenticated user.
/// - `422 Unprocessable Entity`: If field validation fails.
#[put("/{id}")]
pub async fn update_task(
    service: web::Data<TaskService>,
    task_id: web::Path<Uuid>,
    task_data: web::Json<UpdateTaskRequest>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;

    let task = service
        .update(user.0, task_id.into_inner(), task_data.into_inner().into_draft())
        .await?
        .ok_or_else(task_not_found)?;
    Ok(HttpResponse::Ok().json(task))
}

/// Soft-deletes a task by its ID.
///
/// ## Path Parameters:
/// - `id`: The UUID of the task to delete.
///
/// ## Responses:
/// - `204 No Content`: On successful deletion.
/// - `401 Unauthorized`: If the request lacks a valid authentication token.
/// - `404 Not Found`: If the task does not exist, was already deleted, or is not owned by the authenticated user.
#[delete("/{id}")]
pub async fn delete_task(
    service: web::Data<TaskService>,
    task_id: web::Path<Uuid>,
    user: AuthenticatedUserId,
) -> Result<impl Responder, AppError> {
    if !service.delete(user.0, task_id.into_inner()).await? {
        return Err(task_not_found());
    }
    Ok(HttpResponse::NoContent().finish())
}
