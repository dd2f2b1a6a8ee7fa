use crate::{
    auth::AuthenticatedUser,
    crud::{delete_owned, fetch_owned, list_owned},
    db::DbSession,
    error::AppError,
    models::{Tag, Task, TaskInput, TaskQuery},
};
use actix_web::{delete, get, patch, post, put, web, HttpResponse, Responder};
use sqlx::Connection;
use uuid::Uuid;
use validator::Validate;

/// Retrieves a list of tasks for the authenticated user.
///
/// Tasks are ordered by creation date in descending order.
///
/// ## Query Parameters:
/// - `completed` (optional): `true` or `false`.
/// - `priority` (optional): `low`, `medium` or `high`.
/// - `search` (optional): Case-insensitive match on title or description.
/// - `tag_id` (optional): Only tasks carrying this tag.
/// - `limit` (optional, 1-100, default 50) and `offset` (optional, default 0).
///
/// ## Responses:
/// - `200 OK`: A JSON array of `Task` objects.
/// - `401 Unauthorized`: If the request lacks a valid authentication token.
/// - `422 Unprocessable Entity`: If a query parameter is out of range.
#[get("")]
pub async fn get_tasks(
    user: AuthenticatedUser,
    query_params: web::Query<TaskQuery>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    query_params.validate()?;

    let mut tasks: Vec<Task> = list_owned(session.conn(), user.id(), &*query_params).await?;
    Task::load_tags(session.conn(), &mut tasks).await?;

    Ok(HttpResponse::Ok().json(tasks))
}

/// Creates a new task for the authenticated user.
///
/// The task and its tag associations are written in one transaction.
///
/// ## Responses:
/// - `201 Created`: The new `Task`.
/// - `403 Forbidden`: A tag in `tag_ids` belongs to another user.
/// - `404 Not Found`: A tag in `tag_ids` does not exist.
/// - `422 Unprocessable Entity`: If input validation on `TaskInput` fails.
#[post("")]
pub async fn create_task(
    user: AuthenticatedUser,
    task_data: web::Json<TaskInput>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;
    let input = task_data.into_inner();
    let tag_ids = dedup(&input.tag_ids);

    let mut tx = session.conn().begin().await?;
    Tag::ensure_all_owned(&mut *tx, &tag_ids, user.id()).await?;
    let mut task = Task::insert(&mut *tx, &input, user.id()).await?;
    Task::set_tags(&mut *tx, task.id, &tag_ids).await?;
    tx.commit().await?;

    task.tag_ids = sorted(tag_ids);
    Ok(HttpResponse::Created().json(task))
}

/// Retrieves a specific task by its ID.
///
/// ## Responses:
/// - `200 OK`: The `Task`.
/// - `403 Forbidden`: The task belongs to another user.
/// - `404 Not Found`: No task with this ID.
#[get("/{id}")]
pub async fn get_task(
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    let mut task: Task = fetch_owned(session.conn(), task_id.into_inner(), user.id()).await?;
    Task::load_tags(session.conn(), std::slice::from_mut(&mut task)).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Replaces a task's editable fields and its tag set.
///
/// ## Responses:
/// - `200 OK`: The updated `Task`.
/// - `403 Forbidden`: The task, or a tag in `tag_ids`, belongs to another user.
/// - `404 Not Found`: No task with this ID, or an unknown tag.
/// - `422 Unprocessable Entity`: If input validation on `TaskInput` fails.
#[put("/{id}")]
pub async fn update_task(
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
    task_data: web::Json<TaskInput>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    task_data.validate()?;
    let task_id = task_id.into_inner();
    let input = task_data.into_inner();
    let tag_ids = dedup(&input.tag_ids);

    let mut tx = session.conn().begin().await?;
    fetch_owned::<Task>(&mut *tx, task_id, user.id()).await?;
    Tag::ensure_all_owned(&mut *tx, &tag_ids, user.id()).await?;
    let mut task = Task::replace(&mut *tx, task_id, &input, user.id()).await?;
    Task::set_tags(&mut *tx, task_id, &tag_ids).await?;
    tx.commit().await?;

    task.tag_ids = sorted(tag_ids);
    Ok(HttpResponse::Ok().json(task))
}

/// Flips a task's `completed` flag.
#[patch("/{id}/toggle")]
pub async fn toggle_task(
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    let task_id = task_id.into_inner();
    fetch_owned::<Task>(session.conn(), task_id, user.id()).await?;

    let mut task = Task::toggle_completed(session.conn(), task_id, user.id()).await?;
    Task::load_tags(session.conn(), std::slice::from_mut(&mut task)).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// Deletes a task by its ID, together with its tag associations.
///
/// ## Responses:
/// - `204 No Content`: On successful deletion.
/// - `403 Forbidden`: The task belongs to another user.
/// - `404 Not Found`: No task with this ID.
#[delete("/{id}")]
pub async fn delete_task(
    user: AuthenticatedUser,
    task_id: web::Path<Uuid>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    delete_owned::<Task>(session.conn(), task_id.into_inner(), user.id()).await?;
    Ok(HttpResponse::NoContent().finish())
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    unique
}

// Matches the ordering `Task::load_tags` returns.
fn sorted(mut ids: Vec<Uuid>) -> Vec<Uuid> {
    ids.sort();
    ids
}
