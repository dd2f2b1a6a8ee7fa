use crate::{
    auth::AuthenticatedUser,
    crud::{delete_owned, fetch_owned, list_owned},
    db::DbSession,
    error::AppError,
    models::{Tag, TagInput, TagQuery},
};
use actix_web::{delete, get, post, put, web, HttpResponse, Responder};
use uuid::Uuid;
use validator::Validate;

/// Lists the authenticated user's tags alphabetically.
///
/// ## Query Parameters:
/// - `limit` (optional, 1-100, default 50) and `offset` (optional, default 0).
#[get("")]
pub async fn get_tags(
    user: AuthenticatedUser,
    query_params: web::Query<TagQuery>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    query_params.validate()?;
    let tags: Vec<Tag> = list_owned(session.conn(), user.id(), &*query_params).await?;
    Ok(HttpResponse::Ok().json(tags))
}

/// Creates a tag.
///
/// ## Responses:
/// - `201 Created`: The new `Tag`.
/// - `409 Conflict`: The user already has a tag with this name.
/// - `422 Unprocessable Entity`: Invalid name or color.
#[post("")]
pub async fn create_tag(
    user: AuthenticatedUser,
    tag_data: web::Json<TagInput>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    tag_data.validate()?;

    if Tag::name_taken(session.conn(), user.id(), tag_data.normalized_name(), None).await? {
        return Err(duplicate_name(&tag_data));
    }
    let tag = Tag::insert(session.conn(), &tag_data, user.id()).await?;
    Ok(HttpResponse::Created().json(tag))
}

/// Retrieves one tag.
///
/// ## Responses:
/// - `200 OK`: The `Tag`.
/// - `403 Forbidden`: The tag belongs to another user.
/// - `404 Not Found`: No tag with this ID.
#[get("/{id}")]
pub async fn get_tag(
    user: AuthenticatedUser,
    tag_id: web::Path<Uuid>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    let tag: Tag = fetch_owned(session.conn(), tag_id.into_inner(), user.id()).await?;
    Ok(HttpResponse::Ok().json(tag))
}

/// Renames or recolors a tag.
///
/// ## Responses:
/// - `200 OK`: The updated `Tag`.
/// - `403 Forbidden` / `404 Not Found`: As for `get_tag`.
/// - `409 Conflict`: Another of the user's tags already has the new name.
#[put("/{id}")]
pub async fn update_tag(
    user: AuthenticatedUser,
    tag_id: web::Path<Uuid>,
    tag_data: web::Json<TagInput>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    tag_data.validate()?;
    let tag_id = tag_id.into_inner();

    fetch_owned::<Tag>(session.conn(), tag_id, user.id()).await?;
    if Tag::name_taken(
        session.conn(),
        user.id(),
        tag_data.normalized_name(),
        Some(tag_id),
    )
    .await?
    {
        return Err(duplicate_name(&tag_data));
    }

    let tag = Tag::update(session.conn(), tag_id, &tag_data, user.id()).await?;
    Ok(HttpResponse::Ok().json(tag))
}

/// Deletes a tag. Tasks that carried it simply lose the association.
#[delete("/{id}")]
pub async fn delete_tag(
    user: AuthenticatedUser,
    tag_id: web::Path<Uuid>,
    mut session: DbSession,
) -> Result<impl Responder, AppError> {
    delete_owned::<Tag>(session.conn(), tag_id.into_inner(), user.id()).await?;
    Ok(HttpResponse::NoContent().finish())
}

fn duplicate_name(input: &TagInput) -> AppError {
    AppError::Conflict(format!("Tag '{}' already exists", input.normalized_name()))
}
