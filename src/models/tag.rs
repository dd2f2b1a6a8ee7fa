use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::crud::{ListFilter, OwnedResource, Page};
use crate::error::AppError;

const MAX_NAME_LENGTH: usize = 50;

lazy_static! {
    static ref COLOR_REGEX: regex::Regex = regex::Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
}

/// A user-scoped label. Names are unique per owner.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: Uuid,
    pub user_id: i32,
    pub name: String,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating or renaming a tag.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TagInput {
    /// 1-50 characters once surrounding whitespace is trimmed.
    #[validate(custom = "validate_tag_name")]
    pub name: String,
    /// Hex color such as `#ff8800`.
    #[validate(regex(path = "COLOR_REGEX", message = "Color must look like #RRGGBB"))]
    pub color: Option<String>,
}

impl TagInput {
    /// Surrounding whitespace is not significant for uniqueness.
    pub fn normalized_name(&self) -> &str {
        self.name.trim()
    }
}

/// Length limits apply to the stored (trimmed) name.
fn validate_tag_name(name: &str) -> Result<(), ValidationError> {
    let length = name.trim().chars().count();
    if length == 0 {
        let mut error = ValidationError::new("blank");
        error.message = Some("must not be blank".into());
        return Err(error);
    }
    if length > MAX_NAME_LENGTH {
        let mut error = ValidationError::new("length");
        error.message = Some(format!("must be at most {} characters", MAX_NAME_LENGTH).into());
        return Err(error);
    }
    Ok(())
}

impl OwnedResource for Tag {
    const TABLE: &'static str = "tags";
    const COLUMNS: &'static str = "id, user_id, name, color, created_at";
    const NAME: &'static str = "Tag";
    const ORDER_BY: &'static str = "name, id";

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> i32 {
        self.user_id
    }
}

/// Pagination for tag listings.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct TagQuery {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

impl ListFilter for TagQuery {
    fn push_conditions(&self, _qb: &mut QueryBuilder<'_, Postgres>) {}

    fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

/// One row of a task-to-tag association.
#[derive(Debug, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct TaskTag {
    pub task_id: Uuid,
    pub tag_id: Uuid,
}

impl Tag {
    /// Whether `user_id` already has a tag called `name`, ignoring `except`.
    pub async fn name_taken(
        conn: &mut PgConnection,
        user_id: i32,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM tags WHERE user_id = $1 AND name = $2 AND ($3::uuid IS NULL OR id <> $3)
            )",
        )
        .bind(user_id)
        .bind(name)
        .bind(except)
        .fetch_one(conn)
        .await
    }

    pub async fn insert(
        conn: &mut PgConnection,
        input: &TagInput,
        user_id: i32,
    ) -> Result<Tag, sqlx::Error> {
        let sql = format!(
            "INSERT INTO tags (id, user_id, name, color) VALUES ($1, $2, $3, $4) RETURNING {}",
            Tag::COLUMNS
        );
        sqlx::query_as::<_, Tag>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(input.normalized_name())
            .bind(&input.color)
            .fetch_one(conn)
            .await
    }

    pub async fn update(
        conn: &mut PgConnection,
        id: Uuid,
        input: &TagInput,
        user_id: i32,
    ) -> Result<Tag, sqlx::Error> {
        let sql = format!(
            "UPDATE tags SET name = $1, color = $2 WHERE id = $3 AND user_id = $4 RETURNING {}",
            Tag::COLUMNS
        );
        sqlx::query_as::<_, Tag>(&sql)
            .bind(input.normalized_name())
            .bind(&input.color)
            .bind(id)
            .bind(user_id)
            .fetch_one(conn)
            .await
    }

    /// Checks that every id in `tag_ids` names a tag owned by `user_id`.
    ///
    /// Unknown ids fail with `NotFound`; tags owned by someone else fail with `Forbidden`.
    pub async fn ensure_all_owned(
        conn: &mut PgConnection,
        tag_ids: &[Uuid],
        user_id: i32,
    ) -> Result<(), AppError> {
        if tag_ids.is_empty() {
            return Ok(());
        }
        let owners = sqlx::query_as::<_, (Uuid, i32)>("SELECT id, user_id FROM tags WHERE id = ANY($1)")
            .bind(tag_ids)
            .fetch_all(conn)
            .await?;

        for tag_id in tag_ids {
            match owners.iter().find(|(id, _)| id == tag_id) {
                None => return Err(AppError::NotFound(format!("Tag {} not found", tag_id))),
                Some((_, owner)) if *owner != user_id => {
                    return Err(AppError::Forbidden(format!(
                        "Tag {} does not belong to the current user",
                        tag_id
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}
