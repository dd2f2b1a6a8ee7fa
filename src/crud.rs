//! Ownership-checked reads, listings and deletes shared by every user-scoped entity.
//!
//! An entity opts in by implementing [`OwnedResource`]; its create and update SQL stays
//! with the entity, everything else is generic.

use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::AppError;

/// Default and maximum page sizes for listings.
pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

/// A row that belongs to exactly one user.
pub trait OwnedResource: for<'r> FromRow<'r, PgRow> + Serialize + Send + Unpin {
    /// Table the rows live in. Must have `id UUID` and `user_id INTEGER` columns.
    const TABLE: &'static str;
    /// Comma-separated column list matching the `FromRow` impl.
    const COLUMNS: &'static str;
    /// Human-readable name used in error messages.
    const NAME: &'static str;
    /// `ORDER BY` clause for listings.
    const ORDER_BY: &'static str;

    fn id(&self) -> Uuid;
    fn owner_id(&self) -> i32;
}

/// Extra `WHERE` conditions and pagination for a listing.
pub trait ListFilter {
    /// Appends conditions, each starting with ` AND `.
    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>);

    fn page(&self) -> Page;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    /// Clamps the requested window into `1..=MAX_LIMIT` and a non-negative offset.
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new(None, None)
    }
}

/// Verifies that `resource` is owned by `caller`.
pub fn ensure_owner<R: OwnedResource>(resource: &R, caller: i32) -> Result<(), AppError> {
    if resource.owner_id() == caller {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "{} {} does not belong to the current user",
            R::NAME,
            resource.id()
        )))
    }
}

/// Loads one row and checks ownership.
///
/// Unknown ids fail with `NotFound`; rows owned by another user fail with `Forbidden`.
pub async fn fetch_owned<R: OwnedResource>(
    conn: &mut PgConnection,
    id: Uuid,
    caller: i32,
) -> Result<R, AppError> {
    let sql = format!("SELECT {} FROM {} WHERE id = $1", R::COLUMNS, R::TABLE);
    let resource = sqlx::query_as::<_, R>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{} not found", R::NAME)))?;

    ensure_owner(&resource, caller)?;
    Ok(resource)
}

/// Lists the caller's rows, narrowed by `filter`.
pub async fn list_owned<R, F>(
    conn: &mut PgConnection,
    caller: i32,
    filter: &F,
) -> Result<Vec<R>, AppError>
where
    R: OwnedResource,
    F: ListFilter,
{
    let page = filter.page();
    let mut qb = select_owned::<R>(caller);
    filter.push_conditions(&mut qb);
    qb.push(" ORDER BY ")
        .push(R::ORDER_BY)
        .push(" LIMIT ")
        .push_bind(page.limit)
        .push(" OFFSET ")
        .push_bind(page.offset);

    let rows = qb.build_query_as::<R>().fetch_all(conn).await?;
    Ok(rows)
}

/// Deletes one row after checking ownership. Dependent rows go with it through
/// `ON DELETE CASCADE`.
pub async fn delete_owned<R: OwnedResource>(
    conn: &mut PgConnection,
    id: Uuid,
    caller: i32,
) -> Result<(), AppError> {
    fetch_owned::<R>(&mut *conn, id, caller).await?;

    let sql = format!("DELETE FROM {} WHERE id = $1 AND user_id = $2", R::TABLE);
    let result = sqlx::query(&sql)
        .bind(id)
        .bind(caller)
        .execute(conn)
        .await?;

    // Lost a race with a concurrent delete.
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("{} not found", R::NAME)));
    }
    Ok(())
}

fn select_owned<R: OwnedResource>(caller: i32) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM {} WHERE user_id = ",
        R::COLUMNS,
        R::TABLE
    ));
    qb.push_bind(caller);
    qb
}
