use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::crud::{ListFilter, OwnedResource, Page};
use crate::models::tag::TaskTag;

/// Represents the priority of a task.
/// Corresponds to the `task_priority` SQL enum.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

/// Input structure for creating or replacing a task.
#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct TaskInput {
    /// Must be between 1 and 200 characters.
    #[validate(length(min = 1, max = 200))]
    pub title: String,

    /// Maximum length of 1000 characters if provided.
    #[validate(length(max = 1000))]
    pub description: Option<String>,

    /// Defaults to `medium` when omitted.
    #[serde(default)]
    pub priority: TaskPriority,

    #[serde(default)]
    pub completed: bool,

    pub due_date: Option<DateTime<Utc>>,

    /// Tags to attach. Every tag must belong to the caller.
    #[serde(default)]
    #[validate(length(max = 50))]
    pub tag_ids: Vec<Uuid>,
}

/// Represents a task as stored in the database and returned by the API.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub user_id: i32,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub completed: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Associated tags; filled from `task_tags` after the row is loaded.
    #[sqlx(skip)]
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

impl OwnedResource for Task {
    const TABLE: &'static str = "tasks";
    const COLUMNS: &'static str =
        "id, user_id, title, description, priority, completed, due_date, created_at, updated_at";
    const NAME: &'static str = "Task";
    const ORDER_BY: &'static str = "created_at DESC, id";

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> i32 {
        self.user_id
    }
}

/// Query parameters accepted when listing tasks.
#[derive(Debug, Default, Serialize, Deserialize, Validate)]
pub struct TaskQuery {
    pub completed: Option<bool>,
    pub priority: Option<TaskPriority>,
    /// Case-insensitive match against title or description.
    #[validate(length(min = 1, max = 200))]
    pub search: Option<String>,
    /// Only tasks carrying this tag.
    pub tag_id: Option<Uuid>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

impl ListFilter for TaskQuery {
    fn push_conditions(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(completed) = self.completed {
            qb.push(" AND completed = ").push_bind(completed);
        }
        if let Some(priority) = self.priority {
            qb.push(" AND priority = ").push_bind(priority);
        }
        if let Some(search) = &self.search {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(tag_id) = self.tag_id {
            qb.push(" AND EXISTS (SELECT 1 FROM task_tags tt WHERE tt.task_id = tasks.id AND tt.tag_id = ")
                .push_bind(tag_id)
                .push(")");
        }
    }

    fn page(&self) -> Page {
        Page::new(self.limit, self.offset)
    }
}

// `%` and `_` in user input should match literally.
fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl Task {
    pub async fn insert(
        conn: &mut PgConnection,
        input: &TaskInput,
        user_id: i32,
    ) -> Result<Task, sqlx::Error> {
        let sql = format!(
            "INSERT INTO tasks (id, user_id, title, description, priority, completed, due_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            Task::COLUMNS
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.priority)
            .bind(input.completed)
            .bind(input.due_date)
            .fetch_one(conn)
            .await
    }

    pub async fn replace(
        conn: &mut PgConnection,
        id: Uuid,
        input: &TaskInput,
        user_id: i32,
    ) -> Result<Task, sqlx::Error> {
        let sql = format!(
            "UPDATE tasks
             SET title = $1, description = $2, priority = $3, completed = $4, due_date = $5,
                 updated_at = NOW()
             WHERE id = $6 AND user_id = $7
             RETURNING {}",
            Task::COLUMNS
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(&input.title)
            .bind(&input.description)
            .bind(input.priority)
            .bind(input.completed)
            .bind(input.due_date)
            .bind(id)
            .bind(user_id)
            .fetch_one(conn)
            .await
    }

    pub async fn toggle_completed(
        conn: &mut PgConnection,
        id: Uuid,
        user_id: i32,
    ) -> Result<Task, sqlx::Error> {
        let sql = format!(
            "UPDATE tasks SET completed = NOT completed, updated_at = NOW()
             WHERE id = $1 AND user_id = $2
             RETURNING {}",
            Task::COLUMNS
        );
        sqlx::query_as::<_, Task>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_one(conn)
            .await
    }

    /// Replaces the task's tag associations with `tag_ids`.
    pub async fn set_tags(
        conn: &mut PgConnection,
        task_id: Uuid,
        tag_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM task_tags WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *conn)
            .await?;

        if !tag_ids.is_empty() {
            sqlx::query(
                "INSERT INTO task_tags (task_id, tag_id)
                 SELECT $1, UNNEST($2::uuid[])
                 ON CONFLICT DO NOTHING",
            )
            .bind(task_id)
            .bind(tag_ids)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Fills `tag_ids` on each task with a single query.
    pub async fn load_tags(conn: &mut PgConnection, tasks: &mut [Task]) -> Result<(), sqlx::Error> {
        if tasks.is_empty() {
            return Ok(());
        }
        let task_ids: Vec<Uuid> = tasks.iter().map(|task| task.id).collect();
        let links = sqlx::query_as::<_, TaskTag>(
            "SELECT task_id, tag_id FROM task_tags WHERE task_id = ANY($1) ORDER BY tag_id",
        )
        .bind(&task_ids)
        .fetch_all(conn)
        .await?;

        let mut by_task: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for link in links {
            by_task.entry(link.task_id).or_default().push(link.tag_id);
        }
        for task in tasks.iter_mut() {
            task.tag_ids = by_task.remove(&task.id).unwrap_or_default();
        }
        Ok(())
    }
}
