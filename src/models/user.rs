use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Public view of an account. The password hash never leaves the database layer.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Columns needed to check a login attempt.
#[derive(Debug, FromRow)]
pub struct Credentials {
    pub id: i32,
    pub password_hash: String,
}

impl User {
    pub async fn find(conn: &mut sqlx::PgConnection, id: i32) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT id, username, email, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    pub async fn credentials_for(
        conn: &mut sqlx::PgConnection,
        username: &str,
    ) -> Result<Option<Credentials>, sqlx::Error> {
        sqlx::query_as::<_, Credentials>("SELECT id, password_hash FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(conn)
            .await
    }

    pub async fn username_taken(
        conn: &mut sqlx::PgConnection,
        username: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(conn)
            .await
    }

    pub async fn email_taken(conn: &mut sqlx::PgConnection, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(conn)
            .await
    }

    pub async fn insert(
        conn: &mut sqlx::PgConnection,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (username, email, password_hash) VALUES ($1, $2, $3)
             RETURNING id, username, email, created_at",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(conn)
        .await
    }
}
