//! Connection pool, per-request sessions and startup schema creation.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use futures::future::LocalBoxFuture;
use log::LevelFilter;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgConnection, PgPool, Postgres};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Settings;
use crate::error::AppError;

/// Statements run by [`create_schema`]. Each one is safe to re-run.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        username VARCHAR(32) NOT NULL UNIQUE,
        email VARCHAR(255) UNIQUE,
        password_hash TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    // Postgres has no CREATE TYPE IF NOT EXISTS.
    "DO $$ BEGIN
        CREATE TYPE task_priority AS ENUM ('low', 'medium', 'high');
    EXCEPTION
        WHEN duplicate_object THEN NULL;
    END $$",
    "CREATE TABLE IF NOT EXISTS tasks (
        id UUID PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title VARCHAR(200) NOT NULL,
        description TEXT,
        priority task_priority NOT NULL DEFAULT 'medium',
        completed BOOLEAN NOT NULL DEFAULT FALSE,
        due_date TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE INDEX IF NOT EXISTS idx_tasks_user_id ON tasks(user_id)",
    "CREATE TABLE IF NOT EXISTS tags (
        id UUID PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name VARCHAR(50) NOT NULL,
        color VARCHAR(7),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        UNIQUE (user_id, name)
    )",
    "CREATE TABLE IF NOT EXISTS task_tags (
        task_id UUID NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        tag_id UUID NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
        PRIMARY KEY (task_id, tag_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_task_tags_tag_id ON task_tags(tag_id)",
];

/// Opens the shared connection pool.
///
/// `db_pool_size` connections are kept warm and up to `db_max_overflow` more are opened
/// under load. Every checkout is pinged before use, so connections dropped by the server
/// are replaced transparently. SQL statements are logged at `info` in development and at
/// `debug` otherwise.
pub async fn create_pool(settings: &Settings) -> Result<PgPool, sqlx::Error> {
    let statement_level = if settings.is_development() {
        LevelFilter::Info
    } else {
        LevelFilter::Debug
    };
    let connect_options =
        PgConnectOptions::from_str(&settings.database_url)?.log_statements(statement_level);

    PgPoolOptions::new()
        .min_connections(settings.db_pool_size)
        .max_connections(settings.db_pool_size.saturating_add(settings.db_max_overflow))
        .test_before_acquire(true)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(connect_options)
        .await
}

/// Creates any missing types, tables and indexes.
pub async fn create_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    log::info!("database schema ready");
    Ok(())
}

/// A pooled connection checked out for the duration of one request.
///
/// Acquired when the handler's arguments are extracted; the connection goes back to the
/// pool when the session is dropped, whichever way the handler exits.
pub struct DbSession(PoolConnection<Postgres>);

impl DbSession {
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.0
    }
}

impl FromRequest for DbSession {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let pool = req
            .app_data::<web::Data<PgPool>>()
            .map(|pool| pool.get_ref().clone());

        Box::pin(async move {
            let pool = pool.ok_or_else(|| {
                AppError::InternalServerError("Database pool not configured".into())
            })?;
            let conn = pool.acquire().await?;
            Ok(DbSession(conn))
        })
    }
}
