#![allow(dead_code)]

use actix_web::http::header;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use sqlx::PgPool;
use todo_api::auth::{AuthResponse, Claims};
use todo_api::config::Settings;
use uuid::Uuid;

pub const TEST_SECRET: &str = "integration_test_secret";

/// Settings for tests. `DATABASE_URL` is only read when the test needs a database.
pub fn test_settings(database_url: Option<&str>, rate_limit_per_minute: u32) -> Settings {
    let database_url = database_url.unwrap_or("postgres://unused").to_string();
    Settings::from_lookup(move |key| match key {
        "database_url" => Some(database_url.clone()),
        "jwt_secret" => Some(TEST_SECRET.to_string()),
        "cors_origins" => Some("http://localhost:3000".to_string()),
        "environment" => Some("test".to_string()),
        "rate_limit_per_minute" => Some(rate_limit_per_minute.to_string()),
        _ => None,
    })
    .expect("test settings should be valid")
}

/// Connects to the test database and makes sure the schema exists.
///
/// Database-backed tests require `DATABASE_URL` (environment or `.env`) and fail without it.
pub async fn test_pool() -> (PgPool, Settings) {
    dotenv::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set to run database-backed tests");
    let settings = test_settings(Some(&database_url), 10_000);
    let pool = todo_api::db::create_pool(&settings)
        .await
        .expect("Failed to connect to test DB");
    todo_api::db::create_schema(&pool)
        .await
        .expect("Failed to create schema");
    (pool, settings)
}

/// A username that will not collide with other test runs.
pub fn unique_username(prefix: &str) -> String {
    format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}

pub async fn cleanup_user(pool: &PgPool, username: &str) {
    let _ = sqlx::query("DELETE FROM users WHERE username = $1")
        .bind(username)
        .execute(pool)
        .await;
}

pub fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

/// A correctly signed token whose expiry is already in the past.
pub fn expired_token(user_id: i32) -> String {
    let issued = chrono::Utc::now() - chrono::Duration::days(10);
    let claims = Claims {
        sub: user_id,
        iat: issued.timestamp() as usize,
        exp: (issued + chrono::Duration::days(7)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Builds the full application the way `main` does, with the given settings and optional pool.
#[allow(unused_macros)]
macro_rules! test_app {
    (@build $settings:expr, $app:expr) => {{
        let settings: todo_api::config::Settings = $settings;
        let limiter = todo_api::app::client_rate_limiter(&settings);
        let cors = todo_api::app::cors_policy(&settings);
        actix_web::test::init_service(
            $app.app_data(actix_web::web::Data::new(settings))
                .wrap(todo_api::rate_limit::RateLimit::new(limiter))
                .wrap(cors)
                .wrap(actix_web::middleware::Logger::default())
                .service(todo_api::routes::health::health)
                .service(todo_api::routes::health::root)
                .service(actix_web::web::scope("/api").configure(todo_api::routes::config)),
        )
        .await
    }};
    ($settings:expr) => {
        test_app!(@build $settings, actix_web::App::new())
    };
    ($settings:expr, $pool:expr) => {
        test_app!(@build $settings, actix_web::App::new().app_data(actix_web::web::Data::new($pool)))
    };
}

/// Registers `username` and returns the auth response.
pub async fn register<S, B>(app: &S, username: &str, password: &str) -> AuthResponse
where
    S: actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    B: actix_web::body::MessageBody,
{
    let req = actix_web::test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "username": username, "password": password }))
        .to_request();
    let resp = actix_web::test::call_service(app, req).await;
    let status = resp.status();
    let body = actix_web::test::read_body(resp).await;
    assert_eq!(
        status,
        actix_web::http::StatusCode::CREATED,
        "Registration failed. Body: {:?}",
        String::from_utf8_lossy(&body)
    );
    serde_json::from_slice(&body).expect("Failed to parse registration response")
}
