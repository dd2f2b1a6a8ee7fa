use crate::{
    auth::{
        generate_token,
        password::{hash_password_blocking, verify_password_blocking},
        token::token_lifetime_secs,
        AuthResponse, AuthenticatedUser, LoginRequest, RegisterRequest,
    },
    config::Settings,
    db::DbSession,
    error::AppError,
    models::User,
};
use actix_web::{get, post, web, HttpResponse, Responder};
use validator::Validate;

/// Register a new user
///
/// Creates a new user account and returns an authentication token.
///
/// ## Responses:
/// - `201 Created`: `AuthResponse` for the new account.
/// - `409 Conflict`: The username or email is already registered.
/// - `422 Unprocessable Entity`: Input validation failed.
#[post("/register")]
pub async fn register(
    settings: web::Data<Settings>,
    mut session: DbSession,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;
    let RegisterRequest {
        username,
        password,
        email,
    } = register_data.into_inner();

    if User::username_taken(session.conn(), &username).await? {
        return Err(AppError::Conflict("Username already registered".into()));
    }
    if let Some(email) = &email {
        if User::email_taken(session.conn(), email).await? {
            return Err(AppError::Conflict("Email already registered".into()));
        }
    }

    let password_hash = hash_password_blocking(password).await?;

    // A concurrent registration can still win the race; the unique constraint turns that
    // into a Conflict as well.
    let user = User::insert(session.conn(), &username, email.as_deref(), &password_hash).await?;
    log::info!("registered user {} ({})", user.username, user.id);

    let token = generate_token(user.id, &settings.jwt)?;
    Ok(HttpResponse::Created().json(AuthResponse::bearer(
        token,
        user.id,
        token_lifetime_secs(&settings.jwt),
    )))
}

/// Login user
///
/// Authenticates a user and returns an authentication token.
/// Unknown usernames and wrong passwords produce the same `401` response.
#[post("/login")]
pub async fn login(
    settings: web::Data<Settings>,
    mut session: DbSession,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;
    let LoginRequest { username, password } = login_data.into_inner();

    let credentials = User::credentials_for(session.conn(), &username).await?;
    // Release the connection before the slow hash check.
    drop(session);

    let Some(credentials) = credentials else {
        log::info!("login failed for unknown user {}", username);
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };

    if !verify_password_blocking(password, credentials.password_hash).await? {
        log::info!("login failed for user {}", credentials.id);
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    let token = generate_token(credentials.id, &settings.jwt)?;
    Ok(HttpResponse::Ok().json(AuthResponse::bearer(
        token,
        credentials.id,
        token_lifetime_secs(&settings.jwt),
    )))
}

/// Current user
///
/// Returns the profile of the token's owner. A token for a deleted account is rejected
/// with `401`.
#[get("/me")]
pub async fn me(user: AuthenticatedUser, mut session: DbSession) -> Result<impl Responder, AppError> {
    let profile = User::find(session.conn(), user.id())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".into()))?;
    Ok(HttpResponse::Ok().json(profile))
}
