pub mod extractors;
pub mod middleware;
pub mod password;
pub mod token;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use validator::Validate;

// Re-export necessary items
pub use extractors::AuthenticatedUser;
pub use middleware::AuthMiddleware;
pub use password::{hash_password, verify_password};
pub use token::{generate_token, verify_token, Claims};

lazy_static! {
    // Regex for username validation: alphanumeric, underscores, hyphens
    static ref USERNAME_REGEX: regex::Regex = regex::Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Represents the payload for a user login request.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 32))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Represents the payload for a new user registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// The login handle.
    /// Must be between 3 and 32 characters, alphanumeric, and can include underscores or hyphens.
    #[validate(
        length(min = 3, max = 32),
        regex(
            path = "USERNAME_REGEX",
            message = "Username must be alphanumeric, underscores, or hyphens"
        )
    )]
    pub username: String,
    /// Password for the new account.
    /// Must be between 3 and 128 characters long.
    #[validate(length(min = 3, max = 128))]
    pub password: String,
    /// Optional contact address; unique across accounts when given. At most 255 characters.
    #[validate(email, length(max = 255))]
    pub email: Option<String>,
}

/// Response structure after successful authentication (login or registration).
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    /// The signed bearer token.
    pub token: String,
    /// Always `"bearer"`.
    pub token_type: String,
    /// The unique identifier of the authenticated user.
    pub user_id: i32,
    /// Seconds until the token expires.
    pub expires_in: i64,
}

impl AuthResponse {
    pub fn bearer(token: String, user_id: i32, expires_in: i64) -> Self {
        Self {
            token,
            token_type: "bearer".to_string(),
            user_id,
            expires_in,
        }
    }
}
