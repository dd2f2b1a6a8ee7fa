use crate::config::JwtSettings;
use crate::error::AppError;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Represents the claims encoded within a JWT (JSON Web Token).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject of the token: the user's id.
    pub sub: i32,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: usize,
    /// Expiration timestamp (seconds since epoch).
    pub exp: usize,
}

/// Lifetime of a freshly issued token, in seconds. Saturates instead of overflowing.
pub fn token_lifetime_secs(jwt: &JwtSettings) -> i64 {
    jwt.expiration_days.saturating_mul(24 * 60 * 60)
}

/// Generates a signed token for a given user ID.
///
/// The token expires `jwt.expiration_days` after issue and is signed with the
/// configured secret and algorithm.
///
/// # Returns
/// Returns `AppError::InternalServerError` if the expiry overflows or encoding fails.
pub fn generate_token(user_id: i32, jwt: &JwtSettings) -> Result<String, AppError> {
    let now = chrono::Utc::now();
    let expiration = chrono::Duration::try_days(jwt.expiration_days)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| AppError::InternalServerError("Token expiry out of range".into()))?;

    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::new(jwt.algorithm),
        &claims,
        &EncodingKey::from_secret(jwt.secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("Failed to generate token: {}", e)))
}

/// Verifies a token string and decodes its claims.
///
/// The signature, the algorithm and the expiry are all checked.
///
/// # Returns
/// Returns `AppError::Unauthorized` if the token is malformed, its signature is invalid,
/// it was signed with a different algorithm, or it has expired.
pub fn verify_token(token: &str, jwt: &JwtSettings) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt.secret.as_bytes()),
        &Validation::new(jwt.algorithm),
    )
    .map(|data| data.claims)
    .map_err(AppError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::Algorithm;

    fn jwt(secret: &str) -> JwtSettings {
        JwtSettings {
            secret: secret.to_string(),
            algorithm: Algorithm::HS256,
            expiration_days: 7,
        }
    }

    #[test]
    fn test_token_generation_and_verification() {
        let settings = jwt("test_secret_for_gen_verify");
        let token = generate_token(1, &settings).unwrap();
        let claims = verify_token(&token, &settings).unwrap();

        assert_eq!(claims.sub, 1);
        assert_eq!(
            (claims.exp - claims.iat) as i64,
            token_lifetime_secs(&settings)
        );
    }

    #[test]
    fn test_token_expiration() {
        let settings = jwt("test_secret_for_expiration");
        let issued = chrono::Utc::now() - chrono::Duration::days(8);
        let claims_expired = Claims {
            sub: 2,
            iat: issued.timestamp() as usize,
            exp: (issued + chrono::Duration::days(7)).timestamp() as usize,
        };
        let expired_token = encode(
            &Header::default(),
            &claims_expired,
            &EncodingKey::from_secret(settings.secret.as_bytes()),
        )
        .unwrap();

        match verify_token(&expired_token, &settings) {
            Err(AppError::Unauthorized(msg)) => {
                assert!(msg.contains("ExpiredSignature"), "unexpected message: {}", msg);
            }
            Ok(_) => panic!("Token should have been invalid due to expiration"),
            Err(e) => panic!("Unexpected error type for expired token: {:?}", e),
        }
    }

    #[test]
    fn test_invalid_token_signature() {
        let token = generate_token(3, &jwt("the_signing_secret")).unwrap();

        match verify_token(&token, &jwt("a_completely_different_secret")) {
            Err(AppError::Unauthorized(msg)) => {
                assert!(msg.contains("InvalidSignature"), "unexpected message: {}", msg);
            }
            Ok(_) => panic!("Token should have been invalid due to signature mismatch"),
            Err(e) => panic!("Unexpected error type for invalid signature: {:?}", e),
        }
    }

    #[test]
    fn test_algorithm_mismatch_rejected() {
        let mut hs512 = jwt("shared_secret");
        hs512.algorithm = Algorithm::HS512;
        let token = generate_token(4, &hs512).unwrap();

        assert!(verify_token(&token, &jwt("shared_secret")).is_err());
        assert_eq!(verify_token(&token, &hs512).unwrap().sub, 4);
    }

    #[test]
    fn test_oversized_lifetime_does_not_panic() {
        let mut settings = jwt("secret");
        settings.expiration_days = 200_000_000_000;

        assert_eq!(token_lifetime_secs(&settings), 200_000_000_000 * 86_400);
        assert!(matches!(
            generate_token(5, &settings),
            Err(AppError::InternalServerError(_))
        ));
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(matches!(
            verify_token("not.a.token", &jwt("secret")),
            Err(AppError::Unauthorized(_))
        ));
    }
}
