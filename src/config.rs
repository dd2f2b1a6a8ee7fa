//! Application settings loaded from the environment.
//!
//! Keys are looked up case-insensitively (`DATABASE_URL`, then `database_url`).
//! `main` loads a `.env` file beforehand, so values already present in the
//! process environment take precedence over the file.

use jsonwebtoken::Algorithm;
use std::env;
use std::fmt;
use std::str::FromStr;

/// Longest token lifetime accepted for `jwt_expiration_days`.
pub const MAX_EXPIRATION_DAYS: i64 = 3650;

/// Errors raised while building [`Settings`]. Any of these aborts startup.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// A required key is absent or blank.
    Missing(&'static str),
    /// A key is present but its value cannot be used.
    Invalid { key: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => {
                write!(f, "Missing required setting: {}", key.to_uppercase())
            }
            ConfigError::Invalid { key, reason } => {
                write!(f, "Invalid setting {}: {}", key.to_uppercase(), reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Token signing parameters.
#[derive(Debug, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub algorithm: Algorithm,
    pub expiration_days: i64,
}

/// Process-wide configuration, built once at startup and shared as `web::Data<Settings>`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt: JwtSettings,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub host: String,
    pub port: u16,
    /// Connections kept open in the pool.
    pub db_pool_size: u32,
    /// Connections allowed on top of `db_pool_size` under load.
    pub db_max_overflow: u32,
    pub rate_limit_per_minute: u32,
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| {
            env::var(key.to_uppercase())
                .or_else(|_| env::var(key))
                .ok()
        })
    }

    /// Builds settings from an arbitrary key lookup. Keys are passed in lowercase.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let database_url = get("database_url").ok_or(ConfigError::Missing("database_url"))?;
        let secret = get("jwt_secret").ok_or(ConfigError::Missing("jwt_secret"))?;

        let algorithm = match get("jwt_algorithm") {
            Some(raw) => parse_hmac_algorithm(&raw)?,
            None => Algorithm::HS256,
        };

        let expiration_days: i64 = parse_or("jwt_expiration_days", get("jwt_expiration_days"), 7)?;
        if !(1..=MAX_EXPIRATION_DAYS).contains(&expiration_days) {
            return Err(ConfigError::Invalid {
                key: "jwt_expiration_days",
                reason: format!("must be between 1 and {} days", MAX_EXPIRATION_DAYS),
            });
        }

        let cors_origins = split_origins(
            &get("cors_origins").unwrap_or_else(|| "http://localhost:3000".to_string()),
        );

        let rate_limit_per_minute: u32 =
            parse_or("rate_limit_per_minute", get("rate_limit_per_minute"), 60)?;
        if rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid {
                key: "rate_limit_per_minute",
                reason: "must be greater than zero".into(),
            });
        }

        let db_pool_size: u32 = parse_or("db_pool_size", get("db_pool_size"), 10)?;
        if db_pool_size == 0 {
            return Err(ConfigError::Invalid {
                key: "db_pool_size",
                reason: "must be greater than zero".into(),
            });
        }

        let db_max_overflow: u32 = parse_or("db_max_overflow", get("db_max_overflow"), 20)?;
        if db_pool_size.checked_add(db_max_overflow).is_none() {
            return Err(ConfigError::Invalid {
                key: "db_max_overflow",
                reason: "db_pool_size + db_max_overflow is too large".into(),
            });
        }

        Ok(Self {
            database_url,
            jwt: JwtSettings {
                secret,
                algorithm,
                expiration_days,
            },
            cors_origins,
            environment: get("environment").unwrap_or_else(|| "development".to_string()),
            host: get("host").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or("port", get("port"), 8000)?,
            db_pool_size,
            db_max_overflow,
            rate_limit_per_minute,
        })
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}

// Tokens are signed with a shared secret, so only the HMAC family makes sense.
fn parse_hmac_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    match Algorithm::from_str(&raw.to_uppercase()) {
        Ok(alg @ (Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)) => Ok(alg),
        Ok(_) => Err(ConfigError::Invalid {
            key: "jwt_algorithm",
            reason: format!("'{}' is not an HMAC algorithm", raw),
        }),
        Err(e) => Err(ConfigError::Invalid {
            key: "jwt_algorithm",
            reason: format!("'{}': {}", raw, e),
        }),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(|origin| origin.trim_end_matches('/').to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("database_url", "postgres://test"),
            ("jwt_secret", "secret"),
        ]))
        .unwrap();

        assert_eq!(settings.database_url, "postgres://test");
        assert_eq!(settings.jwt.algorithm, Algorithm::HS256);
        assert_eq!(settings.jwt.expiration_days, 7);
        assert_eq!(settings.cors_origins, vec!["http://localhost:3000".to_string()]);
        assert_eq!(settings.environment, "development");
        assert!(settings.is_development());
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.db_pool_size, 10);
        assert_eq!(settings.db_max_overflow, 20);
        assert_eq!(settings.rate_limit_per_minute, 60);
        assert_eq!(settings.server_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_required_fields() {
        let err = Settings::from_lookup(lookup_from(&[("jwt_secret", "secret")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("database_url"));

        let err = Settings::from_lookup(lookup_from(&[
            ("database_url", "postgres://test"),
            ("jwt_secret", "   "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::Missing("jwt_secret"));
        assert_eq!(err.to_string(), "Missing required setting: JWT_SECRET");
    }

    #[test]
    fn test_custom_values() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("database_url", "postgres://test"),
            ("jwt_secret", "secret"),
            ("jwt_algorithm", "hs512"),
            ("jwt_expiration_days", "30"),
            ("cors_origins", "https://app.example.com/, http://localhost:5173,,"),
            ("environment", "production"),
            ("port", "3000"),
            ("rate_limit_per_minute", "5"),
        ]))
        .unwrap();

        assert_eq!(settings.jwt.algorithm, Algorithm::HS512);
        assert_eq!(settings.jwt.expiration_days, 30);
        assert_eq!(
            settings.cors_origins,
            vec![
                "https://app.example.com".to_string(),
                "http://localhost:5173".to_string()
            ]
        );
        assert!(!settings.is_development());
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.rate_limit_per_minute, 5);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = [("database_url", "postgres://test"), ("jwt_secret", "secret")];

        let mut pairs = base.to_vec();
        pairs.push(("jwt_algorithm", "RS256"));
        assert!(matches!(
            Settings::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { key: "jwt_algorithm", .. })
        ));

        let mut pairs = base.to_vec();
        pairs.push(("jwt_expiration_days", "seven"));
        assert!(matches!(
            Settings::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { key: "jwt_expiration_days", .. })
        ));

        let mut pairs = base.to_vec();
        pairs.push(("jwt_expiration_days", "0"));
        assert!(Settings::from_lookup(lookup_from(&pairs)).is_err());

        let mut pairs = base.to_vec();
        pairs.push(("port", "99999"));
        assert!(Settings::from_lookup(lookup_from(&pairs)).is_err());
    }

    #[test]
    fn test_expiration_days_bounded() {
        let base = [("database_url", "postgres://test"), ("jwt_secret", "secret")];

        for days in ["3651", "100000000", "200000000000"] {
            let mut pairs = base.to_vec();
            pairs.push(("jwt_expiration_days", days));
            assert!(
                matches!(
                    Settings::from_lookup(lookup_from(&pairs)),
                    Err(ConfigError::Invalid { key: "jwt_expiration_days", .. })
                ),
                "{} days accepted",
                days
            );
        }

        let mut pairs = base.to_vec();
        pairs.push(("jwt_expiration_days", "3650"));
        let settings = Settings::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(settings.jwt.expiration_days, MAX_EXPIRATION_DAYS);
    }

    #[test]
    fn test_pool_size_sum_must_fit() {
        let mut pairs = vec![("database_url", "postgres://test"), ("jwt_secret", "secret")];
        pairs.push(("db_pool_size", "4294967295"));
        pairs.push(("db_max_overflow", "1"));
        assert!(matches!(
            Settings::from_lookup(lookup_from(&pairs)),
            Err(ConfigError::Invalid { key: "db_max_overflow", .. })
        ));
    }
}
