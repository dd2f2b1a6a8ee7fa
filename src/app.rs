//! Cross-cutting pieces the server wires around the routers.

use actix_cors::Cors;
use actix_web::{error, web, HttpRequest};
use std::num::NonZeroU32;

use crate::config::Settings;
use crate::error::AppError;
use crate::rate_limit::ClientRateLimiter;

/// CORS policy built from `cors_origins`.
///
/// Every method and header is allowed. Credentials are supported for explicit origins;
/// a `*` entry opens the API to any origin without credentials.
pub fn cors_policy(settings: &Settings) -> Cors {
    let base = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

    if settings.cors_origins.iter().any(|origin| origin == "*") {
        return base.allow_any_origin();
    }

    settings
        .cors_origins
        .iter()
        .fold(base.supports_credentials(), |cors, origin| {
            cors.allowed_origin(origin)
        })
}

/// Limiter sized from `rate_limit_per_minute`. Build it once and clone it into every worker.
pub fn client_rate_limiter(settings: &Settings) -> ClientRateLimiter {
    let per_minute = NonZeroU32::new(settings.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN);
    ClientRateLimiter::per_minute(per_minute)
}

/// Renders body, path and query extraction failures as `{"error": ...}` with status 400.
pub fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .app_data(web::QueryConfig::default().error_handler(query_error));
}

fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid JSON body: {}", err)).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid path parameter: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::BadRequest(format!("Invalid query string: {}", err)).into()
}
