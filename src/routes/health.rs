use actix_web::{get, web, HttpResponse, Responder};
use serde_json::json;

use crate::config::Settings;

/// Health check endpoint
///
/// Reports liveness and the deployment environment. Does not touch the database.
#[get("/health")]
pub async fn health(settings: web::Data<Settings>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "environment": settings.environment
    }))
}

/// Welcome message at the API root.
#[get("/")]
pub async fn root() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "Todo API"
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test;

    #[actix_web::test]
    async fn test_health_endpoint() {
        let settings = Settings::from_lookup(|key| match key {
            "database_url" => Some("postgres://unused".to_string()),
            "jwt_secret" => Some("secret".to_string()),
            "environment" => Some("staging".to_string()),
            _ => None,
        })
        .unwrap();
        let app = test::init_service(
            actix_web::App::new()
                .app_data(web::Data::new(settings))
                .service(health),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());

        let json: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["environment"], "staging");
    }

    #[actix_web::test]
    async fn test_root_endpoint() {
        let app = test::init_service(actix_web::App::new().service(root)).await;

        let req = test::TestRequest::get().uri("/").to_request();
        let json: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(json["message"], "Todo API");
    }
}
