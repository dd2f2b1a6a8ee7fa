use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use std::io;

use todo_api::app::{client_rate_limiter, cors_policy};
use todo_api::config::Settings;
use todo_api::db;
use todo_api::rate_limit::RateLimit;
use todo_api::routes::{self, health};

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Values already in the environment win over the file.
    dotenv::dotenv().ok();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            init_logging(false);
            log::error!("{}", e);
            return Err(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()));
        }
    };
    init_logging(settings.is_development());

    let pool = db::create_pool(&settings).await.map_err(|e| {
        log::error!("failed to connect to database: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;
    db::create_schema(&pool).await.map_err(|e| {
        log::error!("failed to create database schema: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;

    let limiter = client_rate_limiter(&settings);
    let bind_addr = (settings.host.clone(), settings.port);
    log::info!(
        "Starting todo API ({}) at {}",
        settings.environment,
        settings.server_url()
    );

    let settings = web::Data::new(settings);
    let pool = web::Data::new(pool);

    HttpServer::new(move || {
        App::new()
            .app_data(settings.clone())
            .app_data(pool.clone())
            .wrap(RateLimit::new(limiter.clone()))
            .wrap(cors_policy(&settings))
            .wrap(Logger::default())
            .service(health::health)
            .service(health::root)
            .service(web::scope("/api").configure(routes::config))
    })
    .bind(bind_addr)?
    .run()
    .await
}

/// `RUST_LOG` overrides the default level, which is `debug` in development and `info` otherwise.
fn init_logging(development: bool) {
    let default_level = if development { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}
