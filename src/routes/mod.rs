pub mod auth;
pub mod health;
pub mod tags;
pub mod tasks;

use actix_web::web;

use crate::app::extractor_configs;
use crate::auth::AuthMiddleware;

/// Registers the API routes. Mount under `/api`.
///
/// `/auth` is public; `/users`, `/tasks` and `/tags` require a bearer token.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.configure(extractor_configs)
        .service(
            web::scope("/auth")
                .service(auth::login)
                .service(auth::register),
        )
        .service(web::scope("/users").wrap(AuthMiddleware).service(auth::me))
        .service(
            web::scope("/tasks")
                .wrap(AuthMiddleware)
                .service(tasks::get_tasks)
                .service(tasks::create_task)
                .service(tasks::get_task)
                .service(tasks::update_task)
                .service(tasks::toggle_task)
                .service(tasks::delete_task),
        )
        .service(
            web::scope("/tags")
                .wrap(AuthMiddleware)
                .service(tags::get_tags)
                .service(tags::create_tag)
                .service(tags::get_tag)
                .service(tags::update_tag)
                .service(tags::delete_tag),
        );
}
