#![doc = "The `todo_api` library crate."]
#![doc = ""]
#![doc = "Settings, persistence, domain models, authentication, rate limiting, routing and"]
#![doc = "error handling for the todo API. The binary (`main.rs`) assembles these into the"]
#![doc = "running server."]

pub mod app;
pub mod auth;
pub mod config;
pub mod crud;
pub mod db;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod routes;

pub use crate::config::Settings;
pub use crate::error::AppError;
