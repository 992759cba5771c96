//! The rulestack registry service.
//!
//! An axum HTTP server exposing the `/v1/` package API behind a fixed
//! middleware pipeline: panic recovery, security headers, CORS, access
//! logging, body size limiting, per-IP rate limiting, JSON sanitization,
//! and session-backed JWT authentication. Cross-cutting policy (auth
//! requirement, role, rate limit) lives in the route metadata table in
//! [`routes`], which every middleware consults.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod storage;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use tower::ServiceBuilder;

use crate::state::AppState;

/// Request bodies above this size are rejected outright.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Assemble the full service: routes plus the middleware pipeline,
/// outermost first.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(axum::middleware::from_fn(middleware::recover_panics))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(middleware::cors())
        .layer(axum::middleware::from_fn(middleware::access_log))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::enforce,
        ))
        .layer(axum::middleware::from_fn(middleware::sanitize::json_bodies))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    Router::new()
        .route("/v1/health", get(handlers::health::health))
        .route("/v1/packages", get(handlers::packages::search))
        .route("/v1/packages", post(handlers::packages::publish))
        .route("/v1/packages/:name", get(handlers::packages::get_package))
        .route(
            "/v1/packages/:name/versions/:version",
            get(handlers::packages::get_version),
        )
        .route("/v1/blobs/:sha256", get(handlers::packages::download_blob))
        .route("/v1/auth/register", post(handlers::auth::register))
        .route("/v1/auth/login", post(handlers::auth::login))
        .route("/v1/auth/logout", post(handlers::auth::logout))
        .route("/v1/auth/profile", get(handlers::auth::profile))
        .route(
            "/v1/auth/change-password",
            post(handlers::auth::change_password),
        )
        .route(
            "/v1/auth/delete-account",
            delete(handlers::auth::delete_account),
        )
        .route("/v1/admin/users", get(handlers::admin::list_users))
        .route("/v1/admin/users/:id", delete(handlers::admin::delete_user))
        .layer(middleware)
        .with_state(state)
}
