// rest/mod.rs — Public REST API server.
//
// Axum HTTP server, local bind by default.
//
// Endpoints:
//   GET    /api/v1/health
//   POST   /api/v1/auth/register
//   POST   /api/v1/auth/login
//   GET    /api/v1/auth/verify-email?token=...
//   POST   /api/v1/auth/security-question
//   POST   /api/v1/auth/reset-password
//   GET    /api/v1/me            PATCH /api/v1/me        DELETE /api/v1/me
//   GET    /api/v1/me/tasks
//   GET    /api/v1/tasks         POST  /api/v1/tasks               (admin)
//   GET    /api/v1/tasks/{id}    PATCH + DELETE                    (admin)
//   POST   /api/v1/tasks/{id}/complete                             (assignee)
//   POST   /api/v1/tasks/{id}/excuse                               (assignee)
//   POST   /api/v1/tasks/{id}/respond                              (admin)
//   POST   /api/v1/tasks/{id}/unlock                               (admin)
//   POST   /api/v1/tasks/{id}/reassign                             (admin)
//   GET    /api/v1/admin/users   POST  /api/v1/admin/users         (admin)
//   GET    /api/v1/admin/users/{id}    DELETE                      (admin)
//   GET    /api/v1/admin/dashboard                                 (admin)
//   GET    /api/v1/admin/excuses                                   (admin)

pub mod routes;

use anyhow::Result;
use axum::http::{header, HeaderMap};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::error::EngineError;
use crate::identity::Principal;
use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(routes::health::health))
        // Auth (no bearer required)
        .route("/api/v1/auth/register", post(routes::auth::register))
        .route("/api/v1/auth/login", post(routes::auth::login))
        .route("/api/v1/auth/verify-email", get(routes::auth::verify_email))
        .route(
            "/api/v1/auth/security-question",
            post(routes::auth::security_question),
        )
        .route(
            "/api/v1/auth/reset-password",
            post(routes::auth::reset_password),
        )
        // Profile self-service
        .route(
            "/api/v1/me",
            get(routes::users::get_me)
                .patch(routes::users::update_me)
                .delete(routes::users::delete_me),
        )
        .route("/api/v1/me/tasks", get(routes::users::my_tasks))
        // Tasks
        .route(
            "/api/v1/tasks",
            get(routes::tasks::search_tasks).post(routes::tasks::create_task),
        )
        .route(
            "/api/v1/tasks/{id}",
            get(routes::tasks::get_task)
                .patch(routes::tasks::update_task)
                .delete(routes::tasks::delete_task),
        )
        .route(
            "/api/v1/tasks/{id}/complete",
            post(routes::tasks::complete_task),
        )
        .route(
            "/api/v1/tasks/{id}/excuse",
            post(routes::tasks::submit_excuse),
        )
        .route(
            "/api/v1/tasks/{id}/respond",
            post(routes::tasks::respond_excuse),
        )
        .route("/api/v1/tasks/{id}/unlock", post(routes::tasks::unlock_task))
        .route(
            "/api/v1/tasks/{id}/reassign",
            post(routes::tasks::reassign_task),
        )
        // Admin user management + read views
        .route(
            "/api/v1/admin/users",
            get(routes::admin::search_users).post(routes::admin::create_user),
        )
        .route(
            "/api/v1/admin/users/{id}",
            get(routes::admin::get_user).delete(routes::admin::delete_user),
        )
        .route("/api/v1/admin/dashboard", get(routes::admin::dashboard))
        .route("/api/v1/admin/excuses", get(routes::admin::excuse_inbox))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

/// Resolve the caller from the `Authorization: Bearer <token>` header.
pub(crate) async fn principal(
    ctx: &AppContext,
    headers: &HeaderMap,
) -> Result<Principal, EngineError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| EngineError::unauthorized("no token provided"))?;
    ctx.identity.authenticate(token).await
}
