// rest/routes/admin.rs — user administration, dashboard, excuse inbox.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::users::user_json;
use crate::error::EngineError;
use crate::identity::CreateUserRequest;
use crate::rest::principal;
use crate::AppContext;

#[derive(Deserialize)]
pub struct SearchUsersQuery {
    pub search: Option<String>,
    pub role: Option<String>,
}

pub async fn search_users(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(query): Query<SearchUsersQuery>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let users = ctx
        .identity
        .search_users(&caller, query.search.as_deref(), query.role.as_deref())
        .await?;
    let users: Vec<Value> = users.iter().map(user_json).collect();
    Ok(Json(json!({ "count": users.len(), "users": users })))
}

pub async fn get_user(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let user = ctx.identity.get_user(&caller, &id).await?;
    Ok(Json(user_json(&user)))
}

pub async fn create_user(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let user = ctx.identity.create_user(&caller, body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "User created successfully", "user": user_json(&user) })),
    ))
}

pub async fn delete_user(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    ctx.identity.delete_user(&caller, &id).await?;
    Ok(Json(json!({ "message": "User deleted successfully" })))
}

pub async fn dashboard(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let stats = ctx.engine.dashboard(&caller).await?;
    Ok(Json(serde_json::to_value(&stats).map_err(anyhow::Error::from)?))
}

pub async fn excuse_inbox(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let tasks = ctx.engine.excuse_inbox(&caller).await?;
    Ok(Json(json!({ "count": tasks.len(), "tasks": tasks })))
}
