// rest/routes/users.rs — profile self-service and the assignee task list.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::EngineError;
use crate::identity::UpdateProfileRequest;
use crate::rest::principal;
use crate::storage::UserRow;
use crate::AppContext;

/// Wire form of a user — password and answer hashes never leave the daemon.
pub(crate) fn user_json(user: &UserRow) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "email": user.email,
        "role": user.role,
        "verified": user.verified,
        "securityQuestion": user.security_question,
        "createdAt": user.created_at,
        "updatedAt": user.updated_at,
    })
}

pub async fn get_me(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let user = ctx.identity.profile(&caller.user_id).await?;
    Ok(Json(user_json(&user)))
}

pub async fn update_me(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    ctx.identity.update_profile(&caller.user_id, body).await?;
    Ok(Json(json!({ "message": "Profile updated successfully" })))
}

pub async fn delete_me(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    ctx.identity.delete_account(&caller.user_id).await?;
    Ok(Json(json!({ "message": "Account deleted successfully" })))
}

pub async fn my_tasks(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let tasks = ctx.engine.my_tasks(&caller).await?;
    Ok(Json(json!({ "count": tasks.len(), "tasks": tasks })))
}
