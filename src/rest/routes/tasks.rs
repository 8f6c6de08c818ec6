// rest/routes/tasks.rs — task lifecycle routes.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::EngineError;
use crate::rest::principal;
use crate::tasks::engine::{CreateTaskRequest, UpdateTaskRequest};
use crate::tasks::storage::TaskFilter;
use crate::AppContext;

pub async fn create_task(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Value>), EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let task = ctx.engine.create_task(&caller, body).await?;
    Ok((StatusCode::CREATED, Json(serde_json::to_value(&task).map_err(anyhow::Error::from)?)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTasksQuery {
    pub search: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assigned_to: Option<String>,
}

pub async fn search_tasks(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Query(query): Query<SearchTasksQuery>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let filter = TaskFilter {
        search: query.search,
        status: query.status,
        priority: query.priority,
        assigned_to: query.assigned_to,
    };
    let tasks = ctx.engine.search_tasks(&caller, filter).await?;
    Ok(Json(json!({ "count": tasks.len(), "tasks": tasks })))
}

pub async fn get_task(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let task = ctx.engine.get_task(&caller, &id).await?;
    Ok(Json(serde_json::to_value(&task).map_err(anyhow::Error::from)?))
}

pub async fn update_task(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskRequest>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let task = ctx.engine.update_task(&caller, &id, body).await?;
    Ok(Json(serde_json::to_value(&task).map_err(anyhow::Error::from)?))
}

pub async fn delete_task(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    ctx.engine.delete_task(&caller, &id).await?;
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

pub async fn complete_task(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    ctx.engine.complete_task(&caller, &id).await?;
    Ok(Json(json!({ "message": "Task completed successfully" })))
}

#[derive(Deserialize)]
pub struct SubmitExcuseRequest {
    pub excuse: Option<String>,
}

pub async fn submit_excuse(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<SubmitExcuseRequest>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    ctx.engine
        .submit_excuse(&caller, &id, body.excuse.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(json!({ "message": "Excuse submitted successfully" })))
}

#[derive(Deserialize)]
pub struct RespondExcuseRequest {
    pub response: Option<String>,
    pub message: Option<String>,
}

pub async fn respond_excuse(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<RespondExcuseRequest>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    ctx.engine
        .respond_excuse(
            &caller,
            &id,
            body.response.as_deref().unwrap_or(""),
            body.message.as_deref(),
        )
        .await?;
    Ok(Json(json!({ "message": "Excuse reviewed successfully" })))
}

pub async fn unlock_task(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    ctx.engine.unlock_task(&caller, &id).await?;
    Ok(Json(json!({ "message": "Task unlocked successfully" })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignTaskRequest {
    pub assigned_to: Option<String>,
}

pub async fn reassign_task(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<ReassignTaskRequest>,
) -> Result<Json<Value>, EngineError> {
    let caller = principal(&ctx, &headers).await?;
    let task = ctx
        .engine
        .reassign_task(&caller, &id, body.assigned_to.as_deref().unwrap_or(""))
        .await?;
    Ok(Json(json!({ "message": "Task reassigned successfully", "task": task })))
}
