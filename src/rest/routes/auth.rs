// rest/routes/auth.rs — registration, login, and password-reset routes.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::EngineError;
use crate::identity::{RegisterRequest, Role};
use crate::AppContext;

pub async fn register(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), EngineError> {
    let (user_id, role) = ctx.identity.register(body).await?;
    let message = match role {
        Role::Admin => "First admin registered successfully",
        Role::User => "User registered successfully",
    };
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": message, "userId": user_id })),
    ))
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, EngineError> {
    let outcome = ctx.identity.login(&body.username, &body.password).await?;
    Ok(Json(json!({
        "token": outcome.token,
        "role": outcome.role.as_str(),
        "expiresAt": outcome.expires_at,
    })))
}

#[derive(Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

pub async fn verify_email(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<Value>, EngineError> {
    ctx.identity.verify_email(&query.token).await?;
    Ok(Json(json!({ "message": "Email verified successfully" })))
}

#[derive(Deserialize)]
pub struct SecurityQuestionRequest {
    pub username: String,
}

pub async fn security_question(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<SecurityQuestionRequest>,
) -> Result<Json<Value>, EngineError> {
    let question = ctx.identity.security_question(&body.username).await?;
    Ok(Json(json!({ "securityQuestion": question })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub username: String,
    pub answer: String,
    pub new_password: String,
}

pub async fn reset_password(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, EngineError> {
    ctx.identity
        .reset_password(&body.username, &body.answer, &body.new_password)
        .await?;
    Ok(Json(json!({ "message": "Password reset successful" })))
}
