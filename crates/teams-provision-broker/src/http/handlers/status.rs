use axum::{Json, extract::State};
use serde_json::{Value, json};
use teams_provision_core::Account;

use crate::http::{SharedContext, error::AppError, session::SessionId};

pub async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn me(
    State(ctx): State<SharedContext>,
    SessionId(session_id): SessionId,
) -> Result<Json<Account>, AppError> {
    let session = ctx
        .service
        .session(&session_id)
        .await
        .ok_or_else(|| AppError::unauthorized("session is unknown or expired"))?;
    Ok(Json(session.account))
}
