use axum::{Json, extract::State};
use teams_provision_core::ScopeCheckResult;

use crate::http::{SharedContext, error::AppError, session::SessionId};

pub async fn check(
    State(ctx): State<SharedContext>,
    SessionId(session_id): SessionId,
) -> Result<Json<ScopeCheckResult>, AppError> {
    let result = ctx.service.check_consent(&session_id).await?;
    Ok(Json(result))
}
