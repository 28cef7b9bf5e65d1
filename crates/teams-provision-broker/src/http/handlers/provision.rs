use axum::{
    Json,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::http::{SharedContext, error::AppError, session::SessionId};

#[derive(Deserialize)]
pub struct ProvisionBody {
    pub app_name: String,
    #[serde(alias = "endpoint")]
    pub messaging_endpoint: String,
}

/// Runs the whole pipeline for the caller's session. The response carries the
/// client secret, so it is marked uncacheable.
pub async fn provision(
    State(ctx): State<SharedContext>,
    SessionId(session_id): SessionId,
    Json(body): Json<ProvisionBody>,
) -> Result<Response, AppError> {
    let cancel = CancellationToken::new();
    // Fires when the client disconnects and axum drops this future.
    let _guard = cancel.clone().drop_guard();

    let credentials = ctx
        .service
        .provision(&session_id, &body.app_name, &body.messaging_endpoint, &cancel)
        .await?;
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        Json(credentials),
    )
        .into_response())
}
