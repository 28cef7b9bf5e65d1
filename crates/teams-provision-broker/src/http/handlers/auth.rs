use axum::{
    Json,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use teams_provision_core::Account;
use tracing::{info, warn};

use crate::http::{
    SharedContext,
    error::AppError,
    session::{SessionId, clear_session_cookie, session_cookie},
};

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Serialize)]
pub struct SessionBody {
    pub session_id: String,
    pub account: Account,
}

#[derive(Deserialize)]
pub struct AdminConsentQuery {
    pub admin_consent: Option<String>,
    pub tenant: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Serialize)]
pub struct AdminConsentBody {
    pub admin_consent: bool,
    pub tenant: Option<String>,
}

pub async fn login(State(ctx): State<SharedContext>) -> Result<Response, AppError> {
    let start = ctx.service.start_auth()?;
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, start.url.to_string())],
    )
        .into_response())
}

pub async fn callback(
    State(ctx): State<SharedContext>,
    jar: CookieJar,
    Query(CallbackQuery {
        code,
        state,
        error,
        error_description,
    }): Query<CallbackQuery>,
) -> Result<(CookieJar, Json<SessionBody>), AppError> {
    if let Some(error) = error {
        let description = error_description.unwrap_or_default();
        warn!(target = "teams.auth", %error, "authorization denied by identity provider");
        return Err(AppError::bad_request(format!(
            "authorization failed: {error} ({description})"
        )));
    }
    let state = state.ok_or_else(|| AppError::bad_request("missing state"))?;
    let code = code.ok_or_else(|| AppError::bad_request("missing code"))?;

    let session = ctx.service.complete_auth(&state, &code).await?;
    let jar = jar.add(session_cookie(&session.id, ctx.cookie_secure));
    Ok((
        jar,
        Json(SessionBody {
            session_id: session.id,
            account: session.account,
        }),
    ))
}

/// Return leg of the tenant-wide admin consent redirect.
pub async fn admin_consent_callback(
    Query(query): Query<AdminConsentQuery>,
) -> Result<Json<AdminConsentBody>, AppError> {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_default();
        warn!(target = "teams.consent", %error, "admin consent was not granted");
        return Err(AppError::bad_request(format!(
            "admin consent failed: {error} ({description})"
        )));
    }
    let granted = query
        .admin_consent
        .as_deref()
        .is_some_and(|value| value.eq_ignore_ascii_case("true"));
    info!(
        target = "teams.consent",
        granted,
        tenant = query.tenant.as_deref().unwrap_or("unknown"),
        "admin consent returned"
    );
    Ok(Json(AdminConsentBody {
        admin_consent: granted,
        tenant: query.tenant,
    }))
}

pub async fn logout(
    State(ctx): State<SharedContext>,
    jar: CookieJar,
    SessionId(session_id): SessionId,
) -> (CookieJar, StatusCode) {
    ctx.service.logout(&session_id).await;
    (jar.add(clear_session_cookie()), StatusCode::NO_CONTENT)
}
