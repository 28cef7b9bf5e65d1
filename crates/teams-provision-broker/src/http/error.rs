use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use teams_provision_core::{AuthError, ConsentCheckError, ProvisionError, StepError};

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    step: Option<&'static str>,
    upstream_status: Option<u16>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    upstream_status: Option<u16>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            step: None,
            upstream_status: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
                step: self.step,
                upstream_status: self.upstream_status,
            }),
        )
            .into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::InvalidCode(_) | AuthError::InvalidState => {
                AppError::bad_request(value.to_string())
            }
            AuthError::Upstream(_) => AppError::bad_gateway(value.to_string()),
            AuthError::Configuration(_) => AppError::internal(value.to_string()),
        }
    }
}

impl From<ConsentCheckError> for AppError {
    fn from(value: ConsentCheckError) -> Self {
        match value {
            ConsentCheckError::InvalidSession => AppError::unauthorized(value.to_string()),
            ConsentCheckError::UnexpectedUpstream(_) => AppError::bad_gateway(value.to_string()),
        }
    }
}

impl From<ProvisionError> for AppError {
    fn from(value: ProvisionError) -> Self {
        let status = match &value {
            ProvisionError::InvalidSession => StatusCode::UNAUTHORIZED,
            ProvisionError::InvalidEndpoint(_) | ProvisionError::InvalidAppName => {
                StatusCode::BAD_REQUEST
            }
            ProvisionError::Step { .. } => StatusCode::BAD_GATEWAY,
            ProvisionError::Cancelled { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let upstream_status = match &value {
            ProvisionError::Step {
                source: StepError::Remote(remote),
                ..
            } => remote.status(),
            _ => None,
        };
        Self {
            status,
            message: value.to_string(),
            step: value.step().map(|step| step.as_str()),
            upstream_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teams_provision_core::{ProvisionStep, RemoteError};

    #[test]
    fn step_failures_carry_step_and_upstream_status() {
        let err = AppError::from(ProvisionError::Step {
            step: ProvisionStep::RegisterBot,
            source: StepError::Remote(RemoteError::Http {
                service: "developer portal",
                status: 500,
                body: "boom".into(),
            }),
        });
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.step, Some("register_bot"));
        assert_eq!(err.upstream_status, Some(500));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn validation_errors_are_client_errors() {
        assert_eq!(
            AppError::from(ProvisionError::InvalidEndpoint("http://x".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(ConsentCheckError::InvalidSession).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(AuthError::InvalidCode("expired".into())).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
