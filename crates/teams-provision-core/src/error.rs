use crate::provision::ProvisionStep;

/// Failure talking to one of the remote collaborators.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("{service} returned {status}: {body}")]
    Http {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid {service} response: {message}")]
    InvalidResponse {
        service: &'static str,
        message: String,
    },
}

impl RemoteError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

/// Result of a failed silent token acquisition, classified once at the source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SilentTokenError {
    #[error("admin consent required for `{scope}`: {detail}")]
    ConsentRequired { scope: String, detail: String },
    #[error("silent token acquisition for `{scope}` failed: {detail}")]
    TransientOrUnknown { scope: String, detail: String },
}

impl SilentTokenError {
    pub fn is_consent_required(&self) -> bool {
        matches!(self, SilentTokenError::ConsentRequired { .. })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("authorization code was rejected: {0}")]
    InvalidCode(String),
    #[error("unknown or expired authorization state")]
    InvalidState,
    #[error("identity provider error: {0}")]
    Upstream(#[from] RemoteError),
    #[error("invalid identity provider configuration: {0}")]
    Configuration(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsentCheckError {
    #[error("session is unknown or expired")]
    InvalidSession,
    #[error("unexpected upstream failure: {0}")]
    UnexpectedUpstream(#[source] SilentTokenError),
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("session is unknown or expired")]
    InvalidSession,
    #[error("messaging endpoint must be an https URL (got `{0}`)")]
    InvalidEndpoint(String),
    #[error("app name must not be empty")]
    InvalidAppName,
    #[error("{step} failed: {source}")]
    Step {
        step: ProvisionStep,
        #[source]
        source: StepError,
    },
    #[error("{step} cancelled")]
    Cancelled { step: ProvisionStep },
}

impl ProvisionError {
    pub fn step(&self) -> Option<ProvisionStep> {
        match self {
            ProvisionError::Step { step, .. } | ProvisionError::Cancelled { step } => Some(*step),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Token(#[from] SilentTokenError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("failed to build app package: {0}")]
    Package(String),
    #[error("secret validity of {0} is out of range")]
    SecretValidity(time::Duration),
}
