use serde::Deserialize;

const CONSENT_REQUIRED: &str = "consent_required";
const INVALID_GRANT: &str = "invalid_grant";
const INTERACTION_REQUIRED: &str = "interaction_required";
const AADSTS_CONSENT_CODE: i64 = 65001;
const AADSTS_CONSENT_MARKER: &str = "AADSTS65001";
const NOT_CONSENTED_TEXT: &str = "has not consented";

/// OAuth error payload returned by the token endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TokenErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
    #[serde(default)]
    pub error_codes: Vec<i64>,
}

impl TokenErrorBody {
    pub fn new(error: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            error_description: description.into(),
            error_codes: Vec::new(),
        }
    }

    pub fn summary(&self) -> String {
        if self.error_description.is_empty() {
            self.error.clone()
        } else {
            format!("{}: {}", self.error, self.error_description)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenFailureKind {
    ConsentRequired,
    TransientOrUnknown,
}

/// Decides whether a token endpoint rejection means "a tenant admin has not
/// granted this permission yet".
///
/// The `invalid_grant`/`interaction_required` branch matches on free text because the platform only
/// reports that case inside the description. It breaks silently if the wording
/// or the AADSTS number changes; extend the unit tests below when adding shapes.
pub fn classify_token_error(body: &TokenErrorBody) -> TokenFailureKind {
    if body.error == CONSENT_REQUIRED {
        return TokenFailureKind::ConsentRequired;
    }
    if body.error_codes.contains(&AADSTS_CONSENT_CODE) {
        return TokenFailureKind::ConsentRequired;
    }
    if (body.error == INVALID_GRANT || body.error == INTERACTION_REQUIRED)
        && (body.error_description.contains(NOT_CONSENTED_TEXT)
            || body.error_description.contains(AADSTS_CONSENT_MARKER))
    {
        return TokenFailureKind::ConsentRequired;
    }
    TokenFailureKind::TransientOrUnknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_required_code() {
        let body = TokenErrorBody::new("consent_required", "");
        assert_eq!(
            classify_token_error(&body),
            TokenFailureKind::ConsentRequired
        );
    }

    #[test]
    fn invalid_grant_with_not_consented_text() {
        let body = TokenErrorBody::new(
            "invalid_grant",
            "The user or administrator has not consented to use the application with ID 'abc'.",
        );
        assert_eq!(
            classify_token_error(&body),
            TokenFailureKind::ConsentRequired
        );
    }

    #[test]
    fn invalid_grant_with_aadsts_identifier() {
        let body = TokenErrorBody::new(
            "invalid_grant",
            "AADSTS65001: Send an interactive authorization request for this user and resource.",
        );
        assert_eq!(
            classify_token_error(&body),
            TokenFailureKind::ConsentRequired
        );
    }

    #[test]
    fn interaction_required_with_consent_text() {
        let body = TokenErrorBody::new(
            "interaction_required",
            "AADSTS65001: The user or administrator has not consented to use the application.",
        );
        assert_eq!(
            classify_token_error(&body),
            TokenFailureKind::ConsentRequired
        );
    }

    #[test]
    fn structured_error_codes() {
        let body: TokenErrorBody = serde_json::from_str(
            r#"{"error":"interaction_required","error_description":"see codes","error_codes":[65001]}"#,
        )
        .expect("body");
        assert_eq!(
            classify_token_error(&body),
            TokenFailureKind::ConsentRequired
        );
    }

    #[test]
    fn expired_refresh_token_is_not_consent() {
        let body = TokenErrorBody {
            error: "invalid_grant".into(),
            error_description: "AADSTS700082: The refresh token has expired due to inactivity."
                .into(),
            error_codes: vec![700082],
        };
        assert_eq!(
            classify_token_error(&body),
            TokenFailureKind::TransientOrUnknown
        );
    }

    #[test]
    fn consent_text_under_other_codes_is_not_consent() {
        let body = TokenErrorBody::new("invalid_client", "user has not consented");
        assert_eq!(
            classify_token_error(&body),
            TokenFailureKind::TransientOrUnknown
        );
    }

    #[test]
    fn server_errors_are_transient() {
        let body = TokenErrorBody::new("temporarily_unavailable", "try again");
        assert_eq!(
            classify_token_error(&body),
            TokenFailureKind::TransientOrUnknown
        );
        assert_eq!(
            classify_token_error(&TokenErrorBody::default()),
            TokenFailureKind::TransientOrUnknown
        );
    }
}
