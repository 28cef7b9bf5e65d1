use std::sync::Arc;

use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{ConsentCheckError, SilentTokenError},
    session::SessionStore,
    token_cache::TokenSource,
    types::{Account, RequiredScope, ScopeCheckResult},
};

/// Tenant-wide admin consent URL:
/// `{authority}/{tenant}/adminconsent?client_id=..&redirect_uri=..`.
pub fn build_consent_url(
    authority: &Url,
    tenant_id: &str,
    client_id: &str,
    redirect_uri: &str,
) -> Result<Url, url::ParseError> {
    let base = authority.as_str().trim_end_matches('/');
    Url::parse_with_params(
        &format!("{base}/{tenant_id}/adminconsent"),
        &[("client_id", client_id), ("redirect_uri", redirect_uri)],
    )
}

#[derive(Clone, Debug)]
pub struct ConsentUrlBuilder {
    authority: Url,
    client_id: String,
    redirect_uri: String,
}

impl ConsentUrlBuilder {
    pub fn new(
        authority: Url,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            authority,
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn build(&self, tenant_id: &str, state: Option<&str>) -> Result<Url, url::ParseError> {
        let mut url = build_consent_url(
            &self.authority,
            tenant_id,
            &self.client_id,
            &self.redirect_uri,
        )?;
        if let Some(state) = state {
            url.query_pairs_mut().append_pair("state", state);
        }
        Ok(url)
    }
}

/// Probes every required scope with a silent acquisition and reports which
/// ones still need a tenant administrator's approval.
pub struct ScopeVerifier {
    tokens: Arc<dyn TokenSource>,
    sessions: Arc<dyn SessionStore>,
    required: Vec<RequiredScope>,
    consent: ConsentUrlBuilder,
}

impl ScopeVerifier {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        sessions: Arc<dyn SessionStore>,
        required: Vec<RequiredScope>,
        consent: ConsentUrlBuilder,
    ) -> Self {
        Self {
            tokens,
            sessions,
            required,
            consent,
        }
    }

    pub async fn check_consent(
        &self,
        session_id: &str,
    ) -> Result<ScopeCheckResult, ConsentCheckError> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or(ConsentCheckError::InvalidSession)?;
        self.check_account(&session.account).await
    }

    /// Scopes are probed in order; a failure that is not a consent gap aborts
    /// the whole check so a partial answer is never reported as authoritative.
    pub async fn check_account(
        &self,
        account: &Account,
    ) -> Result<ScopeCheckResult, ConsentCheckError> {
        let mut granted = Vec::new();
        let mut missing = Vec::new();

        for scope in &self.required {
            let qualified = scope.qualified();
            match self.tokens.acquire_silent(account, &qualified).await {
                Ok(_) => granted.push(qualified),
                Err(err @ SilentTokenError::ConsentRequired { .. }) => {
                    debug!(target = "teams.consent", scope = %qualified, error = %err, "scope lacks consent");
                    missing.push(qualified);
                }
                Err(err) => {
                    warn!(
                        target = "teams.consent",
                        scope = %qualified,
                        tenant = %account.tenant_id,
                        error = %err,
                        "consent check aborted"
                    );
                    return Err(ConsentCheckError::UnexpectedUpstream(err));
                }
            }
        }

        let consent_url = if missing.is_empty() {
            None
        } else {
            let url = self.consent.build(&account.tenant_id, None).map_err(|err| {
                ConsentCheckError::UnexpectedUpstream(SilentTokenError::TransientOrUnknown {
                    scope: missing.join(" "),
                    detail: format!("cannot build admin consent url: {err}"),
                })
            })?;
            Some(url.to_string())
        };

        info!(
            target = "teams.consent",
            tenant = %account.tenant_id,
            granted = granted.len(),
            missing = missing.len(),
            "consent check complete"
        );
        Ok(ScopeCheckResult::new(granted, missing, consent_url))
    }
}
