use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::info;
use ulid::Ulid;
use url::Url;

use crate::{
    consent::{ConsentUrlBuilder, ScopeVerifier},
    error::{AuthError, ConsentCheckError, ProvisionError},
    identity::IdentityProvider,
    pending::PendingAuthStore,
    provision::{AppPackager, DevPortalApi, GraphApi, ProvisionRequest, ProvisionSettings, Provisioner},
    session::SessionStore,
    token_cache::TokenCache,
    types::{Credentials, RequiredScope, ScopeCheckResult, Session},
};

/// Redirect target for an interactive sign-in plus the state it carries.
#[derive(Clone, Debug)]
pub struct AuthStart {
    pub url: Url,
    pub state: String,
}

/// Remote collaborators used by the provisioning pipeline.
pub struct Collaborators {
    pub graph: Arc<dyn GraphApi>,
    pub portal: Arc<dyn DevPortalApi>,
    pub packager: Arc<dyn AppPackager>,
}

#[derive(Clone, Debug)]
pub struct ServiceSettings {
    pub required_scopes: Vec<RequiredScope>,
    pub consent: ConsentUrlBuilder,
    pub provision: ProvisionSettings,
    pub auth_state_ttl: Duration,
}

/// The four operations offered to the UI layer, plus session housekeeping.
pub struct ProvisioningService {
    tokens: Arc<TokenCache>,
    sessions: Arc<dyn SessionStore>,
    pending: PendingAuthStore,
    verifier: ScopeVerifier,
    provisioner: Provisioner,
}

impl ProvisioningService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        sessions: Arc<dyn SessionStore>,
        collaborators: Collaborators,
        settings: ServiceSettings,
    ) -> Self {
        let tokens = Arc::new(TokenCache::new(identity));
        let verifier = ScopeVerifier::new(
            tokens.clone(),
            sessions.clone(),
            settings.required_scopes,
            settings.consent,
        );
        let provisioner = Provisioner::new(
            tokens.clone(),
            collaborators.graph,
            collaborators.portal,
            collaborators.packager,
            settings.provision,
        );
        Self {
            tokens,
            sessions,
            pending: PendingAuthStore::new(settings.auth_state_ttl),
            verifier,
            provisioner,
        }
    }

    pub fn start_auth(&self) -> Result<AuthStart, AuthError> {
        let state = Ulid::new().to_string();
        let url = self.tokens.authorize_url(&state)?;
        self.pending.insert(state.clone());
        Ok(AuthStart { url, state })
    }

    /// Redeems the code returned to the redirect URI and opens a session.
    pub async fn complete_auth(&self, state: &str, code: &str) -> Result<Session, AuthError> {
        if !self.pending.claim(state) {
            return Err(AuthError::InvalidState);
        }
        let account = self.tokens.redeem_code(code).await?;
        let session = Session::new(account);
        self.sessions.set(session.clone()).await;
        info!(
            target = "teams.auth",
            tenant = %session.account.tenant_id,
            "session opened"
        );
        Ok(session)
    }

    pub async fn check_consent(
        &self,
        session_id: &str,
    ) -> Result<ScopeCheckResult, ConsentCheckError> {
        self.verifier.check_consent(session_id).await
    }

    pub async fn provision(
        &self,
        session_id: &str,
        app_name: &str,
        messaging_endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<Credentials, ProvisionError> {
        let session = self
            .sessions
            .get(session_id)
            .await
            .ok_or(ProvisionError::InvalidSession)?;
        let request = ProvisionRequest::new(app_name, messaging_endpoint)?;
        info!(
            target = "teams.provision",
            tenant = %session.account.tenant_id,
            app_name = %request.app_name(),
            endpoint = %request.messaging_endpoint(),
            "provisioning requested"
        );
        self.provisioner
            .provision(&session.account, &request, cancel)
            .await
    }

    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).await
    }

    pub async fn logout(&self, session_id: &str) {
        self.sessions.delete(session_id).await;
    }

    /// Forgets sign-in attempts whose callback never arrived.
    pub fn purge_expired_auth_states(&self) -> usize {
        self.pending.purge_expired()
    }
}
