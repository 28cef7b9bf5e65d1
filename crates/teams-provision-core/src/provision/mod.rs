//! Four-step bot provisioning pipeline.
//!
//! The pipeline is an explicit state machine: every [`ProvisionState`] but the
//! last names the step that runs next, and [`Provisioner::advance`] performs
//! exactly one step. Steps never retry; the only recovery path is a single
//! update call when the bot registration already exists.

pub mod dev_portal;
pub mod graph;
pub mod package;

use std::{fmt, sync::Arc};

use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::{
    error::{ProvisionError, StepError},
    token_cache::TokenSource,
    types::{AccessToken, Account, Credentials},
};

pub use dev_portal::{BotRegistration, DevPortalApi, LiveDevPortalClient};
pub use graph::{GraphApi, LiveGraphClient};
pub use package::{AppPackager, PackageInput, ZipPackager};

pub const GRAPH_PROVISION_SCOPE: &str = "https://graph.microsoft.com/Application.ReadWrite.All";
pub const DEV_PORTAL_PROVISION_SCOPE: &str =
    "https://dev.teams.microsoft.com/AppStudio.ReadWrite.All";
const DEFAULT_SECRET_VALIDITY_DAYS: i64 = 730;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProvisionStep {
    CreateIdentity,
    MintSecret,
    CreateAppPackage,
    RegisterBot,
}

impl ProvisionStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProvisionStep::CreateIdentity => "create_identity",
            ProvisionStep::MintSecret => "mint_secret",
            ProvisionStep::CreateAppPackage => "create_app_package",
            ProvisionStep::RegisterBot => "register_bot",
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated input for one provisioning run. The endpoint is kept exactly as
/// supplied; parsing only checks it.
#[derive(Clone, Debug)]
pub struct ProvisionRequest {
    app_name: String,
    messaging_endpoint: String,
}

impl ProvisionRequest {
    pub fn new(app_name: &str, messaging_endpoint: &str) -> Result<Self, ProvisionError> {
        let is_https = messaging_endpoint.trim() == messaging_endpoint
            && Url::parse(messaging_endpoint).is_ok_and(|url| {
                url.scheme() == "https" && url.host_str().is_some_and(|h| !h.is_empty())
            });
        if !is_https {
            return Err(ProvisionError::InvalidEndpoint(messaging_endpoint.to_string()));
        }
        let app_name = app_name.trim();
        if app_name.is_empty() {
            return Err(ProvisionError::InvalidAppName);
        }
        Ok(Self {
            app_name: app_name.to_string(),
            messaging_endpoint: messaging_endpoint.to_string(),
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn messaging_endpoint(&self) -> &str {
        &self.messaging_endpoint
    }
}

/// Application registration created in step one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppIdentity {
    /// Also used as the bot id.
    pub client_id: String,
    pub object_id: String,
}

pub enum ProvisionState {
    CreateIdentity,
    MintSecret {
        identity: AppIdentity,
    },
    CreateAppPackage {
        identity: AppIdentity,
        secret: String,
    },
    RegisterBot {
        identity: AppIdentity,
        secret: String,
        teams_app_id: String,
    },
    Done(Credentials),
}

impl ProvisionState {
    /// Step that runs next; `None` once provisioning has finished.
    pub fn step(&self) -> Option<ProvisionStep> {
        match self {
            ProvisionState::CreateIdentity => Some(ProvisionStep::CreateIdentity),
            ProvisionState::MintSecret { .. } => Some(ProvisionStep::MintSecret),
            ProvisionState::CreateAppPackage { .. } => Some(ProvisionStep::CreateAppPackage),
            ProvisionState::RegisterBot { .. } => Some(ProvisionStep::RegisterBot),
            ProvisionState::Done(_) => None,
        }
    }
}

impl fmt::Debug for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step() {
            Some(step) => write!(f, "ProvisionState({step})"),
            None => f.write_str("ProvisionState(done)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProvisionSettings {
    pub graph_scope: String,
    pub dev_portal_scope: String,
    pub secret_validity: time::Duration,
    pub single_tenant: bool,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            graph_scope: GRAPH_PROVISION_SCOPE.into(),
            dev_portal_scope: DEV_PORTAL_PROVISION_SCOPE.into(),
            secret_validity: time::Duration::days(DEFAULT_SECRET_VALIDITY_DAYS),
            single_tenant: false,
        }
    }
}

pub struct Provisioner {
    tokens: Arc<dyn TokenSource>,
    graph: Arc<dyn GraphApi>,
    portal: Arc<dyn DevPortalApi>,
    packager: Arc<dyn AppPackager>,
    settings: ProvisionSettings,
}

impl Provisioner {
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        graph: Arc<dyn GraphApi>,
        portal: Arc<dyn DevPortalApi>,
        packager: Arc<dyn AppPackager>,
        settings: ProvisionSettings,
    ) -> Self {
        Self {
            tokens,
            graph,
            portal,
            packager,
            settings,
        }
    }

    /// Runs every step in order. The first failure aborts the run and is
    /// reported with the name of the step that failed.
    pub async fn provision(
        &self,
        account: &Account,
        request: &ProvisionRequest,
        cancel: &CancellationToken,
    ) -> Result<Credentials, ProvisionError> {
        let mut state = ProvisionState::CreateIdentity;
        loop {
            let step = match state {
                ProvisionState::Done(credentials) => {
                    info!(
                        target = "teams.provision",
                        tenant = %account.tenant_id,
                        client_id = %credentials.client_id,
                        teams_app_id = %credentials.teams_app_id,
                        "provisioning complete"
                    );
                    return Ok(credentials);
                }
                ProvisionState::CreateIdentity => ProvisionStep::CreateIdentity,
                ProvisionState::MintSecret { .. } => ProvisionStep::MintSecret,
                ProvisionState::CreateAppPackage { .. } => ProvisionStep::CreateAppPackage,
                ProvisionState::RegisterBot { .. } => ProvisionStep::RegisterBot,
            };

            info!(target = "teams.provision", %step, tenant = %account.tenant_id, "running step");
            state = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(target = "teams.provision", %step, "provisioning cancelled");
                    return Err(ProvisionError::Cancelled { step });
                }
                next = self.advance(state, account, request) => next.map_err(|source| {
                    warn!(target = "teams.provision", %step, error = %source, "step failed");
                    ProvisionError::Step { step, source }
                })?,
            };
        }
    }

    /// Performs the single step named by `state` and returns the next state.
    /// A finished state is returned unchanged without touching any remote.
    pub async fn advance(
        &self,
        state: ProvisionState,
        account: &Account,
        request: &ProvisionRequest,
    ) -> Result<ProvisionState, StepError> {
        match state {
            ProvisionState::CreateIdentity => {
                let token = self.token(account, &self.settings.graph_scope).await?;
                let identity = self
                    .graph
                    .create_application(&token, request.app_name())
                    .await?;
                info!(
                    target = "teams.provision",
                    client_id = %identity.client_id,
                    "application registered"
                );
                Ok(ProvisionState::MintSecret { identity })
            }
            ProvisionState::MintSecret { identity } => {
                let token = self.token(account, &self.settings.graph_scope).await?;
                let expires_at = OffsetDateTime::now_utc()
                    .checked_add(self.settings.secret_validity)
                    .ok_or(StepError::SecretValidity(self.settings.secret_validity))?;
                let secret = self
                    .graph
                    .add_password(&token, &identity.object_id, expires_at)
                    .await?;
                Ok(ProvisionState::CreateAppPackage { identity, secret })
            }
            ProvisionState::CreateAppPackage { identity, secret } => {
                let package = self
                    .packager
                    .build(&PackageInput {
                        app_name: request.app_name(),
                        client_id: &identity.client_id,
                        messaging_endpoint: request.messaging_endpoint(),
                    })
                    .map_err(StepError::Package)?;
                let token = self.token(account, &self.settings.dev_portal_scope).await?;
                let teams_app_id = self.portal.import_package(&token, package).await?;
                Ok(ProvisionState::RegisterBot {
                    identity,
                    secret,
                    teams_app_id,
                })
            }
            ProvisionState::RegisterBot {
                identity,
                secret,
                teams_app_id,
            } => {
                let registration = BotRegistration::teams(
                    &identity.client_id,
                    request.app_name(),
                    request.messaging_endpoint(),
                    self.settings.single_tenant,
                );
                let token = self.token(account, &self.settings.dev_portal_scope).await?;
                match self.portal.register_bot(&token, &registration).await {
                    Ok(()) => {}
                    Err(err) if err.is_conflict() => {
                        info!(
                            target = "teams.provision",
                            bot_id = %registration.bot_id,
                            "bot already registered; updating endpoint"
                        );
                        let token = self.token(account, &self.settings.dev_portal_scope).await?;
                        self.portal.update_bot(&token, &registration).await?;
                    }
                    Err(err) => return Err(err.into()),
                }
                Ok(ProvisionState::Done(Credentials {
                    client_id: identity.client_id,
                    client_secret: secret,
                    teams_app_id,
                    messaging_endpoint: request.messaging_endpoint().to_string(),
                    tenant_id: account.tenant_id.clone(),
                }))
            }
            ProvisionState::Done(credentials) => Ok(ProvisionState::Done(credentials)),
        }
    }

    async fn token(&self, account: &Account, scope: &str) -> Result<AccessToken, StepError> {
        Ok(self.tokens.acquire_silent(account, scope).await?)
    }
}
