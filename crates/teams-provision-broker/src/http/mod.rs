pub mod error;
pub mod handlers;
pub mod session;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use teams_provision_core::{
    Collaborators, ConsentUrlBuilder, IdentityConfig, InMemorySessionStore, LiveDevPortalClient,
    LiveGraphClient, MicrosoftIdentity, ProvisionSettings, ProvisioningService, ServiceSettings,
    ZipPackager, remote::http_client,
};
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::BrokerConfig;

#[derive(Clone)]
pub struct AppContext {
    pub service: Arc<ProvisioningService>,
    pub sessions: Arc<InMemorySessionStore>,
    pub cookie_secure: bool,
}

pub type SharedContext = Arc<AppContext>;

impl AppContext {
    /// Wires the live identity, Graph and Developer Portal clients.
    pub fn from_config(config: &BrokerConfig) -> anyhow::Result<Self> {
        let http = http_client(config.http_timeout)?;
        let identity = MicrosoftIdentity::new(
            http.clone(),
            IdentityConfig {
                authority: config.authority.clone(),
                tenant: config.auth_tenant.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                redirect_uri: config.redirect_uri.clone(),
                initial_scopes: config.initial_scopes.clone(),
            },
        )?;
        let sessions = Arc::new(InMemorySessionStore::new(config.session_idle_ttl));
        let service = ProvisioningService::new(
            Arc::new(identity),
            sessions.clone(),
            Collaborators {
                graph: Arc::new(LiveGraphClient::new(
                    http.clone(),
                    config.graph_base_url.clone(),
                )),
                portal: Arc::new(LiveDevPortalClient::new(
                    http,
                    config.dev_portal_base_url.clone(),
                )),
                packager: Arc::new(ZipPackager::default()),
            },
            ServiceSettings {
                required_scopes: config.required_scopes.clone(),
                consent: ConsentUrlBuilder::new(
                    config.authority.clone(),
                    config.client_id.clone(),
                    config.admin_consent_redirect_uri.clone(),
                ),
                provision: ProvisionSettings {
                    secret_validity: config.secret_validity,
                    ..ProvisionSettings::default()
                },
                auth_state_ttl: config.auth_state_ttl,
            },
        );
        Ok(Self {
            service: Arc::new(service),
            sessions,
            cookie_secure: config.cookie_secure,
        })
    }
}

pub fn router(context: SharedContext) -> Router {
    Router::new()
        .route("/healthz", get(handlers::status::healthz))
        .route("/auth/login", get(handlers::auth::login))
        .route("/auth/callback", get(handlers::auth::callback))
        .route(
            "/auth/admin-consent/callback",
            get(handlers::auth::admin_consent_callback),
        )
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/api/me", get(handlers::status::me))
        .route("/api/consent", get(handlers::consent::check))
        .route("/api/provision", post(handlers::provision::provision))
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(context)
}
