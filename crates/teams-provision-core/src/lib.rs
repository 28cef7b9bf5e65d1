//! Delegated-auth, admin-consent and provisioning primitives for Teams bots.

pub mod classify;
pub mod consent;
pub mod error;
pub mod identity;
pub mod pending;
pub mod provision;
pub mod remote;
pub mod service;
pub mod session;
pub mod token_cache;
pub mod types;

pub use classify::{TokenErrorBody, TokenFailureKind, classify_token_error};
pub use consent::{ConsentUrlBuilder, ScopeVerifier, build_consent_url};
pub use error::{
    AuthError, ConsentCheckError, ProvisionError, RemoteError, SilentTokenError, StepError,
};
pub use identity::{
    IdentityConfig, IdentityProvider, MicrosoftIdentity, TokenEndpointError, TokenGrant,
};
pub use pending::PendingAuthStore;
pub use provision::{
    AppIdentity, AppPackager, BotRegistration, DevPortalApi, GraphApi, LiveDevPortalClient,
    LiveGraphClient, PackageInput, ProvisionRequest, ProvisionSettings, ProvisionState,
    ProvisionStep, Provisioner, ZipPackager,
};
pub use service::{AuthStart, Collaborators, ProvisioningService, ServiceSettings};
pub use session::{InMemorySessionStore, SessionStore};
pub use token_cache::{TokenCache, TokenSource};
pub use types::{AccessToken, Account, Credentials, RequiredScope, ScopeCheckResult, Session};
