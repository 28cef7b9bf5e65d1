use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};
use url::Url;

use crate::{
    classify::{TokenFailureKind, classify_token_error},
    error::{AuthError, SilentTokenError},
    identity::{IdentityProvider, TokenEndpointError, account_from_id_token},
    types::{AccessToken, Account},
};

/// Source of resource-scoped access tokens for an authenticated account.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// `scope` must name exactly one resource, e.g.
    /// `https://graph.microsoft.com/Application.ReadWrite.All`.
    async fn acquire_silent(
        &self,
        account: &Account,
        scope: &str,
    ) -> Result<AccessToken, SilentTokenError>;
}

#[derive(Clone)]
struct CachedCredential {
    account: Account,
    refresh_token: String,
}

/// Process-local credential cache: one refresh token per signed-in account.
pub struct TokenCache {
    identity: Arc<dyn IdentityProvider>,
    credentials: DashMap<String, CachedCredential>,
}

impl TokenCache {
    pub fn new(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            identity,
            credentials: DashMap::new(),
        }
    }

    pub fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        self.identity.authorize_url(state)
    }

    /// Exchanges an authorization code and remembers the resulting credential.
    pub async fn redeem_code(&self, code: &str) -> Result<Account, AuthError> {
        let grant = self
            .identity
            .exchange_code(code)
            .await
            .map_err(|err| match err {
                TokenEndpointError::Rejected(body) => AuthError::InvalidCode(body.summary()),
                TokenEndpointError::Remote(remote) => AuthError::Upstream(remote),
            })?;
        let id_token = grant
            .id_token
            .as_deref()
            .ok_or_else(|| AuthError::InvalidCode("token response carried no id_token".into()))?;
        let account = account_from_id_token(id_token).map_err(AuthError::InvalidCode)?;
        let refresh_token = grant.refresh_token.ok_or_else(|| {
            AuthError::InvalidCode("token response carried no refresh_token".into())
        })?;

        self.credentials.insert(
            account.home_account_id.clone(),
            CachedCredential {
                account: account.clone(),
                refresh_token,
            },
        );
        info!(
            target = "teams.auth",
            account = %account.home_account_id,
            tenant = %account.tenant_id,
            "cached credential for signed-in account"
        );
        Ok(account)
    }

    pub fn contains(&self, account: &Account) -> bool {
        self.credentials
            .get(&account.home_account_id)
            .is_some_and(|entry| entry.account == *account)
    }

    fn refresh_token_for(&self, account: &Account) -> Option<String> {
        self.credentials
            .get(&account.home_account_id)
            .filter(|entry| entry.account == *account)
            .map(|entry| entry.refresh_token.clone())
    }

    fn rotate(&self, account: &Account, refresh_token: String) {
        if let Some(mut entry) = self.credentials.get_mut(&account.home_account_id) {
            entry.refresh_token = refresh_token;
        }
    }
}

#[async_trait]
impl TokenSource for TokenCache {
    async fn acquire_silent(
        &self,
        account: &Account,
        scope: &str,
    ) -> Result<AccessToken, SilentTokenError> {
        let Some(refresh_token) = self.refresh_token_for(account) else {
            return Err(SilentTokenError::TransientOrUnknown {
                scope: scope.to_string(),
                detail: "account is not in the token cache".into(),
            });
        };

        match self
            .identity
            .redeem_refresh_token(&refresh_token, scope)
            .await
        {
            Ok(grant) => {
                if let Some(rotated) = grant.refresh_token {
                    self.rotate(account, rotated);
                }
                debug!(target = "teams.auth", scope, "silent token acquired");
                Ok(AccessToken::new(grant.access_token))
            }
            Err(TokenEndpointError::Rejected(body)) => match classify_token_error(&body) {
                TokenFailureKind::ConsentRequired => Err(SilentTokenError::ConsentRequired {
                    scope: scope.to_string(),
                    detail: body.summary(),
                }),
                TokenFailureKind::TransientOrUnknown => {
                    Err(SilentTokenError::TransientOrUnknown {
                        scope: scope.to_string(),
                        detail: body.summary(),
                    })
                }
            },
            Err(TokenEndpointError::Remote(err)) => Err(SilentTokenError::TransientOrUnknown {
                scope: scope.to_string(),
                detail: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classify::TokenErrorBody, error::RemoteError, identity::TokenGrant,
        identity::tests::encode_id_token,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedIdentity {
        refresh_calls: Mutex<Vec<(String, String)>>,
        rejection: Option<TokenErrorBody>,
    }

    #[async_trait]
    impl IdentityProvider for ScriptedIdentity {
        fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
            Ok(Url::parse(&format!("https://login.example.com/authorize?state={state}")).unwrap())
        }

        async fn exchange_code(&self, code: &str) -> Result<TokenGrant, TokenEndpointError> {
            if code == "bad" {
                return Err(TokenEndpointError::Rejected(TokenErrorBody::new(
                    "invalid_grant",
                    "AADSTS70008: code expired",
                )));
            }
            Ok(TokenGrant {
                access_token: "initial".into(),
                refresh_token: Some(format!("refresh-{code}")),
                id_token: Some(encode_id_token(serde_json::json!({
                    "oid": code,
                    "tid": "tenant-1",
                    "preferred_username": format!("{code}@contoso.com"),
                }))),
                expires_in: Some(3600),
            })
        }

        async fn redeem_refresh_token(
            &self,
            refresh_token: &str,
            scope: &str,
        ) -> Result<TokenGrant, TokenEndpointError> {
            self.refresh_calls
                .lock()
                .unwrap()
                .push((refresh_token.to_string(), scope.to_string()));
            if let Some(body) = &self.rejection {
                return Err(TokenEndpointError::Rejected(body.clone()));
            }
            if scope.contains("offline") {
                return Err(TokenEndpointError::Remote(RemoteError::InvalidResponse {
                    service: "test",
                    message: "unexpected scope".into(),
                }));
            }
            Ok(TokenGrant {
                access_token: format!("token-for-{scope}"),
                refresh_token: Some(format!("{refresh_token}+")),
                id_token: None,
                expires_in: Some(3600),
            })
        }
    }

    #[tokio::test]
    async fn acquires_and_rotates_refresh_token() {
        let identity = Arc::new(ScriptedIdentity::default());
        let cache = TokenCache::new(identity.clone());
        let account = cache.redeem_code("ada").await.expect("account");
        assert_eq!(account.home_account_id, "ada.tenant-1");
        assert!(cache.contains(&account));

        let token = cache
            .acquire_silent(&account, "https://graph.microsoft.com/User.Read")
            .await
            .expect("token");
        assert_eq!(token.as_str(), "token-for-https://graph.microsoft.com/User.Read");
        cache
            .acquire_silent(&account, "https://dev.teams.microsoft.com/AppStudio.ReadWrite.All")
            .await
            .expect("token");

        let calls = identity.refresh_calls.lock().unwrap().clone();
        assert_eq!(calls[0].0, "refresh-ada");
        assert_eq!(calls[1].0, "refresh-ada+");
    }

    #[tokio::test]
    async fn rejected_code_is_invalid_code() {
        let cache = TokenCache::new(Arc::new(ScriptedIdentity::default()));
        assert!(matches!(
            cache.redeem_code("bad").await,
            Err(AuthError::InvalidCode(_))
        ));
    }

    #[tokio::test]
    async fn unknown_account_never_gets_a_token() {
        let identity = Arc::new(ScriptedIdentity::default());
        let cache = TokenCache::new(identity.clone());
        let stranger = Account {
            home_account_id: "mallory.tenant-1".into(),
            tenant_id: "tenant-1".into(),
            username: "mallory@contoso.com".into(),
            name: None,
        };
        let err = cache
            .acquire_silent(&stranger, "https://graph.microsoft.com/User.Read")
            .await
            .unwrap_err();
        assert!(!err.is_consent_required());
        assert!(identity.refresh_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn tampered_account_is_not_served() {
        let identity = Arc::new(ScriptedIdentity::default());
        let cache = TokenCache::new(identity.clone());
        let mut account = cache.redeem_code("ada").await.expect("account");
        account.tenant_id = "other-tenant".into();
        assert!(!cache.contains(&account));
        assert!(
            cache
                .acquire_silent(&account, "https://graph.microsoft.com/User.Read")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn consent_rejection_is_classified() {
        let identity = Arc::new(ScriptedIdentity {
            rejection: Some(TokenErrorBody::new("consent_required", "admin approval needed")),
            ..ScriptedIdentity::default()
        });
        let cache = TokenCache::new(identity);
        let account = cache.redeem_code("ada").await.expect("account");
        let err = cache
            .acquire_silent(&account, "https://graph.microsoft.com/Application.ReadWrite.All")
            .await
            .unwrap_err();
        assert!(err.is_consent_required());
    }

    #[tokio::test]
    async fn transport_failures_are_transient() {
        let identity = Arc::new(ScriptedIdentity::default());
        let cache = TokenCache::new(identity);
        let account = cache.redeem_code("ada").await.expect("account");
        let err = cache
            .acquire_silent(&account, "https://offline.example.com/x")
            .await
            .unwrap_err();
        assert!(matches!(err, SilentTokenError::TransientOrUnknown { .. }));
    }
}
