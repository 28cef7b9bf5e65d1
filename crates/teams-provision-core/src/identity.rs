use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use reqwest::{Client, header};
use serde::Deserialize;
use url::Url;

use crate::{
    classify::TokenErrorBody,
    error::{AuthError, RemoteError},
    types::Account,
};

const SERVICE: &str = "identity provider";
pub const OFFLINE_ACCESS: &str = "offline_access";
pub const DEFAULT_INITIAL_SCOPES: [&str; 4] = ["User.Read", "openid", "profile", OFFLINE_ACCESS];

/// Tokens returned by the authorization server for one grant.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenEndpointError {
    #[error("token request rejected: {}", .0.summary())]
    Rejected(TokenErrorBody),
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Authorization server used for the delegated (on-behalf-of-user) flow.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError>;

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, TokenEndpointError>;

    /// Redeems a refresh token for an access token valid for `scope` only.
    async fn redeem_refresh_token(
        &self,
        refresh_token: &str,
        scope: &str,
    ) -> Result<TokenGrant, TokenEndpointError>;
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub authority: Url,
    /// `common`, `organizations` or a tenant id.
    pub tenant: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub initial_scopes: Vec<String>,
}

impl IdentityConfig {
    fn endpoint(&self, leaf: &str) -> Result<Url, AuthError> {
        let base = self.authority.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{}/oauth2/v2.0/{leaf}", self.tenant))
            .map_err(|err| AuthError::Configuration(format!("invalid authority: {err}")))
    }
}

/// Microsoft identity platform (v2.0 endpoints), confidential client.
pub struct MicrosoftIdentity {
    http: Client,
    config: IdentityConfig,
    token_url: Url,
}

impl MicrosoftIdentity {
    pub fn new(http: Client, config: IdentityConfig) -> Result<Self, AuthError> {
        if config.client_id.is_empty() || config.client_secret.is_empty() {
            return Err(AuthError::Configuration(
                "missing Microsoft client credentials".into(),
            ));
        }
        let token_url = config.endpoint("token")?;
        Ok(Self {
            http,
            config,
            token_url,
        })
    }

    async fn execute_token_request(
        &self,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, TokenEndpointError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(params)
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                service: SERVICE,
                source,
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| RemoteError::Transport {
                service: SERVICE,
                source,
            })?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|err| {
                TokenEndpointError::Remote(RemoteError::InvalidResponse {
                    service: SERVICE,
                    message: err.to_string(),
                })
            });
        }

        match serde_json::from_str::<TokenErrorBody>(&body) {
            Ok(parsed) if !parsed.error.is_empty() => Err(TokenEndpointError::Rejected(parsed)),
            _ => Err(TokenEndpointError::Remote(RemoteError::Http {
                service: SERVICE,
                status: status.as_u16(),
                body,
            })),
        }
    }
}

#[async_trait]
impl IdentityProvider for MicrosoftIdentity {
    fn authorize_url(&self, state: &str) -> Result<Url, AuthError> {
        let mut url = self.config.endpoint("authorize")?;
        let scopes = self.config.initial_scopes.join(" ");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_mode", "query")
            .append_pair("scope", &scopes)
            .append_pair("state", state)
            .append_pair("prompt", "select_account");
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, TokenEndpointError> {
        let scopes = self.config.initial_scopes.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scopes.as_str()),
        ];
        self.execute_token_request(&params).await
    }

    async fn redeem_refresh_token(
        &self,
        refresh_token: &str,
        scope: &str,
    ) -> Result<TokenGrant, TokenEndpointError> {
        let scope = format!("{scope} {OFFLINE_ACCESS}");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
        ];
        self.execute_token_request(&params).await
    }
}

#[derive(Deserialize)]
struct IdTokenClaims {
    oid: String,
    tid: String,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Reads the account identity out of an id_token payload.
///
/// The signature is not checked: the token came straight from the token
/// endpoint over TLS and is only used to label the session.
pub fn account_from_id_token(id_token: &str) -> Result<Account, String> {
    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| "id_token is not a JWT".to_string())?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| format!("id_token payload is not base64url: {err}"))?;
    let claims: IdTokenClaims =
        serde_json::from_slice(&bytes).map_err(|err| format!("invalid id_token claims: {err}"))?;
    Ok(Account {
        home_account_id: format!("{}.{}", claims.oid, claims.tid),
        tenant_id: claims.tid,
        username: claims.preferred_username.unwrap_or_default(),
        name: claims.name,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::{collections::HashMap, time::Duration};

    fn config() -> IdentityConfig {
        IdentityConfig {
            authority: Url::parse("https://login.microsoftonline.com/").unwrap(),
            tenant: "common".into(),
            client_id: "client".into(),
            client_secret: "secret".into(),
            redirect_uri: "https://app.example.com/auth/callback".into(),
            initial_scopes: DEFAULT_INITIAL_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub(crate) fn encode_id_token(claims: serde_json::Value) -> String {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        format!("eyJhbGciOiJub25lIn0.{payload}.sig")
    }

    #[test]
    fn authorize_url_requests_minimal_scopes() {
        let http = crate::remote::http_client(Duration::from_secs(5)).unwrap();
        let identity = MicrosoftIdentity::new(http, config()).expect("identity");
        let url = identity.authorize_url("state-1").expect("url");
        assert_eq!(
            url.as_str().split('?').next(),
            Some("https://login.microsoftonline.com/common/oauth2/v2.0/authorize")
        );
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params.get("client_id").map(String::as_str), Some("client"));
        assert_eq!(params.get("state").map(String::as_str), Some("state-1"));
        assert_eq!(
            params.get("scope").map(String::as_str),
            Some("User.Read openid profile offline_access")
        );
        assert_eq!(params.get("response_type").map(String::as_str), Some("code"));
    }

    #[test]
    fn rejects_missing_credentials() {
        let http = crate::remote::http_client(Duration::from_secs(5)).unwrap();
        let mut cfg = config();
        cfg.client_secret.clear();
        assert!(matches!(
            MicrosoftIdentity::new(http, cfg),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn account_from_claims() {
        let token = encode_id_token(serde_json::json!({
            "oid": "user-1",
            "tid": "tenant-1",
            "preferred_username": "ada@contoso.com",
            "name": "Ada Lovelace"
        }));
        let account = account_from_id_token(&token).expect("account");
        assert_eq!(account.home_account_id, "user-1.tenant-1");
        assert_eq!(account.tenant_id, "tenant-1");
        assert_eq!(account.username, "ada@contoso.com");
        assert_eq!(account.name.as_deref(), Some("Ada Lovelace"));
    }

    #[test]
    fn malformed_id_token() {
        assert!(account_from_id_token("not-a-jwt").is_err());
        assert!(account_from_id_token("a.!!!.c").is_err());
        let missing_tid = encode_id_token(serde_json::json!({ "oid": "user-1" }));
        assert!(account_from_id_token(&missing_tid).is_err());
    }
}
