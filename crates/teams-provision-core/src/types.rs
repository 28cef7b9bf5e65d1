use std::fmt;

use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const SESSION_ID_LEN: usize = 43;

/// Authenticated end-user as reported by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `<object id>.<tenant id>`, stable across sign-ins.
    pub home_account_id: String,
    pub tenant_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Authenticated browser session bound to one account.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: String,
    pub account: Account,
    pub created_at: OffsetDateTime,
    pub last_seen: OffsetDateTime,
}

impl Session {
    pub fn new(account: Account) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Self::generate_id(),
            account,
            created_at: now,
            last_seen: now,
        }
    }

    fn generate_id() -> String {
        Alphanumeric.sample_string(&mut rand::rng(), SESSION_ID_LEN)
    }
}

/// A permission qualified by the resource server that issues tokens for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequiredScope {
    pub resource: String,
    pub permission: String,
}

impl RequiredScope {
    pub fn new(resource: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            resource: resource.into().trim_end_matches('/').to_string(),
            permission: permission.into(),
        }
    }

    /// Splits `https://graph.microsoft.com/Application.ReadWrite.All` into
    /// resource and permission. Returns `None` for unqualified scopes.
    pub fn parse(qualified: &str) -> Option<Self> {
        let qualified = qualified.trim();
        let (resource, permission) = qualified.rsplit_once('/')?;
        if permission.is_empty() || !resource.contains("://") {
            return None;
        }
        let host = resource.split_once("://").map(|(_, host)| host)?;
        if host.is_empty() {
            return None;
        }
        Some(Self::new(resource, permission))
    }

    pub fn qualified(&self) -> String {
        format!("{}/{}", self.resource, self.permission)
    }
}

impl fmt::Display for RequiredScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.permission)
    }
}

/// Outcome of one consent check. Never cached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeCheckResult {
    pub has_consent: bool,
    pub granted: Vec<String>,
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_url: Option<String>,
}

impl ScopeCheckResult {
    pub fn new(granted: Vec<String>, missing: Vec<String>, consent_url: Option<String>) -> Self {
        Self {
            has_consent: missing.is_empty(),
            granted,
            missing,
            consent_url,
        }
    }
}

/// Bearer token for a single resource server.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Everything a bot deployment needs, returned exactly once to the caller.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub teams_app_id: String,
    pub messaging_endpoint: String,
    pub tenant_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("teams_app_id", &self.teams_app_id)
            .field("messaging_endpoint", &self.messaging_endpoint)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            home_account_id: "oid.tid".into(),
            tenant_id: "tid".into(),
            username: "ada@contoso.com".into(),
            name: Some("Ada".into()),
        }
    }

    #[test]
    fn parses_qualified_scope() {
        let scope = RequiredScope::parse("https://graph.microsoft.com/Application.ReadWrite.All")
            .expect("scope");
        assert_eq!(scope.resource, "https://graph.microsoft.com");
        assert_eq!(scope.permission, "Application.ReadWrite.All");
        assert_eq!(
            scope.qualified(),
            "https://graph.microsoft.com/Application.ReadWrite.All"
        );
    }

    #[test]
    fn rejects_unqualified_scope() {
        assert!(RequiredScope::parse("User.Read").is_none());
        assert!(RequiredScope::parse("https://graph.microsoft.com/").is_none());
        assert!(RequiredScope::parse("https:///User.Read").is_none());
    }

    #[test]
    fn session_ids_are_unique() {
        let first = Session::new(account());
        let second = Session::new(account());
        assert_ne!(first.id, second.id);
        assert_eq!(first.id.len(), SESSION_ID_LEN);
    }

    #[test]
    fn has_consent_follows_missing_list() {
        let ok = ScopeCheckResult::new(vec!["a".into()], Vec::new(), None);
        assert!(ok.has_consent);
        let missing = ScopeCheckResult::new(Vec::new(), vec!["a".into()], Some("u".into()));
        assert!(!missing.has_consent);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = Credentials {
            client_id: "client".into(),
            client_secret: "s3cr3t".into(),
            teams_app_id: "app".into(),
            messaging_endpoint: "https://bot.example.com/api/messages".into(),
            tenant_id: "tid".into(),
        };
        assert!(!format!("{creds:?}").contains("s3cr3t"));
        assert!(!format!("{:?}", AccessToken::new("eyJ0")).contains("eyJ0"));
    }
}
