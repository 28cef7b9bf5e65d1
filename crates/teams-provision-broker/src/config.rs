use std::{env, time::Duration};

use teams_provision_core::{
    RequiredScope,
    identity::DEFAULT_INITIAL_SCOPES,
    provision::{
        DEV_PORTAL_PROVISION_SCOPE, GRAPH_PROVISION_SCOPE, dev_portal::DEFAULT_DEV_PORTAL_BASE_URL,
        graph::DEFAULT_GRAPH_BASE_URL,
    },
};
use url::Url;

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const DEFAULT_AUTH_TENANT: &str = "common";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 3600;
const DEFAULT_AUTH_STATE_TTL_SECS: u64 = 600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SECRET_VALIDITY_DAYS: i64 = 730;
const MAX_SECRET_VALIDITY_DAYS: i64 = 3650;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

/// Runtime configuration of the broker, read from the environment.
#[derive(Clone)]
pub struct BrokerConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub admin_consent_redirect_uri: String,
    pub authority: Url,
    pub auth_tenant: String,
    pub initial_scopes: Vec<String>,
    pub required_scopes: Vec<RequiredScope>,
    pub graph_base_url: Url,
    pub dev_portal_base_url: Url,
    pub host: String,
    pub port: u16,
    pub session_idle_ttl: Duration,
    pub auth_state_ttl: Duration,
    pub http_timeout: Duration,
    pub secret_validity: time::Duration,
    pub cookie_secure: bool,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("authority", &self.authority.as_str())
            .field("auth_tenant", &self.auth_tenant)
            .field("required_scopes", &self.required_scopes)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require =
            |key: &'static str| get(key).ok_or(ConfigError::MissingEnv(key));

        let client_id = require("MS_CLIENT_ID")?;
        let client_secret = require("MS_CLIENT_SECRET")?;
        let redirect_uri = require("MS_REDIRECT_URI")?;
        parse_url("MS_REDIRECT_URI", &redirect_uri)?;
        let admin_consent_redirect_uri = require("MS_ADMIN_CONSENT_REDIRECT_URI")?;
        parse_url("MS_ADMIN_CONSENT_REDIRECT_URI", &admin_consent_redirect_uri)?;

        let authority = parse_url(
            "MS_AUTHORITY",
            &get("MS_AUTHORITY").unwrap_or_else(|| DEFAULT_AUTHORITY.into()),
        )?;
        let auth_tenant = get("MS_AUTH_TENANT").unwrap_or_else(|| DEFAULT_AUTH_TENANT.into());

        let required_scopes = match get("REQUIRED_SCOPES") {
            Some(raw) => parse_scopes(&raw)?,
            None => parse_scopes(&format!(
                "{GRAPH_PROVISION_SCOPE},{DEV_PORTAL_PROVISION_SCOPE}"
            ))?,
        };

        let graph_base_url = parse_url(
            "GRAPH_BASE_URL",
            &get("GRAPH_BASE_URL").unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.into()),
        )?;
        let dev_portal_base_url = parse_url(
            "DEV_PORTAL_BASE_URL",
            &get("DEV_PORTAL_BASE_URL").unwrap_or_else(|| DEFAULT_DEV_PORTAL_BASE_URL.into()),
        )?;

        let host = get("BROKER_HOST").unwrap_or_else(|| DEFAULT_HOST.into());
        let port = parse_number("BROKER_PORT", get("BROKER_PORT"), DEFAULT_PORT)?;
        let session_idle_ttl = Duration::from_secs(parse_number(
            "SESSION_IDLE_TTL_SECS",
            get("SESSION_IDLE_TTL_SECS"),
            DEFAULT_SESSION_IDLE_TTL_SECS,
        )?);
        let auth_state_ttl = Duration::from_secs(parse_number(
            "AUTH_STATE_TTL_SECS",
            get("AUTH_STATE_TTL_SECS"),
            DEFAULT_AUTH_STATE_TTL_SECS,
        )?);
        let http_timeout = Duration::from_secs(
            parse_number(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?
            .max(1),
        );
        let validity_days: i64 = parse_number(
            "SECRET_VALIDITY_DAYS",
            get("SECRET_VALIDITY_DAYS"),
            DEFAULT_SECRET_VALIDITY_DAYS,
        )?;
        if !(1..=MAX_SECRET_VALIDITY_DAYS).contains(&validity_days) {
            return Err(ConfigError::InvalidValue {
                key: "SECRET_VALIDITY_DAYS",
                reason: format!("must be between 1 and {MAX_SECRET_VALIDITY_DAYS}"),
            });
        }
        let cookie_secure = match get("COOKIE_SECURE") {
            Some(raw) => parse_bool("COOKIE_SECURE", &raw)?,
            None => redirect_uri.starts_with("https://"),
        };

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            admin_consent_redirect_uri,
            authority,
            auth_tenant,
            initial_scopes: DEFAULT_INITIAL_SCOPES.iter().map(|s| s.to_string()).collect(),
            required_scopes,
            graph_base_url,
            dev_portal_base_url,
            host,
            port,
            session_idle_ttl,
            auth_state_ttl,
            http_timeout,
            secret_validity: time::Duration::days(validity_days),
            cookie_secure,
        })
    }
}

fn parse_url(key: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|err| ConfigError::InvalidValue {
        key,
        reason: err.to_string(),
    })
}

fn parse_number<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|err: T::Err| ConfigError::InvalidValue {
            key,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key,
            reason: format!("`{other}` is not a boolean"),
        }),
    }
}

fn parse_scopes(raw: &str) -> Result<Vec<RequiredScope>, ConfigError> {
    let scopes = raw
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            RequiredScope::parse(s).ok_or_else(|| ConfigError::InvalidValue {
                key: "REQUIRED_SCOPES",
                reason: format!("`{s}` is not qualified by a resource URI"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if scopes.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "REQUIRED_SCOPES",
            reason: "no scopes listed".into(),
        });
    }
    Ok(scopes)
}
