use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use url::Url;

use crate::{error::RemoteError, remote, types::AccessToken};

use super::AppIdentity;

const SERVICE: &str = "graph";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com";

/// Application registration operations on Microsoft Graph.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn create_application(
        &self,
        token: &AccessToken,
        display_name: &str,
    ) -> Result<AppIdentity, RemoteError>;

    /// Adds a client secret expiring at `expires_at`; returns the secret text.
    async fn add_password(
        &self,
        token: &AccessToken,
        object_id: &str,
        expires_at: OffsetDateTime,
    ) -> Result<String, RemoteError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphApplication {
    id: String,
    app_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredential {
    #[serde(default)]
    secret_text: Option<String>,
}

pub struct LiveGraphClient {
    http: Client,
    base_url: Url,
}

impl LiveGraphClient {
    pub fn new(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }
}

pub(crate) fn application_payload(display_name: &str) -> serde_json::Value {
    json!({
        "displayName": display_name,
        "signInAudience": "AzureADMultipleOrgs",
    })
}

#[async_trait]
impl GraphApi for LiveGraphClient {
    async fn create_application(
        &self,
        token: &AccessToken,
        display_name: &str,
    ) -> Result<AppIdentity, RemoteError> {
        let builder = self
            .http
            .post(self.url("/v1.0/applications"))
            .json(&application_payload(display_name));
        let app: GraphApplication = remote::send_json(SERVICE, token, builder).await?;
        Ok(AppIdentity {
            client_id: app.app_id,
            object_id: app.id,
        })
    }

    async fn add_password(
        &self,
        token: &AccessToken,
        object_id: &str,
        expires_at: OffsetDateTime,
    ) -> Result<String, RemoteError> {
        let end = expires_at
            .format(&Rfc3339)
            .map_err(|err| RemoteError::InvalidResponse {
                service: SERVICE,
                message: format!("cannot format secret expiry: {err}"),
            })?;
        let body = json!({
            "passwordCredential": {
                "displayName": "bot secret",
                "endDateTime": end,
            }
        });
        let builder = self
            .http
            .post(self.url(&format!("/v1.0/applications/{object_id}/addPassword")))
            .json(&body);
        let credential: PasswordCredential = remote::send_json(SERVICE, token, builder).await?;
        credential
            .secret_text
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| RemoteError::InvalidResponse {
                service: SERVICE,
                message: "addPassword response missing secretText".into(),
            })
    }
}
