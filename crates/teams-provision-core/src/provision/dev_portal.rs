use async_trait::async_trait;
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{error::RemoteError, remote, types::AccessToken};

const SERVICE: &str = "developer portal";
pub const DEFAULT_DEV_PORTAL_BASE_URL: &str = "https://dev.teams.microsoft.com";

/// Bot Framework registration as the Developer Portal expects it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotRegistration {
    pub bot_id: String,
    pub name: String,
    pub description: String,
    pub messaging_endpoint: String,
    pub calling_endpoint: String,
    pub configured_channels: Vec<String>,
    pub is_single_tenant: bool,
}

impl BotRegistration {
    pub fn teams(bot_id: &str, name: &str, messaging_endpoint: &str, single_tenant: bool) -> Self {
        Self {
            bot_id: bot_id.to_string(),
            name: name.to_string(),
            description: name.to_string(),
            messaging_endpoint: messaging_endpoint.to_string(),
            calling_endpoint: String::new(),
            configured_channels: vec!["msteams".to_string()],
            is_single_tenant: single_tenant,
        }
    }
}

#[async_trait]
pub trait DevPortalApi: Send + Sync {
    /// Imports a zipped app package; returns the Teams app id.
    async fn import_package(
        &self,
        token: &AccessToken,
        package: Vec<u8>,
    ) -> Result<String, RemoteError>;

    async fn register_bot(
        &self,
        token: &AccessToken,
        registration: &BotRegistration,
    ) -> Result<(), RemoteError>;

    async fn update_bot(
        &self,
        token: &AccessToken,
        registration: &BotRegistration,
    ) -> Result<(), RemoteError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedApp {
    #[serde(default)]
    teams_app_id: Option<String>,
    #[serde(default)]
    app_id: Option<String>,
}

pub struct LiveDevPortalClient {
    http: Client,
    base_url: Url,
}

impl LiveDevPortalClient {
    pub fn new(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[async_trait]
impl DevPortalApi for LiveDevPortalClient {
    async fn import_package(
        &self,
        token: &AccessToken,
        package: Vec<u8>,
    ) -> Result<String, RemoteError> {
        let builder = self
            .http
            .post(self.url("/api/appdefinitions/v2/import"))
            .header(header::CONTENT_TYPE, "application/zip")
            .body(package);
        let imported: ImportedApp = remote::send_json(SERVICE, token, builder).await?;
        imported
            .teams_app_id
            .or(imported.app_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RemoteError::InvalidResponse {
                service: SERVICE,
                message: "import response missing teamsAppId".into(),
            })
    }

    async fn register_bot(
        &self,
        token: &AccessToken,
        registration: &BotRegistration,
    ) -> Result<(), RemoteError> {
        let builder = self
            .http
            .post(self.url("/api/botframework"))
            .json(registration);
        remote::send_no_content(SERVICE, token, builder).await
    }

    async fn update_bot(
        &self,
        token: &AccessToken,
        registration: &BotRegistration,
    ) -> Result<(), RemoteError> {
        let builder = self
            .http
            .post(self.url(&format!("/api/botframework/{}", registration.bot_id)))
            .json(registration);
        remote::send_no_content(SERVICE, token, builder).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_uses_portal_field_names() {
        let registration = BotRegistration::teams(
            "client-1",
            "Helpdesk",
            "https://bot.example.com/api/messages",
            false,
        );
        let value = serde_json::to_value(&registration).unwrap();
        assert_eq!(value["botId"], "client-1");
        assert_eq!(value["messagingEndpoint"], "https://bot.example.com/api/messages");
        assert_eq!(value["configuredChannels"], serde_json::json!(["msteams"]));
        assert_eq!(value["isSingleTenant"], false);
    }
}
