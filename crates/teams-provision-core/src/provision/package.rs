use std::io::{Cursor, Write};

use serde_json::{Value, json};
use url::Url;
use uuid::Uuid;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

const MANIFEST_SCHEMA: &str =
    "https://developer.microsoft.com/en-us/json-schemas/teams/v1.16/MicrosoftTeams.schema.json";
const MANIFEST_VERSION: &str = "1.16";
const COLOR_ICON: &[u8] = include_bytes!("../../assets/color.png");
const OUTLINE_ICON: &[u8] = include_bytes!("../../assets/outline.png");

/// What the packager needs to describe one bot app.
#[derive(Clone, Debug)]
pub struct PackageInput<'a> {
    pub app_name: &'a str,
    pub client_id: &'a str,
    pub messaging_endpoint: &'a str,
}

/// Builds the zipped Teams app package (manifest plus icons).
pub trait AppPackager: Send + Sync {
    fn build(&self, input: &PackageInput<'_>) -> Result<Vec<u8>, String>;
}

#[derive(Clone, Debug)]
pub struct ZipPackager {
    developer_name: String,
    website_url: String,
}

impl Default for ZipPackager {
    fn default() -> Self {
        Self {
            developer_name: "Bot Provisioner".into(),
            website_url: "https://www.microsoft.com".into(),
        }
    }
}

impl ZipPackager {
    pub fn new(developer_name: impl Into<String>, website_url: impl Into<String>) -> Self {
        Self {
            developer_name: developer_name.into(),
            website_url: website_url.into(),
        }
    }

    pub fn manifest(&self, input: &PackageInput<'_>) -> Result<Value, String> {
        let host = Url::parse(input.messaging_endpoint)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .ok_or_else(|| format!("endpoint `{}` has no host", input.messaging_endpoint))?;
        let short_name: String = input.app_name.chars().take(30).collect();
        Ok(json!({
            "$schema": MANIFEST_SCHEMA,
            "manifestVersion": MANIFEST_VERSION,
            "version": "1.0.0",
            "id": Uuid::new_v4().to_string(),
            "packageName": format!("com.bot.{}", input.client_id),
            "developer": {
                "name": self.developer_name,
                "websiteUrl": self.website_url,
                "privacyUrl": self.website_url,
                "termsOfUseUrl": self.website_url,
            },
            "name": { "short": short_name, "full": input.app_name },
            "description": { "short": short_name, "full": input.app_name },
            "icons": { "color": "color.png", "outline": "outline.png" },
            "accentColor": "#FFFFFF",
            "bots": [{
                "botId": input.client_id,
                "scopes": ["personal", "team", "groupchat"],
                "supportsFiles": false,
                "isNotificationOnly": false,
            }],
            "permissions": ["identity", "messageTeamMembers"],
            "validDomains": [host],
            "webApplicationInfo": {
                "id": input.client_id,
                "resource": format!("api://{host}/{}", input.client_id),
            },
        }))
    }
}

impl AppPackager for ZipPackager {
    fn build(&self, input: &PackageInput<'_>) -> Result<Vec<u8>, String> {
        let manifest = serde_json::to_vec_pretty(&self.manifest(input)?)
            .map_err(|err| format!("manifest serialization: {err}"))?;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, bytes) in [
            ("manifest.json", manifest.as_slice()),
            ("color.png", COLOR_ICON),
            ("outline.png", OUTLINE_ICON),
        ] {
            writer
                .start_file(name, options)
                .map_err(|err| format!("zip entry {name}: {err}"))?;
            writer
                .write_all(bytes)
                .map_err(|err| format!("zip entry {name}: {err}"))?;
        }
        let cursor = writer
            .finish()
            .map_err(|err| format!("zip finish: {err}"))?;
        Ok(cursor.into_inner())
    }
}
