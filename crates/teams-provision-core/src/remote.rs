use std::time::Duration;

use reqwest::{Client, RequestBuilder, header};
use serde::de::DeserializeOwned;

use crate::{error::RemoteError, types::AccessToken};

/// Builds the shared HTTP client. Every remote call inherits `timeout`.
pub fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

pub(crate) async fn send_json<T: DeserializeOwned>(
    service: &'static str,
    token: &AccessToken,
    builder: RequestBuilder,
) -> Result<T, RemoteError> {
    let body = send(service, token, builder).await?;
    serde_json::from_str(&body).map_err(|err| RemoteError::InvalidResponse {
        service,
        message: err.to_string(),
    })
}

pub(crate) async fn send_no_content(
    service: &'static str,
    token: &AccessToken,
    builder: RequestBuilder,
) -> Result<(), RemoteError> {
    send(service, token, builder).await.map(|_| ())
}

async fn send(
    service: &'static str,
    token: &AccessToken,
    builder: RequestBuilder,
) -> Result<String, RemoteError> {
    let response = builder
        .bearer_auth(token.as_str())
        .header(header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|source| RemoteError::Transport { service, source })?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| RemoteError::Transport { service, source })?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(RemoteError::Http {
            service,
            status: status.as_u16(),
            body,
        })
    }
}
