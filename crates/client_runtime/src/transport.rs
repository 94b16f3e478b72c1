//! Transport seam for commands and page fetches, plus the HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use shared::{
    domain::ModuleRef,
    error::{ApiError, ErrorCode},
    protocol::{CommandPayload, CommandResponse, PageResponse},
};
use tracing::debug;
use url::Url;

use crate::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_command(&self, payload: CommandPayload) -> Result<CommandResponse, TransportError>;
    async fn fetch_page(&self, to: &ModuleRef) -> Result<PageResponse, TransportError>;

    /// Queue processing is skipped while this is false.
    fn is_connected(&self) -> bool {
        true
    }
}

/// Transport used before a server connection exists.
pub struct DisconnectedTransport;

#[async_trait]
impl Transport for DisconnectedTransport {
    async fn send_command(&self, _payload: CommandPayload) -> Result<CommandResponse, TransportError> {
        Err(TransportError::Disconnected)
    }

    async fn fetch_page(&self, _to: &ModuleRef) -> Result<PageResponse, TransportError> {
        Err(TransportError::Disconnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// Talks to `{base}/hologram/command` and `{base}/hologram/page/{module}`.
pub struct HttpTransport {
    http: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let mut base_url =
            Url::parse(server_url).map_err(|err| TransportError::Http(err.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Http(err.to_string()))?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|err| TransportError::Http(err.to_string()))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        res: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = res.status();
        if !status.is_success() {
            return Err(rejection(status, res.json::<ApiError>().await.ok()));
        }
        res.json::<T>()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Disconnected
    } else {
        TransportError::Http(err.to_string())
    }
}

fn rejection(status: StatusCode, body: Option<ApiError>) -> TransportError {
    let api_error = body.unwrap_or_else(|| {
        let code = match status {
            StatusCode::NOT_FOUND => ErrorCode::NotFound,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::Validation,
            StatusCode::SERVICE_UNAVAILABLE => ErrorCode::Unavailable,
            _ => ErrorCode::Internal,
        };
        ApiError::new(code, format!("server responded with {status}"))
    });
    TransportError::Rejected(api_error)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send_command(&self, payload: CommandPayload) -> Result<CommandResponse, TransportError> {
        let url = self.endpoint("hologram/command")?;
        debug!(command_id = %payload.id, name = %payload.name, "sending command");
        let res = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Self::read_json(res).await
    }

    async fn fetch_page(&self, to: &ModuleRef) -> Result<PageResponse, TransportError> {
        let mut url = self.endpoint("hologram/page/")?;
        url.path_segments_mut()
            .map_err(|_| TransportError::Http("server url cannot be a base".into()))?
            .pop_if_empty()
            .push(to.as_str());
        debug!(module = %to, "fetching page");
        let res = self.http.get(url).send().await.map_err(map_reqwest_error)?;
        Self::read_json(res).await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
