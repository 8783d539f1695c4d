/*
[INPUT]:  HTTP configuration (base URL, timeouts)
[OUTPUT]: Configured reqwest client ready for backend and vendor calls
[POS]:    HTTP layer - core client implementation
[UPDATE]: When adding connection options or changing client behavior
*/

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::http::{KycError, Result};
use crate::types::{Envelope, ErrorResponse};

const ERROR_BODY_LOG_MAX_BYTES: usize = 512;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Non-success reply, decoded as far as the body allows
#[derive(Debug)]
pub(crate) struct ApiFailure {
    pub status: reqwest::StatusCode,
    pub body: Option<ErrorResponse>,
    pub raw: Option<serde_json::Value>,
}

impl ApiFailure {
    pub(crate) fn message(&self) -> String {
        self.body
            .as_ref()
            .and_then(|body| body.summary())
            .map(str::to_string)
            .unwrap_or_default()
    }

    /// `details` when present, otherwise the whole body
    pub(crate) fn details(&self) -> Option<serde_json::Value> {
        self.body
            .as_ref()
            .and_then(|body| body.details.clone())
            .or_else(|| self.raw.clone())
    }
}

/// HTTP client rooted at one base URL
#[derive(Debug, Clone)]
pub struct KycClient {
    http_client: Client,
    base_url: Url,
}

impl KycClient {
    /// Create a new client with default configuration
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(ClientConfig::default(), base_url)
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ClientConfig, base_url: &str) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Self::with_http_client(http_client, base_url)
    }

    /// Share an existing connection pool under a different base URL
    pub fn with_http_client(http_client: Client, base_url: &str) -> Result<Self> {
        Ok(Self {
            http_client,
            base_url: normalize_base_url(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build full URL for an endpoint relative to the base path
    fn url(&self, endpoint: &str) -> Result<Url> {
        Ok(self.base_url.join(endpoint.trim_start_matches('/'))?)
    }

    pub(crate) fn request(&self, method: Method, endpoint: &str) -> Result<RequestBuilder> {
        let url = self.url(endpoint)?;
        Ok(self.http_client.request(method, url))
    }

    /// Send a request; non-2xx replies come back as [`ApiFailure`]
    pub(crate) async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<std::result::Result<T, ApiFailure>> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            let body: Envelope<T> = response.json().await?;
            return Ok(Ok(body.into_inner()));
        }
        Ok(Err(decode_failure(status, response).await))
    }
}

async fn decode_failure(status: reqwest::StatusCode, response: Response) -> ApiFailure {
    let bytes = response.bytes().await.unwrap_or_default();
    let raw: Option<serde_json::Value> = serde_json::from_slice(&bytes).ok();
    let body = raw
        .as_ref()
        .and_then(|value| serde_json::from_value::<ErrorResponse>(value.clone()).ok());

    let preview = String::from_utf8_lossy(&bytes);
    let preview = if preview.len() > ERROR_BODY_LOG_MAX_BYTES {
        let mut cut = ERROR_BODY_LOG_MAX_BYTES;
        while !preview.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &preview[..cut])
    } else {
        preview.into_owned()
    };
    debug!(status = status.as_u16(), body = %preview, "http request rejected");

    ApiFailure { status, body, raw }
}

fn normalize_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    if url.cannot_be_a_base() {
        return Err(KycError::Config(format!("base url cannot be a base: {base_url}")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
