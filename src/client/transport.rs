//! Network seam of the client.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use super::error::ClientError;
use crate::APP_USER_AGENT;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A JSON API call relative to the service base URL.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    #[must_use]
    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::PATCH,
            path: path.into(),
            body: Some(body),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ApiResponse {
    /// The `error` code of an error body, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.body.as_ref()?.get("error")?.as_str()
    }

    /// Decode a successful body, or turn a failure into `ClientError::Http`.
    ///
    /// # Errors
    /// Returns `ClientError::Http` for non-success statuses and `ClientError::Decode`
    /// when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let response = self.error_for_status()?;
        let body = response.body.unwrap_or(Value::Null);
        Ok(serde_json::from_value(body)?)
    }

    /// # Errors
    /// Returns `ClientError::Http` for non-success statuses.
    pub fn error_for_status(self) -> Result<Self, ClientError> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(ClientError::Http {
            status: self.status.as_u16(),
            code: self.error_code().unwrap_or("unknown").to_string(),
        })
    }
}

#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Send `request`, attaching `access_token` as a bearer token when given.
    async fn execute(
        &self,
        request: ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, ClientError>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: Url,
    client: Client,
}

impl HttpTransport {
    /// # Errors
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ClientError::Request(format!("{base_url}: {e}")))?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { base_url, client })
    }

    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl AuthTransport for HttpTransport {
    #[instrument(skip(self, request, access_token), fields(method = %request.method, path = %request.path))]
    async fn execute(
        &self,
        request: ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, ClientError> {
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|e| ClientError::Request(format!("{}: {e}", request.path)))?;

        let mut builder = self.client.request(request.method, url);
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        // Error pages from proxies are not JSON; keep the status and drop the body.
        let body = if text.trim().is_empty() {
            None
        } else {
            serde_json::from_str(&text).ok()
        };
        Ok(ApiResponse { status, body })
    }
}
