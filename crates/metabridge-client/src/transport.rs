//! HTTP transport abstraction.
//!
//! The core never talks to `reqwest` directly: the credential provider and the
//! dispatcher both go through [`Transport`], which keeps the retry decision
//! testable with an in-memory double.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::ClientError;

/// Upper bound on every outbound call, login included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A request relative to the transport's base URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, e.g. `/api/dataset`.
    pub path: String,
    /// Headers sent with the request, credentials included once decorated.
    pub headers: HeaderMap,
    /// Optional JSON body.
    pub body: Option<Value>,
}

impl HttpRequest {
    /// Creates a request with no headers and no body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Shorthand for a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Shorthand for a `POST` request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Sets the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `body` cannot be represented as JSON.
    pub fn json<B: serde::Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ClientError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Sets a header whose value is a credential.
    ///
    /// The value is flagged sensitive so it is redacted from `Debug` output.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` contains bytes not allowed in a header.
    pub fn set_sensitive_header(
        &mut self,
        name: HeaderName,
        value: &str,
    ) -> Result<(), ClientError> {
        let mut value = HeaderValue::from_str(value).map_err(|_| {
            ClientError::ConfigurationError(format!(
                "credential for header '{name}' contains invalid characters"
            ))
        })?;
        value.set_sensitive(true);
        self.headers.insert(name, value);
        Ok(())
    }
}

/// Status and raw body of a response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response from a status and body.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Sends a single HTTP exchange. No retries, no authentication.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns whatever status the server answered with.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::RequestFailedError`] on connection failure,
    /// timeout, or an unreadable body. Non-2xx statuses are not errors here.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError>;
}

/// Sends `request`, abandoning the in-flight exchange if `cancel` fires first.
pub(crate) async fn send_cancellable(
    transport: &dyn Transport,
    request: HttpRequest,
    cancel: &CancellationToken,
) -> Result<HttpResponse, ClientError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ClientError::Cancelled),
        result = transport.send(request) => result,
    }
}

/// Parses and normalises a base URL, trimming any trailing `/`.
///
/// # Errors
///
/// Returns [`ClientError::ConfigurationError`] if the URL is empty or invalid.
pub fn parse_base_url(base_url: &str) -> Result<Url, ClientError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ClientError::ConfigurationError(
            "metabase URL is required".to_string(),
        ));
    }
    Url::parse(trimmed)
        .map_err(|e| ClientError::ConfigurationError(format!("Invalid URL '{trimmed}': {e}")))
}

/// [`Transport`] over a pooled `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Creates a transport with the default 30 second timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client fails to build.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a transport with a custom total request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client fails to build.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = parse_base_url(base_url)?
            .as_str()
            .trim_end_matches('/')
            .to_string();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// The normalized base URL, without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let url = self.url_for(&request.path);
        let method = request.method.clone();

        debug!(method = %method, url = %url, "metabase API request");
        let started = Instant::now();

        let mut builder = self
            .client
            .request(request.method, &url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(&body)?);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "metabase API response"
        );

        Ok(HttpResponse { status, body })
    }
}
