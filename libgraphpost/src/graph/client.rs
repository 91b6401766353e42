//! HTTP transport for the Graph API
//!
//! Builds versioned endpoints, injects the access token, encodes parameters
//! (query string for GET, form body otherwise) and classifies responses into
//! JSON objects, structured API errors or transport failures.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

pub use reqwest::Method;

use crate::error::{ApiError, Result, TransportError};

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/";
pub const DEFAULT_GRAPH_VERSION: &str = "v19.0";

/// Decoded JSON object returned by every Graph API call
pub type JsonObject = serde_json::Map<String, Value>;

/// Request parameters, encoded as query string or form body
pub type Params = BTreeMap<String, String>;

/// Connection settings for one Graph API client
#[derive(Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_version: String,
    pub access_token: Option<String>,
    pub actor_id: String,
}

impl ClientConfig {
    /// Create a configuration against the public Graph API endpoint
    pub fn new(
        api_version: impl Into<String>,
        access_token: Option<String>,
        actor_id: impl Into<String>,
    ) -> Self {
        let api_version = api_version.into();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: if api_version.is_empty() {
                DEFAULT_GRAPH_VERSION.to_string()
            } else {
                api_version
            },
            access_token,
            actor_id: actor_id.into(),
        }
    }

    /// Point the client at another base URL (a local fake server in tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("actor_id", &self.actor_id)
            .finish()
    }
}

/// Request/response seam between the Graph API and everything built on it
///
/// `GraphClient` is the HTTP implementation; `crate::mock::MockTransport`
/// replays scripted responses in tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request against `resource_path` and return the decoded body
    ///
    /// # Errors
    ///
    /// - `GraphpostError::Api` when the API reports a structured error
    /// - `GraphpostError::Transport` for construction, network, status or decoding failures
    async fn request(&self, method: Method, resource_path: &str, params: Params)
        -> Result<JsonObject>;
}

/// Graph API client over `reqwest`
pub struct GraphClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl GraphClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `{base_url}/{api_version}/{path}` with surrounding slashes trimmed
    pub fn endpoint(&self, resource_path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.api_version,
            resource_path.trim_start_matches('/')
        )
    }

    pub async fn get(&self, resource_path: &str, params: Params) -> Result<JsonObject> {
        self.request(Method::GET, resource_path, params).await
    }

    pub async fn post(&self, resource_path: &str, params: Params) -> Result<JsonObject> {
        self.request(Method::POST, resource_path, params).await
    }

    /// GET an absolute URL as-is, used to follow `paging.next` links
    ///
    /// Those links already carry the access token and every query parameter.
    pub async fn get_url(&self, url: &str) -> Result<JsonObject> {
        let url = Url::parse(url).map_err(|e| TransportError::CreateRequest(e.to_string()))?;
        debug!(path = url.path(), "following pagination link");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        read_response(response).await
    }

    fn with_token(&self, mut params: Params) -> Params {
        if let Some(token) = self.config.access_token.as_deref() {
            if !token.is_empty() {
                params
                    .entry("access_token".to_string())
                    .or_insert_with(|| token.to_string());
            }
        }
        params
    }
}

#[async_trait]
impl Transport for GraphClient {
    async fn request(
        &self,
        method: Method,
        resource_path: &str,
        params: Params,
    ) -> Result<JsonObject> {
        let params = self.with_token(params);
        let url = Url::parse(&self.endpoint(resource_path))
            .map_err(|e| TransportError::CreateRequest(e.to_string()))?;

        debug!(method = %method, path = resource_path, "graph request");

        let builder = if method == Method::GET {
            self.http.request(method, url).query(&params)
        } else {
            self.http.request(method, url).form(&params)
        };

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;
        read_response(response).await
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

/// Parse a `{"error": {...}}` envelope out of a raw body
pub fn parse_error_envelope(payload: &[u8]) -> Option<ApiError> {
    serde_json::from_slice::<ErrorEnvelope>(payload)
        .ok()
        .and_then(|envelope| envelope.error)
}

/// The `error` member of an already decoded body, if it is an error object
pub fn error_from_object(payload: &JsonObject) -> Option<ApiError> {
    payload
        .get("error")
        .and_then(|value| serde_json::from_value::<ApiError>(value.clone()).ok())
}

async fn read_response(response: reqwest::Response) -> Result<JsonObject> {
    let status = response.status();
    let payload = response
        .bytes()
        .await
        .map_err(|e| TransportError::ReadBody(e.to_string()))?;

    if !status.is_success() {
        if let Some(api_error) = parse_error_envelope(&payload) {
            debug!(status = status.as_u16(), code = api_error.code, "graph api error");
            return Err(api_error.into());
        }
        return Err(TransportError::Status(status.as_u16()).into());
    }

    let parsed: JsonObject =
        serde_json::from_slice(&payload).map_err(|e| TransportError::Parse(e.to_string()))?;

    // Some failures come back as HTTP 200 with an error object
    if let Some(api_error) = error_from_object(&parsed) {
        debug!(code = api_error.code, "graph api error in 2xx body");
        return Err(api_error.into());
    }

    Ok(parsed)
}
