//! Upload local media to a public host
//!
//! The Graph API only accepts media by public HTTPS URL, so local files are
//! first pushed to a temporary file host.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};
use url::Url;

use crate::error::{Result, UploadError};

pub const DEFAULT_UPLOAD_URL: &str = "https://uguu.se/upload.php";

/// Turns a local file into a public HTTPS URL
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload `path` and return its public URL
    ///
    /// Implementations only return `https` URLs; callers trust the result.
    async fn upload(&self, path: &Path) -> Result<String>;
}

/// Multipart uploader for uguu.se-compatible hosts
pub struct UguuUploader {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct UguuResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    files: Vec<UguuFile>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UguuFile {
    #[serde(default)]
    url: String,
}

impl UguuUploader {
    pub fn new() -> Self {
        Self::with_endpoint(DEFAULT_UPLOAD_URL)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Default for UguuUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Uploader for UguuUploader {
    async fn upload(&self, path: &Path) -> Result<String> {
        let contents = tokio::fs::read(path).await.map_err(UploadError::OpenFile)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        debug!(file = %path.display(), bytes = contents.len(), "uploading media");

        let part = reqwest::multipart::Part::bytes(contents).file_name(file_name);
        let form = reqwest::multipart::Form::new().part("files[]", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Request {
                network: e.is_connect() || e.is_timeout(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|e| UploadError::ReadBody(e.to_string()))?;

        if !status.is_success() {
            return Err(UploadError::Status(status.as_u16()).into());
        }

        let parsed: UguuResponse =
            serde_json::from_slice(&payload).map_err(|e| UploadError::Parse(e.to_string()))?;

        if !parsed.success {
            return Err(match parsed.error.filter(|e| !e.is_empty()) {
                Some(message) => UploadError::Rejected(message),
                None => UploadError::Failed,
            }
            .into());
        }

        let public_url = parsed
            .files
            .into_iter()
            .next()
            .map(|file| file.url)
            .filter(|url| !url.is_empty())
            .ok_or(UploadError::MissingUrl)?;

        let parsed_url =
            Url::parse(&public_url).map_err(|e| UploadError::InvalidUrl(e.to_string()))?;
        if parsed_url.scheme() != "https" {
            return Err(UploadError::InvalidScheme(parsed_url.scheme().to_string()).into());
        }

        info!(file = %path.display(), url = %public_url, "uploaded media");
        Ok(public_url)
    }
}
