//! Error types for Graphpost

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphpostError>;

/// Graph API error code for invalid or expired access tokens
pub const OAUTH_INVALID_TOKEN_CODE: i64 = 190;

#[derive(Error, Debug)]
pub enum GraphpostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    MissingField(#[from] MissingFieldError),

    #[error("poll timed out after {}", format_duration(.timeout))]
    PollTimeout { timeout: Duration },

    #[error("media processing failed")]
    MediaProcessing,

    #[error("poll canceled")]
    Cancelled,

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// `5m`, `1m 30s`: durations as they are written in the environment
fn format_duration(duration: &Duration) -> String {
    humantime::format_duration(*duration).to_string()
}

impl GraphpostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            GraphpostError::Validation(_) => 3,
            GraphpostError::Api(api) if api.is_auth_error() => 2,
            _ => 1,
        }
    }

    /// True for connection-level failures where a connectivity hint helps
    pub fn is_network(&self) -> bool {
        match self {
            GraphpostError::Transport(e) => e.is_network(),
            GraphpostError::Upload(e) => e.is_network(),
            _ => false,
        }
    }

    /// Single-line message for the error stream of the CLI tools
    pub fn user_message(&self) -> String {
        match self {
            GraphpostError::Config(ConfigError::MissingEnv(missing)) => format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            ),
            GraphpostError::Api(api) => api.user_message(),
            e if e.is_network() => format!("Network error: {} (check your connection)", e),
            e => e.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    #[error("invalid {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    WriteError(String),

    #[error("load .env: {0}")]
    DotEnv(String),

    #[error("invalid profile name: {0}")]
    InvalidProfileName(String),

    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// Failures below the Graph API protocol: building, sending or decoding a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("create request: {0}")]
    CreateRequest(String),

    #[error("graph request: {message}")]
    Request { message: String, network: bool },

    #[error("read response: {0}")]
    ReadBody(String),

    #[error("parse response: {0}")]
    Parse(String),

    #[error("graph api returned non-2xx: status {0}")]
    Status(u16),
}

impl TransportError {
    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        let network = error.is_connect() || error.is_timeout();
        if error.is_builder() {
            return TransportError::CreateRequest(error.to_string());
        }
        TransportError::Request {
            message: error.to_string(),
            network,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Request { network: true, .. })
    }
}

/// Structured error reported by the Graph API
///
/// Arrives either in the body of a non-2xx response or under an `error` key
/// of an otherwise successful one.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,

    #[serde(default, rename = "type")]
    pub error_type: String,

    #[serde(default)]
    pub code: i64,

    #[serde(default)]
    pub error_subcode: Option<i64>,

    #[serde(default)]
    pub fbtrace_id: Option<String>,
}

impl ApiError {
    /// Invalid, expired or revoked access token
    pub fn is_auth_error(&self) -> bool {
        self.code == OAUTH_INVALID_TOKEN_CODE
    }

    fn render(&self, prefix: &str) -> String {
        if self.code != 0 && !self.error_type.is_empty() {
            format!("{} ({} {}): {}", prefix, self.code, self.error_type, self.message)
        } else if self.code != 0 {
            format!("{} ({}): {}", prefix, self.code, self.message)
        } else {
            format!("{}: {}", prefix, self.message)
        }
    }

    pub fn user_message(&self) -> String {
        self.render("Graph API error")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render("graph api error"))
    }
}

impl std::error::Error for ApiError {}

/// A response lacked a field the caller needs
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingFieldError {
    #[error("missing id in response")]
    MissingId,

    #[error("empty id in response")]
    EmptyId,

    #[error("unexpected id type in response")]
    UnexpectedIdType,

    #[error("missing access_token in response")]
    MissingAccessToken,

    #[error("missing data in response")]
    MissingTokenData,

    #[error("missing instagram_business_account in response")]
    MissingInstagramAccount,

    #[error("missing instagram_business_account id")]
    MissingInstagramAccountId,
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("OS keyring not accessible: {0}")]
    KeyringUnavailable(String),

    #[error(
        "keyring connection timed out after {} (D-Bus SecretService may be unresponsive); \
         set GRAPHPOST_KEYRING_BACKEND=file and GRAPHPOST_KEYRING_PASSWORD=<password> \
         to use encrypted file storage instead",
        format_duration(.timeout)
    )]
    KeyringTimeout { timeout: Duration },

    #[error("Keyring operation failed: {0}")]
    Keyring(String),

    #[error("invalid keyring backend: {0:?} (expected auto, keychain, or file)")]
    InvalidBackend(String),

    #[error("no TTY available for keyring file backend password prompt; set GRAPHPOST_KEYRING_PASSWORD")]
    NoTty,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption failed: wrong keyring password or corrupted token file")]
    DecryptionFailed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("open file: {0}")]
    OpenFile(#[source] std::io::Error),

    #[error("upload request: {message}")]
    Request { message: String, network: bool },

    #[error("read response: {0}")]
    ReadBody(String),

    #[error("upload failed: status {0}")]
    Status(u16),

    #[error("parse response: {0}")]
    Parse(String),

    #[error("upload failed: {0}")]
    Rejected(String),

    #[error("upload failed")]
    Failed,

    #[error("upload failed: missing url")]
    MissingUrl,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid url scheme: {0}")]
    InvalidScheme(String),
}

impl UploadError {
    pub fn is_network(&self) -> bool {
        matches!(self, UploadError::Request { network: true, .. })
    }
}
