//! Runtime configuration
//!
//! Values are layered, lowest precedence first: built-in defaults, a `.env`
//! file in the working directory, `IG_*` environment variables, the selected
//! profile (IDs from the profiles file, token from the credential store) and
//! finally command-line overrides applied by the binaries.

use std::time::Duration;

use crate::credentials::open_store;
use crate::error::{ConfigError, Result};
use crate::graph::{ClientConfig, DEFAULT_GRAPH_VERSION};
use crate::profiles::{normalize_profile_name_or_default, ProfilesFile};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(300);

pub const ENV_APP_ID: &str = "IG_APP_ID";
pub const ENV_APP_SECRET: &str = "IG_APP_SECRET";
pub const ENV_ACCESS_TOKEN: &str = "IG_ACCESS_TOKEN";
pub const ENV_PAGE_ID: &str = "IG_PAGE_ID";
pub const ENV_BUSINESS_ID: &str = "IG_BUSINESS_ID";
pub const ENV_USER_ID: &str = "IG_USER_ID";
pub const ENV_GRAPH_VERSION: &str = "IG_GRAPH_VERSION";
pub const ENV_POLL_INTERVAL: &str = "IG_POLL_INTERVAL";
pub const ENV_POLL_TIMEOUT: &str = "IG_POLL_TIMEOUT";

#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    pub app_id: String,
    pub app_secret: String,
    pub access_token: String,
    pub page_id: String,
    pub business_id: String,
    /// Instagram user ID, the actor for publishing
    pub user_id: String,
    pub graph_version: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_secret: String::new(),
            access_token: String::new(),
            page_id: String::new(),
            business_id: String::new(),
            user_id: String::new(),
            graph_version: DEFAULT_GRAPH_VERSION.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |value: &str| if value.is_empty() { "" } else { "<redacted>" };
        f.debug_struct("Config")
            .field("app_id", &self.app_id)
            .field("app_secret", &redact(&self.app_secret))
            .field("access_token", &redact(&self.access_token))
            .field("page_id", &self.page_id)
            .field("business_id", &self.business_id)
            .field("user_id", &self.user_id)
            .field("graph_version", &self.graph_version)
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// IDs supplied on the command line, applied last
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub user_id: Option<String>,
    pub page_id: Option<String>,
    pub business_id: Option<String>,
}

impl Config {
    /// Load `.env` (if present) and the process environment
    pub fn load() -> Result<Self> {
        load_dotenv()?;
        Self::from_env()
    }

    /// Build from the process environment only
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// `ConfigError::InvalidValue` naming the variable when a duration does
    /// not parse, or when the poll interval is zero.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).unwrap_or_default();
        let mut config = Config {
            app_id: get(ENV_APP_ID),
            app_secret: get(ENV_APP_SECRET),
            access_token: get(ENV_ACCESS_TOKEN),
            page_id: get(ENV_PAGE_ID),
            business_id: get(ENV_BUSINESS_ID),
            user_id: get(ENV_USER_ID),
            ..Default::default()
        };

        if let Some(version) = lookup(ENV_GRAPH_VERSION).filter(|v| !v.is_empty()) {
            config.graph_version = version;
        }
        if let Some(raw) = lookup(ENV_POLL_INTERVAL).filter(|v| !v.is_empty()) {
            let interval = parse_duration(ENV_POLL_INTERVAL, &raw)?;
            if interval.is_zero() {
                return Err(ConfigError::InvalidValue {
                    name: ENV_POLL_INTERVAL.to_string(),
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
            config.poll_interval = interval;
        }
        if let Some(raw) = lookup(ENV_POLL_TIMEOUT).filter(|v| !v.is_empty()) {
            config.poll_timeout = parse_duration(ENV_POLL_TIMEOUT, &raw)?;
        }

        Ok(config)
    }

    /// [`Config::load`] followed by the named profile (blank means `default`)
    ///
    /// Reads the profiles file and opens the credential store; a stored token
    /// replaces `IG_ACCESS_TOKEN`.
    pub fn load_with_profile(profile: &str) -> Result<Self> {
        let mut config = Self::load()?;
        let name = normalize_profile_name_or_default(profile)?;
        let profiles = ProfilesFile::read()?;

        let store = open_store(&profiles)?;
        let token = store.get_token(&name)?;

        config.apply_profile(&profiles, &name, token);
        tracing::debug!(profile = %name, backend = store.backend_name(), "loaded profile");
        Ok(config)
    }

    /// Overlay a profile's non-empty IDs and its stored token
    pub fn apply_profile(&mut self, profiles: &ProfilesFile, name: &str, token: Option<String>) {
        if let Some(profile) = profiles.get(name) {
            overlay(&mut self.user_id, &profile.user_id);
            overlay(&mut self.page_id, &profile.page_id);
            overlay(&mut self.business_id, &profile.business_id);
        }
        if let Some(token) = token {
            overlay(&mut self.access_token, &token);
        }
    }

    /// Apply command-line overrides; blank values are ignored
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(user_id) = &overrides.user_id {
            overlay(&mut self.user_id, user_id);
        }
        if let Some(page_id) = &overrides.page_id {
            overlay(&mut self.page_id, page_id);
        }
        if let Some(business_id) = &overrides.business_id {
            overlay(&mut self.business_id, business_id);
        }
    }

    /// Graph API client settings acting as the configured Instagram user
    pub fn client_config(&self) -> ClientConfig {
        let token = Some(self.access_token.clone()).filter(|t| !t.is_empty());
        ClientConfig::new(self.graph_version.as_str(), token, self.user_id.as_str())
    }

    pub fn validate_for_publishing(&self) -> Result<()> {
        require(&[
            (ENV_ACCESS_TOKEN, &self.access_token),
            (ENV_USER_ID, &self.user_id),
        ])
    }

    pub fn validate_for_account_lookup(&self) -> Result<()> {
        require(&[
            (ENV_PAGE_ID, &self.page_id),
            (ENV_ACCESS_TOKEN, &self.access_token),
        ])
    }

    pub fn validate_for_business_lookup(&self) -> Result<()> {
        require(&[
            (ENV_BUSINESS_ID, &self.business_id),
            (ENV_ACCESS_TOKEN, &self.access_token),
        ])
    }

    pub fn validate_for_token_exchange(&self) -> Result<()> {
        require(&[(ENV_APP_ID, &self.app_id), (ENV_APP_SECRET, &self.app_secret)])
    }

    pub fn validate_for_token_debug(&self) -> Result<()> {
        require(&[(ENV_ACCESS_TOKEN, &self.access_token)])
    }
}

/// Load `.env` from the working directory without overriding set variables
pub fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env");
            Ok(())
        }
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(ConfigError::DotEnv(e.to_string()).into()),
    }
}

fn parse_duration(name: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim()).map_err(|e| {
        ConfigError::InvalidValue {
            name: name.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn overlay(target: &mut String, value: &str) {
    if !value.is_empty() {
        *target = value.to_string();
    }
}

/// Every missing variable, reported together
fn require(entries: &[(&str, &String)]) -> Result<()> {
    let missing: Vec<String> = entries
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingEnv(missing).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphpostError;
    use crate::profiles::Profile;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn missing(result: Result<()>) -> Vec<String> {
        match result {
            Err(GraphpostError::Config(ConfigError::MissingEnv(names))) => names,
            other => panic!("expected missing env error, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.graph_version, "v19.0");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.poll_timeout, Duration::from_secs(300));
        assert!(config.access_token.is_empty());
    }

    #[test]
    fn test_reads_environment() {
        let config = Config::from_lookup(lookup(&[
            ("IG_ACCESS_TOKEN", "tok"),
            ("IG_USER_ID", "178"),
            ("IG_GRAPH_VERSION", "v21.0"),
            ("IG_POLL_INTERVAL", "250ms"),
            ("IG_POLL_TIMEOUT", "2m"),
        ]))
        .unwrap();

        assert_eq!(config.access_token, "tok");
        assert_eq!(config.user_id, "178");
        assert_eq!(config.graph_version, "v21.0");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.poll_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_duration_names_variable() {
        match Config::from_lookup(lookup(&[("IG_POLL_TIMEOUT", "soon")])) {
            Err(GraphpostError::Config(ConfigError::InvalidValue { name, .. })) => {
                assert_eq!(name, "IG_POLL_TIMEOUT")
            }
            other => panic!("expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        for raw in ["0s", "0ms"] {
            match Config::from_lookup(lookup(&[("IG_POLL_INTERVAL", raw)])) {
                Err(GraphpostError::Config(ConfigError::InvalidValue { name, reason })) => {
                    assert_eq!(name, "IG_POLL_INTERVAL");
                    assert_eq!(reason, "must be greater than zero");
                }
                other => panic!("expected invalid value for {}, got {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_validation_lists_every_missing_variable() {
        let config = Config::default();
        assert_eq!(
            missing(config.validate_for_publishing()),
            vec!["IG_ACCESS_TOKEN", "IG_USER_ID"]
        );
        assert_eq!(
            missing(config.validate_for_account_lookup()),
            vec!["IG_PAGE_ID", "IG_ACCESS_TOKEN"]
        );
        assert_eq!(
            missing(config.validate_for_business_lookup()),
            vec!["IG_BUSINESS_ID", "IG_ACCESS_TOKEN"]
        );
        assert_eq!(
            missing(config.validate_for_token_exchange()),
            vec!["IG_APP_ID", "IG_APP_SECRET"]
        );
        assert_eq!(missing(config.validate_for_token_debug()), vec!["IG_ACCESS_TOKEN"]);
    }

    #[test]
    fn test_validation_passes_when_complete() {
        let config = Config {
            access_token: "tok".to_string(),
            user_id: "178".to_string(),
            ..Default::default()
        };
        assert!(config.validate_for_publishing().is_ok());
        assert_eq!(missing(config.validate_for_account_lookup()), vec!["IG_PAGE_ID"]);
    }

    #[test]
    fn test_profile_overrides_environment() {
        let mut config = Config {
            user_id: "env-user".to_string(),
            page_id: "env-page".to_string(),
            access_token: "env-token".to_string(),
            ..Default::default()
        };

        let mut profiles = ProfilesFile::default();
        profiles.profiles.insert(
            "work".to_string(),
            Profile {
                user_id: "profile-user".to_string(),
                ..Default::default()
            },
        );

        config.apply_profile(&profiles, "work", Some("stored-token".to_string()));
        assert_eq!(config.user_id, "profile-user");
        assert_eq!(config.page_id, "env-page");
        assert_eq!(config.access_token, "stored-token");

        config.apply_profile(&profiles, "unknown", None);
        assert_eq!(config.user_id, "profile-user");
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = Config {
            user_id: "profile-user".to_string(),
            ..Default::default()
        };
        config.apply_overrides(&Overrides {
            user_id: Some("cli-user".to_string()),
            page_id: Some(String::new()),
            business_id: None,
        });
        assert_eq!(config.user_id, "cli-user");
        assert!(config.page_id.is_empty());
    }

    #[test]
    fn test_client_config() {
        let config = Config {
            access_token: "tok".to_string(),
            user_id: "178".to_string(),
            ..Default::default()
        };
        let client = config.client_config();
        assert_eq!(client.access_token.as_deref(), Some("tok"));
        assert_eq!(client.actor_id, "178");
        assert_eq!(client.api_version, "v19.0");

        assert!(Config::default().client_config().access_token.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config {
            access_token: "very-secret".to_string(),
            app_secret: "also-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("also-secret"));
    }
}
