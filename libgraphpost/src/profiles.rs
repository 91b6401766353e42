//! Named profiles persisted as TOML
//!
//! A profile holds the non-secret IDs for one Instagram account; its access
//! token lives in the credential store under the same name. The file also
//! remembers the preferred keyring backend.
//!
//! ```toml
//! keyring_backend = "file"
//!
//! [profiles.default]
//! user_id = "17841400000000000"
//! page_id = "100000000000000"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

/// Directory name under the platform config directory
pub const APP_DIR: &str = "graphpost";

pub const DEFAULT_PROFILE: &str = "default";

/// Overrides the location of the profiles file
pub const ENV_CONFIG_PATH: &str = "GRAPHPOST_CONFIG";

const PROFILES_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub page_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub business_id: String,
}

/// Contents of the profiles file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilesFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyring_backend: Option<String>,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl ProfilesFile {
    /// Read the profiles file from its default location
    pub fn read() -> Result<Self> {
        Self::read_from(&profiles_path()?)
    }

    /// Read a profiles file; a missing file reads as empty
    pub fn read_from(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::ReadError(e).into()),
        };

        let file: ProfilesFile = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(file)
    }

    /// Write the profiles file to its default location
    pub fn write(&self) -> Result<()> {
        self.write_to(&profiles_path()?)
    }

    /// Write atomically: temp file next to `path`, then rename over it
    ///
    /// The parent directory is created with mode 0700 and the file gets
    /// mode 0600 on Unix.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent)
                .map_err(|e| ConfigError::WriteError(format!("create directory: {}", e)))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::WriteError(format!("encode profiles: {}", e)))?;

        let mut tmp_name = path.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        write_private_file(&tmp_path, content.as_bytes())
            .map_err(|e| ConfigError::WriteError(format!("write profiles: {}", e)))?;

        std::fs::rename(&tmp_path, path)
            .map_err(|e| ConfigError::WriteError(format!("commit profiles: {}", e)))?;

        tracing::debug!(path = %path.display(), "wrote profiles file");
        Ok(())
    }

    /// Profile names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Entry for `name`, created empty if absent
    pub fn entry(&mut self, name: &str) -> &mut Profile {
        self.profiles.entry(name.to_string()).or_default()
    }

    pub fn remove(&mut self, name: &str) -> Option<Profile> {
        self.profiles.remove(name)
    }
}

/// `{config_dir}/graphpost`
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;
    Ok(base.join(APP_DIR))
}

/// Location of the profiles file, honouring `GRAPHPOST_CONFIG`
pub fn profiles_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
        }
    }

    Ok(config_dir()?.join(PROFILES_FILE))
}

/// Trim and lowercase a profile name, allowing only `a-z 0-9 - _ .`
pub fn normalize_profile_name(raw: &str) -> Result<String> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() {
        return Err(ConfigError::InvalidProfileName("empty".to_string()).into());
    }

    let valid = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(ConfigError::InvalidProfileName(format!("{:?}", raw)).into());
    }

    Ok(name)
}

/// Like [`normalize_profile_name`], but a blank name means `default`
pub fn normalize_profile_name_or_default(raw: &str) -> Result<String> {
    if raw.trim().is_empty() {
        return Ok(DEFAULT_PROFILE.to_string());
    }
    normalize_profile_name(raw)
}

/// Create `dir` and its parents, restricting the leaf to the owner on Unix
pub(crate) fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
    }

    #[cfg(not(unix))]
    {
        std::fs::create_dir_all(dir)
    }
}

/// Write `contents` to a file only the owner can read, replacing any old content
///
/// A new file is created with mode 0600, so its contents are never readable
/// by others. An existing file is narrowed to 0600 as well.
pub(crate) fn write_private_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        let mut file = options.open(path)?;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        file.write_all(contents)?;
        file.sync_all()
    }

    #[cfg(not(unix))]
    {
        let mut file = options.open(path)?;
        file.write_all(contents)?;
        file.sync_all()
    }
}
