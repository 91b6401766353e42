//! Access token storage
//!
//! Tokens are stored per profile in one of two backends:
//!
//! - [`KeyringStore`]: the OS keyring (macOS Keychain, Windows Credential
//!   Manager, Secret Service on Linux)
//! - [`EncryptedFileStore`]: one age passphrase-encrypted file per profile,
//!   for headless machines without a keyring daemon
//!
//! [`open_store`] picks the backend from `GRAPHPOST_KEYRING_BACKEND`, the
//! `keyring_backend` entry of the profiles file, or `auto`.
//!
//! # Example
//!
//! ```no_run
//! use libgraphpost::credentials::{open_store, CredentialStore};
//! use libgraphpost::profiles::ProfilesFile;
//!
//! # fn example() -> libgraphpost::Result<()> {
//! let store = open_store(&ProfilesFile::read()?)?;
//! store.set_token("default", "EAAB...")?;
//! assert!(store.get_token("default")?.is_some());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{mpsc, Mutex};
use std::time::Duration;

use crate::error::{CredentialError, GraphpostError, Result};
use crate::profiles::{config_dir, create_private_dir, write_private_file, ProfilesFile};

/// Service name used for OS keyring entries
pub const KEYRING_SERVICE: &str = "graphpost";

pub const ENV_KEYRING_BACKEND: &str = "GRAPHPOST_KEYRING_BACKEND";
pub const ENV_KEYRING_PASSWORD: &str = "GRAPHPOST_KEYRING_PASSWORD";

/// How long `auto` waits for Secret Service before giving up
pub const KEYRING_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

const PROBE_USER: &str = "availability_check";

/// Per-profile access token storage
pub trait CredentialStore: Send + Sync {
    /// Token stored for `profile`; `None` when there is none
    fn get_token(&self, profile: &str) -> Result<Option<String>>;

    fn set_token(&self, profile: &str, token: &str) -> Result<()>;

    /// Remove the token for `profile`, returning whether one existed
    fn delete_token(&self, profile: &str) -> Result<bool>;

    fn backend_name(&self) -> &str;
}

/// OS keyring backend
///
/// Entries use service `graphpost` and user `token:<profile>`.
#[derive(Debug, Default)]
pub struct KeyringStore;

impl KeyringStore {
    /// Handle on the OS keyring
    ///
    /// Nothing is sent to the keyring here; use [`KeyringStore::probe`] to
    /// check that it answers.
    pub fn new() -> Self {
        Self
    }

    /// Read a well-known entry to check that the keyring answers
    ///
    /// A missing entry counts as reachable. With a `timeout`, the read runs on
    /// a helper thread that is abandoned if it does not finish in time.
    ///
    /// # Errors
    ///
    /// - `CredentialError::KeyringUnavailable` if the keyring reports an error
    /// - `CredentialError::KeyringTimeout` if it does not answer within `timeout`
    pub fn probe(&self, timeout: Option<Duration>) -> Result<()> {
        let check = || -> std::result::Result<(), String> {
            let entry =
                keyring::Entry::new(KEYRING_SERVICE, PROBE_USER).map_err(|e| e.to_string())?;
            match entry.get_password() {
                Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.to_string()),
            }
        };

        let outcome = match timeout {
            None => check(),
            Some(timeout) => run_with_timeout(timeout, check)
                .ok_or(CredentialError::KeyringTimeout { timeout })?,
        };

        outcome.map_err(|e| CredentialError::KeyringUnavailable(e).into())
    }

    fn entry(profile: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, &format!("token:{}", profile))
            .map_err(|e| CredentialError::KeyringUnavailable(e.to_string()).into())
    }
}

impl CredentialStore for KeyringStore {
    fn get_token(&self, profile: &str) -> Result<Option<String>> {
        match Self::entry(profile)?.get_password() {
            Ok(token) => {
                tracing::debug!(profile, "retrieved token from OS keyring");
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn set_token(&self, profile: &str, token: &str) -> Result<()> {
        Self::entry(profile)?
            .set_password(token)
            .map_err(|e| CredentialError::Keyring(e.to_string()))?;

        tracing::debug!(profile, "stored token in OS keyring");
        Ok(())
    }

    fn delete_token(&self, profile: &str) -> Result<bool> {
        match Self::entry(profile)?.delete_password() {
            Ok(()) => {
                tracing::debug!(profile, "deleted token from OS keyring");
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "keychain"
    }
}

/// Passphrase-encrypted token files
///
/// The passphrase comes from `GRAPHPOST_KEYRING_PASSWORD` or, when stdin is a
/// terminal, an interactive prompt. It is asked for at most once per store
/// and only when a token file is actually read or written.
pub struct EncryptedFileStore {
    base_path: PathBuf,
    password: Mutex<Option<String>>,
}

impl EncryptedFileStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            password: Mutex::new(None),
        }
    }

    /// Store with a fixed passphrase, never prompting
    pub fn with_password(base_path: PathBuf, password: impl Into<String>) -> Self {
        Self {
            base_path,
            password: Mutex::new(Some(password.into())),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn token_path(&self, profile: &str) -> PathBuf {
        self.base_path.join(format!("token.{}.age", profile))
    }

    fn password(&self) -> Result<String> {
        let mut cached = self
            .password
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(password) = cached.as_ref() {
            return Ok(password.clone());
        }

        let password = match std::env::var(ENV_KEYRING_PASSWORD) {
            Ok(password) if !password.is_empty() => password,
            _ if atty::is(atty::Stream::Stdin) => {
                rpassword::prompt_password("Keyring password: ").map_err(CredentialError::Io)?
            }
            _ => return Err(CredentialError::NoTty.into()),
        };

        *cached = Some(password.clone());
        Ok(password)
    }

    pub(crate) fn encrypt(&self, data: &str) -> Result<Vec<u8>> {
        let password = self.password()?;
        let encryptor = age::Encryptor::with_user_passphrase(age::secrecy::Secret::new(password));

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        writer
            .write_all(data.as_bytes())
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| CredentialError::Encryption(e.to_string()))?;

        Ok(encrypted)
    }

    fn decrypt(&self, data: &[u8]) -> Result<String> {
        let password = self.password()?;

        let decryptor = match age::Decryptor::new(data) {
            Ok(age::Decryptor::Passphrase(d)) => d,
            Ok(_) => {
                return Err(CredentialError::Encryption(
                    "token file is not passphrase-encrypted".to_string(),
                )
                .into())
            }
            Err(e) => return Err(CredentialError::Encryption(e.to_string()).into()),
        };

        let mut reader = decryptor
            .decrypt(&age::secrecy::Secret::new(password), None)
            .map_err(|e| match e {
                age::DecryptError::DecryptionFailed
                | age::DecryptError::InvalidMac
                | age::DecryptError::NoMatchingKeys => CredentialError::DecryptionFailed,
                other => CredentialError::Encryption(other.to_string()),
            })?;

        let mut decrypted = vec![];
        reader
            .read_to_end(&mut decrypted)
            .map_err(|_| CredentialError::DecryptionFailed)?;

        String::from_utf8(decrypted)
            .map_err(|e| CredentialError::Encryption(format!("invalid UTF-8: {}", e)).into())
    }
}

impl CredentialStore for EncryptedFileStore {
    fn get_token(&self, profile: &str) -> Result<Option<String>> {
        let path = self.token_path(profile);
        let encrypted = match std::fs::read(&path) {
            Ok(encrypted) => encrypted,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialError::Io(e).into()),
        };

        let token = self.decrypt(&encrypted)?;
        tracing::debug!(profile, path = %path.display(), "retrieved token from encrypted file");
        Ok(Some(token))
    }

    fn set_token(&self, profile: &str, token: &str) -> Result<()> {
        let encrypted = self.encrypt(token)?;
        create_private_dir(&self.base_path).map_err(CredentialError::Io)?;

        let path = self.token_path(profile);
        write_private_file(&path, &encrypted).map_err(CredentialError::Io)?;

        tracing::debug!(profile, path = %path.display(), "stored token in encrypted file");
        Ok(())
    }

    fn delete_token(&self, profile: &str) -> Result<bool> {
        match std::fs::remove_file(self.token_path(profile)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CredentialError::Io(e).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyringBackend {
    Auto,
    Keychain,
    File,
}

impl FromStr for KeyringBackend {
    type Err = CredentialError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(KeyringBackend::Auto),
            "keychain" => Ok(KeyringBackend::Keychain),
            "file" => Ok(KeyringBackend::File),
            _ => Err(CredentialError::InvalidBackend(s.to_string())),
        }
    }
}

impl fmt::Display for KeyringBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyringBackend::Auto => write!(f, "auto"),
            KeyringBackend::Keychain => write!(f, "keychain"),
            KeyringBackend::File => write!(f, "file"),
        }
    }
}

/// Where the backend choice came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendSource {
    Env,
    Config,
    Default,
}

impl fmt::Display for BackendSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSource::Env => write!(f, "env"),
            BackendSource::Config => write!(f, "config"),
            BackendSource::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyringBackendInfo {
    pub backend: KeyringBackend,
    pub source: BackendSource,
}

/// Pick the backend: environment value, then config value, then `auto`
///
/// Blank values are skipped; anything else must name a known backend.
pub fn resolve_backend(
    env_value: Option<&str>,
    config_value: Option<&str>,
) -> Result<KeyringBackendInfo> {
    fn non_blank(value: Option<&str>) -> Option<&str> {
        value.filter(|v| !v.trim().is_empty())
    }

    if let Some(value) = non_blank(env_value) {
        return Ok(KeyringBackendInfo {
            backend: value.parse()?,
            source: BackendSource::Env,
        });
    }

    if let Some(value) = non_blank(config_value) {
        return Ok(KeyringBackendInfo {
            backend: value.parse()?,
            source: BackendSource::Config,
        });
    }

    Ok(KeyringBackendInfo {
        backend: KeyringBackend::Auto,
        source: BackendSource::Default,
    })
}

/// [`resolve_backend`] against `GRAPHPOST_KEYRING_BACKEND` and `profiles`
pub fn resolve_backend_info(profiles: &ProfilesFile) -> Result<KeyringBackendInfo> {
    let env_value = std::env::var(ENV_KEYRING_BACKEND).ok();
    resolve_backend(env_value.as_deref(), profiles.keyring_backend.as_deref())
}

/// `auto` on Linux without a D-Bus session cannot reach Secret Service
pub fn should_force_file_backend(os: &str, backend: KeyringBackend, dbus_addr: Option<&str>) -> bool {
    os == "linux" && backend == KeyringBackend::Auto && dbus_addr.map_or(true, str::is_empty)
}

/// Directory holding encrypted token files
pub fn keyring_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("keyring"))
}

/// `auto` on Linux with a D-Bus session may still hang when the keyring
/// daemon is installed but not running
pub fn should_use_keyring_timeout(os: &str, backend: KeyringBackend, dbus_addr: Option<&str>) -> bool {
    os == "linux" && backend == KeyringBackend::Auto && dbus_addr.map_or(false, |a| !a.is_empty())
}

/// Run `f` on a helper thread, giving up after `timeout`
///
/// The thread is left running when it does not finish in time.
fn run_with_timeout<T, F>(timeout: Duration, f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(timeout).ok()
}

/// Open the credential store selected for this process
///
/// `auto` probes the OS keyring and falls back to the encrypted file store
/// when the keyring reports an error. On Linux with a D-Bus session the probe
/// is bounded by [`KEYRING_OPEN_TIMEOUT`] and a timeout is returned as an
/// error.
pub fn open_store(profiles: &ProfilesFile) -> Result<Box<dyn CredentialStore>> {
    let info = resolve_backend_info(profiles)?;
    let os = std::env::consts::OS;
    let dbus_addr = std::env::var("DBUS_SESSION_BUS_ADDRESS").ok();

    let backend = if should_force_file_backend(os, info.backend, dbus_addr.as_deref()) {
        tracing::debug!("no D-Bus session, using encrypted file backend");
        KeyringBackend::File
    } else {
        info.backend
    };

    match backend {
        KeyringBackend::File => Ok(Box::new(EncryptedFileStore::new(keyring_dir()?))),
        KeyringBackend::Keychain => Ok(Box::new(KeyringStore::new())),
        KeyringBackend::Auto => {
            let store = KeyringStore::new();
            let timeout = should_use_keyring_timeout(os, backend, dbus_addr.as_deref())
                .then_some(KEYRING_OPEN_TIMEOUT);

            match store.probe(timeout) {
                Ok(()) => Ok(Box::new(store)),
                Err(GraphpostError::Credential(e @ CredentialError::KeyringTimeout { .. })) => {
                    Err(e.into())
                }
                Err(e) => {
                    tracing::warn!("OS keyring unavailable ({}), using encrypted file backend", e);
                    Ok(Box::new(EncryptedFileStore::new(keyring_dir()?)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backend_parse() {
        assert_eq!("auto".parse::<KeyringBackend>().unwrap(), KeyringBackend::Auto);
        assert_eq!(" File ".parse::<KeyringBackend>().unwrap(), KeyringBackend::File);
        assert_eq!(
            "KEYCHAIN".parse::<KeyringBackend>().unwrap(),
            KeyringBackend::Keychain
        );
        assert!(matches!(
            "vault".parse::<KeyringBackend>(),
            Err(CredentialError::InvalidBackend(_))
        ));
    }

    #[test]
    fn test_resolve_backend_precedence() {
        let info = resolve_backend(Some("file"), Some("keychain")).unwrap();
        assert_eq!(info.backend, KeyringBackend::File);
        assert_eq!(info.source, BackendSource::Env);

        let info = resolve_backend(Some("  "), Some("keychain")).unwrap();
        assert_eq!(info.backend, KeyringBackend::Keychain);
        assert_eq!(info.source, BackendSource::Config);

        let info = resolve_backend(None, None).unwrap();
        assert_eq!(info.backend, KeyringBackend::Auto);
        assert_eq!(info.source, BackendSource::Default);
        assert_eq!(info.source.to_string(), "default");
    }

    #[test]
    fn test_resolve_backend_rejects_unknown_value() {
        match resolve_backend(Some("vault"), None) {
            Err(GraphpostError::Credential(CredentialError::InvalidBackend(value))) => {
                assert_eq!(value, "vault")
            }
            other => panic!("expected invalid backend, got {:?}", other),
        }
    }

    #[test]
    fn test_force_file_backend_rule() {
        assert!(should_force_file_backend("linux", KeyringBackend::Auto, None));
        assert!(should_force_file_backend("linux", KeyringBackend::Auto, Some("")));
        assert!(!should_force_file_backend(
            "linux",
            KeyringBackend::Auto,
            Some("unix:path=/run/user/1000/bus")
        ));
        assert!(!should_force_file_backend("linux", KeyringBackend::Keychain, None));
        assert!(!should_force_file_backend("macos", KeyringBackend::Auto, None));
    }

    #[test]
    fn test_keyring_timeout_rule() {
        let bus = Some("unix:path=/run/user/1000/bus");
        assert!(should_use_keyring_timeout("linux", KeyringBackend::Auto, bus));
        assert!(!should_use_keyring_timeout("linux", KeyringBackend::Auto, None));
        assert!(!should_use_keyring_timeout("linux", KeyringBackend::Auto, Some("")));
        assert!(!should_use_keyring_timeout("linux", KeyringBackend::Keychain, bus));
        assert!(!should_use_keyring_timeout("linux", KeyringBackend::File, bus));
        assert!(!should_use_keyring_timeout("macos", KeyringBackend::Auto, bus));

        // The two Linux rules never both apply
        for dbus in [None, Some(""), bus] {
            assert!(
                !(should_force_file_backend("linux", KeyringBackend::Auto, dbus)
                    && should_use_keyring_timeout("linux", KeyringBackend::Auto, dbus))
            );
        }
    }

    #[test]
    fn test_run_with_timeout_returns_result() {
        assert_eq!(run_with_timeout(Duration::from_secs(5), || 42), Some(42));
    }

    #[test]
    fn test_run_with_timeout_gives_up_on_hang() {
        let (_release, hold) = mpsc::channel::<()>();
        let started = std::time::Instant::now();

        // Blocks until `_release` is dropped at the end of the test
        let result = run_with_timeout(Duration::from_millis(50), move || hold.recv().is_ok());

        assert_eq!(result, None);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_encrypted_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedFileStore::with_password(temp_dir.path().join("keyring"), "correct horse");

        assert_eq!(store.get_token("work").unwrap(), None);
        store.set_token("work", "EAAB-token").unwrap();
        assert_eq!(store.get_token("work").unwrap().as_deref(), Some("EAAB-token"));

        let raw = std::fs::read(temp_dir.path().join("keyring").join("token.work.age")).unwrap();
        assert!(!String::from_utf8_lossy(&raw).contains("EAAB-token"));

        assert!(store.delete_token("work").unwrap());
        assert!(!store.delete_token("work").unwrap());
        assert_eq!(store.get_token("work").unwrap(), None);
        assert_eq!(store.backend_name(), "file");
    }

    #[test]
    fn test_encrypted_store_wrong_password() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();

        EncryptedFileStore::with_password(dir.clone(), "first")
            .set_token("default", "secret")
            .unwrap();

        let other = EncryptedFileStore::with_password(dir, "second");
        match other.get_token("default") {
            Err(GraphpostError::Credential(CredentialError::DecryptionFailed)) => {}
            other => panic!("expected decryption failure, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = EncryptedFileStore::with_password(temp_dir.path().to_path_buf(), "pw");
        store.set_token("default", "t").unwrap();

        let mode = std::fs::metadata(temp_dir.path().join("token.default.age"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
