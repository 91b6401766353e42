//! gp-creds - Profile and credential management for Graphpost
//!
//! Profiles keep the non-secret IDs in the profiles file; access tokens go to
//! the OS keyring or the encrypted file store.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use libgraphpost::credentials::{
    open_store, resolve_backend_info, CredentialStore, KeyringBackend, ENV_KEYRING_BACKEND,
    ENV_KEYRING_PASSWORD,
};
use libgraphpost::error::ConfigError;
use libgraphpost::profiles::{normalize_profile_name_or_default, profiles_path, Profile, ProfilesFile};
use libgraphpost::GraphpostError;
use std::io::{self, Read};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "gp-creds")]
#[command(version)]
#[command(about = "Manage Graphpost profiles and stored access tokens")]
#[command(long_about = "\
gp-creds - Manage Graphpost profiles and stored access tokens

DESCRIPTION:
    A profile names one Instagram account: its user, Page and business IDs
    live in the profiles file, its access token in the OS keyring or in an
    encrypted file store. gp-post and gp-account select a profile with
    --profile.

USAGE:
    gp-creds profile set brand --user-id 17841400000000000 --token-stdin
    gp-creds profile show brand
    gp-creds profile list
    gp-creds profile delete brand
    gp-creds keyring file

ENVIRONMENT:
    GRAPHPOST_CONFIG             Profiles file location
    GRAPHPOST_KEYRING_BACKEND    auto, keychain or file (overrides the file)
    GRAPHPOST_KEYRING_PASSWORD   Passphrase for the file backend

EXIT CODES:
    0 - Success
    1 - Error
    3 - Invalid input
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Profile used when a command takes no explicit name
    #[arg(long, global = true, env = "GRAPHPOST_PROFILE", default_value = "default")]
    profile: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create, inspect and remove profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Show or set the credential backend (auto, keychain, file)
    Keyring {
        /// New backend; omit to show the current one
        backend: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ProfileAction {
    /// Create or update a profile
    Set {
        /// Profile name (defaults to --profile)
        name: Option<String>,

        /// Access token to store
        #[arg(long, conflicts_with = "token_stdin")]
        access_token: Option<String>,

        /// Read the access token from stdin (prompts when stdin is a terminal)
        #[arg(long)]
        token_stdin: bool,

        /// Instagram user ID
        #[arg(long)]
        user_id: Option<String>,

        /// Facebook Page ID
        #[arg(long)]
        page_id: Option<String>,

        /// Business ID
        #[arg(long)]
        business_id: Option<String>,
    },

    /// Show one profile
    Show {
        /// Profile name (defaults to --profile)
        name: Option<String>,
    },

    /// List every profile
    List,

    /// Delete a profile and its stored token
    Delete {
        /// Profile name
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();

    libgraphpost::logging::init_for_cli(cli.verbose);

    match run(cli) {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
        Err(e) => {
            // Library errors keep their own message and exit code
            match e.downcast_ref::<GraphpostError>() {
                Some(inner) => {
                    eprintln!("{}", inner.user_message());
                    std::process::exit(inner.exit_code());
                }
                None => {
                    eprintln!("{:#}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn run(cli: Cli) -> Result<Vec<String>> {
    match cli.command {
        Commands::Profile {
            action:
                ProfileAction::Set {
                    name,
                    access_token,
                    token_stdin,
                    user_id,
                    page_id,
                    business_id,
                },
        } => {
            let name = name.unwrap_or(cli.profile);
            let update = ProfileUpdate {
                user_id: non_empty("--user-id", user_id)?,
                page_id: non_empty("--page-id", page_id)?,
                business_id: non_empty("--business-id", business_id)?,
            };
            let token = if token_stdin {
                Some(read_token()?)
            } else {
                access_token
            };
            let token = non_empty("--access-token", token)?;

            set_profile(&name, update, token)
        }
        Commands::Profile {
            action: ProfileAction::Show { name },
        } => show_profile(&name.unwrap_or(cli.profile)),
        Commands::Profile {
            action: ProfileAction::List,
        } => list_profiles(),
        Commands::Profile {
            action: ProfileAction::Delete { name },
        } => delete_profile(&name),
        Commands::Keyring { backend: None } => show_keyring(),
        Commands::Keyring {
            backend: Some(backend),
        } => set_keyring(&backend),
    }
}

/// IDs to change on a profile; `None` leaves the stored value alone
#[derive(Debug, Default)]
struct ProfileUpdate {
    user_id: Option<String>,
    page_id: Option<String>,
    business_id: Option<String>,
}

impl ProfileUpdate {
    fn apply(self, profile: &mut Profile) {
        if let Some(user_id) = self.user_id {
            profile.user_id = user_id;
        }
        if let Some(page_id) = self.page_id {
            profile.page_id = page_id;
        }
        if let Some(business_id) = self.business_id {
            profile.business_id = business_id;
        }
    }
}

/// A flag that was given must carry a value
fn non_empty(flag: &str, value: Option<String>) -> Result<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => {
            Err(GraphpostError::Validation(format!("{} cannot be empty", flag)).into())
        }
        other => Ok(other),
    }
}

/// Token from stdin, or a hidden prompt when stdin is a terminal
fn read_token() -> Result<String> {
    if atty::is(atty::Stream::Stdin) {
        return rpassword::prompt_password("Access token: ").context("Failed to read access token");
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read access token from stdin")?;
    Ok(buffer.trim().to_string())
}

fn set_profile(name: &str, update: ProfileUpdate, token: Option<String>) -> Result<Vec<String>> {
    let name = normalize_profile_name_or_default(name)?;
    let mut profiles = ProfilesFile::read()?;

    update.apply(profiles.entry(&name));
    profiles.write()?;
    debug!(profile = %name, "saved profile");

    let store = open_store(&profiles)?;
    if let Some(token) = token {
        store.set_token(&name, &token)?;
        debug!(profile = %name, backend = store.backend_name(), "stored access token");
    }

    let profile = profiles.get(&name).cloned().unwrap_or_default();
    profile_lines(store.as_ref(), &name, &profile)
}

fn show_profile(name: &str) -> Result<Vec<String>> {
    let name = normalize_profile_name_or_default(name)?;
    let profiles = ProfilesFile::read()?;

    let profile = profiles
        .get(&name)
        .ok_or_else(|| GraphpostError::from(ConfigError::ProfileNotFound(name.clone())))?;

    let store = open_store(&profiles)?;
    profile_lines(store.as_ref(), &name, profile)
}

fn list_profiles() -> Result<Vec<String>> {
    let profiles = ProfilesFile::read()?;
    let names = profiles.names();
    if names.is_empty() {
        return Ok(vec!["NO_PROFILES_FOUND".to_string()]);
    }

    let store = open_store(&profiles)?;
    let mut lines = Vec::new();
    for name in names {
        let profile = profiles.get(&name).cloned().unwrap_or_default();
        lines.extend(profile_lines(store.as_ref(), &name, &profile)?);
        lines.push("---".to_string());
    }

    Ok(lines)
}

fn delete_profile(name: &str) -> Result<Vec<String>> {
    let name = normalize_profile_name_or_default(name)?;
    let mut profiles = ProfilesFile::read()?;

    if profiles.remove(&name).is_none() {
        return Err(GraphpostError::from(ConfigError::ProfileNotFound(name)).into());
    }
    profiles.write()?;

    let store = open_store(&profiles)?;
    let had_token = store.delete_token(&name)?;
    debug!(profile = %name, had_token, "deleted profile");

    Ok(vec![format!("DELETED_PROFILE={}", name)])
}

fn profile_lines(store: &dyn CredentialStore, name: &str, profile: &Profile) -> Result<Vec<String>> {
    let token_state = match store.get_token(name)? {
        Some(_) => "SET",
        None => "EMPTY",
    };

    Ok(vec![
        format!("PROFILE={}", name),
        format!("IG_USER_ID={}", profile.user_id),
        format!("PAGE_ID={}", profile.page_id),
        format!("BUSINESS_ID={}", profile.business_id),
        format!("ACCESS_TOKEN={}", token_state),
    ])
}

fn show_keyring() -> Result<Vec<String>> {
    let profiles = ProfilesFile::read()?;
    let info = resolve_backend_info(&profiles)?;
    let path = profiles_path()?;

    eprintln!("Hint: gp-creds keyring <auto|keychain|file>");
    Ok(vec![
        format!("CONFIG_PATH={}", path.display()),
        format!("KEYRING_BACKEND={}", info.backend),
        format!("KEYRING_SOURCE={}", info.source),
    ])
}

fn set_keyring(raw: &str) -> Result<Vec<String>> {
    let backend = parse_backend_arg(raw)?;

    let mut profiles = ProfilesFile::read()?;
    profiles.keyring_backend = Some(backend.to_string());
    profiles.write()?;

    if let Some(value) = env_value(ENV_KEYRING_BACKEND) {
        eprintln!("NOTE: {}={} overrides the profiles file", ENV_KEYRING_BACKEND, value);
    }

    if backend == KeyringBackend::File {
        if env_value(ENV_KEYRING_PASSWORD).is_some() {
            eprintln!("{} found in environment.", ENV_KEYRING_PASSWORD);
        } else if !atty::is(atty::Stream::Stdin) {
            eprintln!(
                "NOTE: the file backend in a non-interactive context requires {}",
                ENV_KEYRING_PASSWORD
            );
        } else {
            eprintln!("Hint: set {} for non-interactive use (CI/ssh)", ENV_KEYRING_PASSWORD);
        }
    }

    Ok(vec![
        format!("CONFIG_PATH={}", profiles_path()?.display()),
        format!("KEYRING_BACKEND={}", backend),
    ])
}

/// Backend named on the command line; `default` is an alias for `auto`
fn parse_backend_arg(raw: &str) -> Result<KeyringBackend> {
    let normalized = raw.trim().to_lowercase();
    if normalized == "default" {
        return Ok(KeyringBackend::Auto);
    }

    normalized.parse().map_err(|_| {
        GraphpostError::Validation(format!(
            "invalid backend: {:?} (expected auto, keychain, or file)",
            raw
        ))
        .into()
    })
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_rejects_blank_flag() {
        let error = non_empty("--user-id", Some("  ".to_string())).unwrap_err();
        let inner = error.downcast_ref::<GraphpostError>().unwrap();
        assert_eq!(inner.exit_code(), 3);
        assert_eq!(inner.to_string(), "Invalid input: --user-id cannot be empty");

        assert_eq!(non_empty("--user-id", None).unwrap(), None);
        assert_eq!(
            non_empty("--user-id", Some(" 178 ".to_string())).unwrap(),
            Some("178".to_string())
        );
    }

    #[test]
    fn test_profile_update_keeps_unset_fields() {
        let mut profile = Profile {
            user_id: "old-user".to_string(),
            page_id: "old-page".to_string(),
            business_id: String::new(),
        };

        ProfileUpdate {
            page_id: Some("new-page".to_string()),
            ..Default::default()
        }
        .apply(&mut profile);

        assert_eq!(profile.user_id, "old-user");
        assert_eq!(profile.page_id, "new-page");
        assert!(profile.business_id.is_empty());
    }

    #[test]
    fn test_parse_backend_arg() {
        assert_eq!(parse_backend_arg("default").unwrap(), KeyringBackend::Auto);
        assert_eq!(parse_backend_arg("File").unwrap(), KeyringBackend::File);
        assert_eq!(parse_backend_arg("keychain").unwrap(), KeyringBackend::Keychain);

        let error = parse_backend_arg("vault").unwrap_err();
        assert_eq!(
            error.downcast_ref::<GraphpostError>().map(|e| e.exit_code()),
            Some(3)
        );
    }
}
