//! CLI integration tests for gp-post
//!
//! Every case here fails before any network request is made.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const IG_VARS: &[&str] = &[
    "IG_APP_ID",
    "IG_APP_SECRET",
    "IG_ACCESS_TOKEN",
    "IG_PAGE_ID",
    "IG_BUSINESS_ID",
    "IG_USER_ID",
    "IG_GRAPH_VERSION",
    "IG_POLL_INTERVAL",
    "IG_POLL_TIMEOUT",
    "GRAPHPOST_PROFILE",
    "GRAPHPOST_KEYRING_PASSWORD",
    "RUST_LOG",
];

/// gp-post with an empty config home, the file backend and no IG_* variables
fn gp_post(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("gp-post").unwrap();
    for var in IG_VARS {
        cmd.env_remove(var);
    }
    cmd.current_dir(temp_dir.path())
        .env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
        .env("GRAPHPOST_CONFIG", temp_dir.path().join("config.toml"))
        .env("GRAPHPOST_KEYRING_BACKEND", "file");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("photo"))
        .stdout(predicate::str::contains("reel"))
        .stdout(predicate::str::contains("carousel"))
        .stdout(predicate::str::contains("--profile"));
}

#[test]
fn test_reel_rejects_file_and_url_together() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .args([
            "reel",
            "--file",
            "clip.mp4",
            "--url",
            "https://example.com/clip.mp4",
        ])
        .assert()
        .code(3)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("provide only one of --file or --url"));
}

#[test]
fn test_photo_requires_a_source() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .arg("photo")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("provide --file or --url"));
}

#[test]
fn test_reel_rejects_plain_http_url() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .args(["reel", "--url", "http://example.com/clip.mp4"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("url must be https"));
}

#[test]
fn test_missing_configuration_lists_variables() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .args(["photo", "--url", "https://example.com/photo.jpg"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Missing required environment variables: IG_ACCESS_TOKEN, IG_USER_ID",
        ));
}

#[test]
fn test_user_id_flag_satisfies_configuration() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .args([
            "--user-id",
            "17841400000000000",
            "carousel",
            "--files",
            "notes.pdf",
        ])
        .env("IG_ACCESS_TOKEN", "token")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unsupported file extension: .pdf"));
}

#[test]
fn test_carousel_rejects_unsupported_file_before_network() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(".env"),
        "IG_ACCESS_TOKEN=token\nIG_USER_ID=17841400000000000\n",
    )
    .unwrap();

    gp_post(&temp_dir)
        .args(["carousel", "--files", "a.jpg", "--files", "notes.pdf"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unsupported file extension: .pdf"));
}

#[test]
fn test_carousel_requires_files() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .arg("carousel")
        .env("IG_ACCESS_TOKEN", "token")
        .env("IG_USER_ID", "17841400000000000")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("at least one"));
}

#[test]
fn test_invalid_poll_timeout() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .args(["photo", "--url", "https://example.com/photo.jpg"])
        .env("IG_POLL_TIMEOUT", "forever")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IG_POLL_TIMEOUT"));
}

#[test]
fn test_invalid_profile_name() {
    let temp_dir = TempDir::new().unwrap();
    gp_post(&temp_dir)
        .args([
            "--profile",
            "no spaces allowed",
            "photo",
            "--url",
            "https://example.com/photo.jpg",
        ])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid profile name"));
}

#[test]
fn test_profile_ids_are_used() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("config.toml"),
        "[profiles.brand]\nuser_id = \"17841400000000000\"\n",
    )
    .unwrap();

    // Only the token is missing once the profile supplies the user ID
    gp_post(&temp_dir)
        .args(["--profile", "brand", "photo", "--url", "https://example.com/p.jpg"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Missing required environment variables: IG_ACCESS_TOKEN",
        ))
        .stderr(predicate::str::contains("IG_USER_ID").not());
}
