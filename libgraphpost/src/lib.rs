//! Graphpost - publish photos, reels and carousels through the Instagram Graph API
//!
//! Media is published in three steps: create a container from a public URL,
//! poll it until processing finishes, publish it. This library provides the
//! Graph API transport, the publishing workflows, local file upload and the
//! configuration/profile/credential plumbing shared by the `gp-*` tools.

pub mod config;
pub mod credentials;
pub mod error;
pub mod graph;
pub mod logging;
pub mod mock;
pub mod profiles;
pub mod publisher;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{CredentialStore, EncryptedFileStore, KeyringStore};
pub use error::{ConfigError, GraphpostError, Result};
pub use graph::{ClientConfig, GraphClient, MediaApi, Transport};
pub use profiles::{Profile, ProfilesFile};
pub use publisher::{CarouselResult, MediaSource, PollSettings, PublishResult, Publisher};
pub use upload::{UguuUploader, Uploader};
