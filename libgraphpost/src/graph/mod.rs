//! Graph API client
//!
//! - [`client`]: transport (endpoint building, token injection, response classification)
//! - [`media`]: container creation, status polling, publishing
//! - [`token`]: token exchange/debug and account lookups
//!
//! # Examples
//!
//! ```no_run
//! use libgraphpost::graph::{ClientConfig, MediaApi};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> libgraphpost::Result<()> {
//! let config = ClientConfig::new("v19.0", Some("token".to_string()), "17841400000000000");
//! let api = MediaApi::from_config(config);
//!
//! let creation_id = api
//!     .create_photo_container("https://example.com/photo.jpg", Some("hello"))
//!     .await?;
//! api.poll_status(
//!     &creation_id,
//!     Duration::from_secs(5),
//!     Duration::from_secs(300),
//!     &CancellationToken::new(),
//! )
//! .await?;
//! let media_id = api.publish(&creation_id).await?;
//! println!("published {}", media_id);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod media;
pub mod token;

pub use client::{
    ClientConfig, GraphClient, JsonObject, Method, Params, Transport, DEFAULT_BASE_URL,
    DEFAULT_GRAPH_VERSION,
};
pub use media::{extract_id, MediaApi, ProcessingStatus};
pub use token::{OwnedPage, TokenInfo};
