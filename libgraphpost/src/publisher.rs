//! Publishing workflows
//!
//! Every workflow follows the same remote contract: obtain a public URL for
//! the media, create a container, wait for it to finish processing, publish
//! it. Carousels add one child container per item in front of the parent.
//!
//! ```text
//! Uploading -> ContainerCreated -> (ChildProcessing ->)* ParentCreated -> Polling -> Published
//! ```
//!
//! The first failure ends the run. Containers created before the failure are
//! left for the API to expire.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::config::{Config, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT};
use crate::error::{GraphpostError, Result};
use crate::graph::{GraphClient, MediaApi, Transport};
use crate::upload::Uploader;

/// Kind of a carousel item, decided by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn is_video(self) -> bool {
        self == MediaKind::Video
    }
}

/// Classify a local file as image or video by its extension (case-insensitive)
///
/// # Errors
///
/// Returns `GraphpostError::Validation` for any other extension.
pub fn classify_media(path: &Path) -> Result<MediaKind> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" | "png" | "gif" | "webp" => Ok(MediaKind::Image),
        "mp4" | "mov" => Ok(MediaKind::Video),
        "" => Err(GraphpostError::Validation(format!(
            "unsupported file extension: {}",
            path.display()
        ))),
        other => Err(GraphpostError::Validation(format!(
            "unsupported file extension: .{}",
            other
        ))),
    }
}

/// Accept only well-formed `https` URLs with a host
pub fn require_https(raw: &str) -> Result<String> {
    let parsed =
        Url::parse(raw).map_err(|e| GraphpostError::Validation(format!("invalid url: {}", e)))?;

    if parsed.scheme() != "https" {
        return Err(GraphpostError::Validation("url must be https".to_string()));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(GraphpostError::Validation("url must include host".to_string()));
    }

    Ok(raw.to_string())
}

/// Where a single photo or reel comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSource {
    /// Local file, uploaded before use
    File(PathBuf),
    /// Public HTTPS URL, used directly
    Url(String),
}

impl MediaSource {
    /// Build a source from mutually exclusive `--file` / `--url` arguments
    ///
    /// # Errors
    ///
    /// `GraphpostError::Validation` when neither or both are given, or when
    /// the URL is not a well-formed HTTPS URL.
    pub fn from_args(file: Option<PathBuf>, url: Option<String>) -> Result<Self> {
        let url = url.filter(|u| !u.trim().is_empty());
        match (file, url) {
            (None, None) => Err(GraphpostError::Validation(
                "provide --file or --url".to_string(),
            )),
            (Some(_), Some(_)) => Err(GraphpostError::Validation(
                "provide only one of --file or --url".to_string(),
            )),
            (Some(file), None) => Ok(MediaSource::File(file)),
            (None, Some(url)) => Ok(MediaSource::Url(require_https(&url)?)),
        }
    }
}

/// Steps of a publishing run, reported as tracing events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStage {
    Uploading,
    ContainerCreated,
    ChildProcessing,
    ParentCreated,
    Polling,
    Published,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishStage::Uploading => "uploading",
            PublishStage::ContainerCreated => "container_created",
            PublishStage::ChildProcessing => "child_processing",
            PublishStage::ParentCreated => "parent_created",
            PublishStage::Polling => "polling",
            PublishStage::Published => "published",
        };
        f.write_str(name)
    }
}

/// Interval and overall deadline for status polling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    /// Container that was published
    pub creation_id: String,
    pub published_media_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarouselResult {
    /// Child container IDs in input order
    pub child_ids: Vec<String>,
    pub result: PublishResult,
}

/// Runs one publishing workflow per call
pub struct Publisher<T, U> {
    media: MediaApi<T>,
    uploader: U,
    poll: PollSettings,
    cancel: CancellationToken,
}

impl<U: Uploader> Publisher<GraphClient, U> {
    /// Build an HTTP-backed publisher from loaded configuration
    ///
    /// # Errors
    ///
    /// `GraphpostError::Config` when the access token or user ID is missing;
    /// no request is made in that case.
    pub fn from_config(config: &Config, uploader: U) -> Result<Self> {
        config.validate_for_publishing()?;

        Ok(Self::new(
            MediaApi::from_config(config.client_config()),
            uploader,
            PollSettings {
                interval: config.poll_interval,
                timeout: config.poll_timeout,
            },
        ))
    }
}

impl<T: Transport, U: Uploader> Publisher<T, U> {
    pub fn new(media: MediaApi<T>, uploader: U, poll: PollSettings) -> Self {
        Self {
            media,
            uploader,
            poll,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to abort status polling from outside (signals, deadlines)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn media(&self) -> &MediaApi<T> {
        &self.media
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    pub fn poll_settings(&self) -> PollSettings {
        self.poll
    }

    /// Publish a single photo
    pub async fn publish_photo(
        &self,
        source: &MediaSource,
        caption: Option<&str>,
    ) -> Result<PublishResult> {
        let image_url = self.resolve_url(source).await?;
        let creation_id = self
            .media
            .create_photo_container(&image_url, caption)
            .await?;
        stage(PublishStage::ContainerCreated, &creation_id);

        self.poll_and_publish(creation_id).await
    }

    /// Publish a single reel
    pub async fn publish_reel(
        &self,
        source: &MediaSource,
        caption: Option<&str>,
    ) -> Result<PublishResult> {
        let video_url = self.resolve_url(source).await?;
        let creation_id = self
            .media
            .create_reel_container(&video_url, caption)
            .await?;
        stage(PublishStage::ContainerCreated, &creation_id);

        self.poll_and_publish(creation_id).await
    }

    /// Publish a carousel of local files, in the given order
    ///
    /// All files are classified before anything is uploaded, so an
    /// unsupported extension fails the run without touching the network.
    /// Children are then created one at a time; video children are polled
    /// until finished before the next file is handled.
    pub async fn publish_carousel(
        &self,
        files: &[PathBuf],
        caption: Option<&str>,
    ) -> Result<CarouselResult> {
        if files.is_empty() {
            return Err(GraphpostError::Validation(
                "provide at least one --files entry".to_string(),
            ));
        }

        let items = files
            .iter()
            .map(|file| classify_media(file).map(|kind| (file, kind)))
            .collect::<Result<Vec<_>>>()?;

        let mut child_ids = Vec::with_capacity(items.len());
        for (file, kind) in items {
            info!(stage = %PublishStage::Uploading, file = %file.display(), "uploading carousel item");
            let media_url = self.uploader.upload(file).await?;

            let child_id = self
                .media
                .create_carousel_child(&media_url, kind.is_video())
                .await?;
            stage(PublishStage::ContainerCreated, &child_id);

            if kind.is_video() {
                stage(PublishStage::ChildProcessing, &child_id);
                self.wait_until_ready(&child_id).await?;
            }

            child_ids.push(child_id);
        }

        let creation_id = self
            .media
            .create_carousel_container(&child_ids, caption)
            .await?;
        stage(PublishStage::ParentCreated, &creation_id);

        let result = self.poll_and_publish(creation_id).await?;
        Ok(CarouselResult { child_ids, result })
    }

    async fn resolve_url(&self, source: &MediaSource) -> Result<String> {
        match source {
            MediaSource::Url(url) => require_https(url),
            MediaSource::File(path) => {
                info!(stage = %PublishStage::Uploading, file = %path.display(), "uploading media");
                self.uploader.upload(path).await
            }
        }
    }

    async fn wait_until_ready(&self, creation_id: &str) -> Result<()> {
        self.media
            .poll_status(
                creation_id,
                self.poll.interval,
                self.poll.timeout,
                &self.cancel,
            )
            .await
    }

    async fn poll_and_publish(&self, creation_id: String) -> Result<PublishResult> {
        stage(PublishStage::Polling, &creation_id);
        self.wait_until_ready(&creation_id).await?;

        let published_media_id = self.media.publish(&creation_id).await?;
        stage(PublishStage::Published, &published_media_id);

        Ok(PublishResult {
            creation_id,
            published_media_id,
        })
    }
}

fn stage(stage: PublishStage, id: &str) {
    info!(stage = %stage, id, "publish stage");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation_message(result: Result<impl fmt::Debug>) -> String {
        match result {
            Err(GraphpostError::Validation(message)) => message,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_media_by_extension() {
        assert_eq!(classify_media(Path::new("photo.png")).unwrap(), MediaKind::Image);
        assert_eq!(classify_media(Path::new("a/b/photo.JPEG")).unwrap(), MediaKind::Image);
        assert_eq!(classify_media(Path::new("anim.gif")).unwrap(), MediaKind::Image);
        assert_eq!(classify_media(Path::new("x.webp")).unwrap(), MediaKind::Image);
        assert_eq!(classify_media(Path::new("clip.mp4")).unwrap(), MediaKind::Video);
        assert_eq!(classify_media(Path::new("clip.MOV")).unwrap(), MediaKind::Video);
    }

    #[test]
    fn test_classify_media_rejects_unknown() {
        assert_eq!(
            validation_message(classify_media(Path::new("doc.pdf"))),
            "unsupported file extension: .pdf"
        );
        assert!(validation_message(classify_media(Path::new("README"))).contains("README"));
    }

    #[test]
    fn test_require_https() {
        assert_eq!(
            require_https("https://example.com/v.mp4").unwrap(),
            "https://example.com/v.mp4"
        );
        assert_eq!(
            validation_message(require_https("http://example.com/v.mp4")),
            "url must be https"
        );
        assert!(validation_message(require_https("not a url")).starts_with("invalid url"));
        assert!(require_https("https://").is_err());
    }

    #[test]
    fn test_media_source_requires_exactly_one() {
        assert_eq!(
            validation_message(MediaSource::from_args(None, None)),
            "provide --file or --url"
        );
        assert_eq!(
            validation_message(MediaSource::from_args(
                Some(PathBuf::from("a.mp4")),
                Some("https://example.com/a.mp4".to_string())
            )),
            "provide only one of --file or --url"
        );
        assert_eq!(
            MediaSource::from_args(Some(PathBuf::from("a.mp4")), Some(String::new())).unwrap(),
            MediaSource::File(PathBuf::from("a.mp4"))
        );
        assert_eq!(
            MediaSource::from_args(None, Some("https://example.com/a.mp4".to_string())).unwrap(),
            MediaSource::Url("https://example.com/a.mp4".to_string())
        );
    }

    #[test]
    fn test_media_source_rejects_plain_http() {
        assert_eq!(
            validation_message(MediaSource::from_args(
                None,
                Some("http://example.com/a.mp4".to_string())
            )),
            "url must be https"
        );
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PublishStage::ChildProcessing.to_string(), "child_processing");
        assert_eq!(PublishStage::Published.to_string(), "published");
    }
}
