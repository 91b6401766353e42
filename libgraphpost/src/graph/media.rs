//! Media container operations: create, poll, publish

use serde_json::{Number, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{ClientConfig, GraphClient, JsonObject, Method, Params, Transport};
use crate::error::{GraphpostError, MissingFieldError, Result};

/// Processing state of a creation as reported by `status_code`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingStatus {
    Finished,
    Error,
    /// Any other value, or no value at all
    InProgress(Option<String>),
}

impl ProcessingStatus {
    pub fn from_response(response: &JsonObject) -> Self {
        match response.get("status_code").and_then(Value::as_str) {
            Some("FINISHED") => ProcessingStatus::Finished,
            Some("ERROR") => ProcessingStatus::Error,
            other => ProcessingStatus::InProgress(other.map(str::to_string)),
        }
    }
}

/// Container and publish operations for one actor (Instagram user)
pub struct MediaApi<T> {
    transport: T,
    actor_id: String,
}

impl MediaApi<GraphClient> {
    /// Build an HTTP-backed API for the actor named in `config`
    pub fn from_config(config: ClientConfig) -> Self {
        let actor_id = config.actor_id.clone();
        Self::new(GraphClient::new(config), actor_id)
    }
}

impl<T: Transport> MediaApi<T> {
    pub fn new(transport: T, actor_id: impl Into<String>) -> Self {
        Self {
            transport,
            actor_id: actor_id.into(),
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn create_photo_container(
        &self,
        image_url: &str,
        caption: Option<&str>,
    ) -> Result<String> {
        let mut params = Params::new();
        params.insert("image_url".to_string(), image_url.to_string());
        insert_caption(&mut params, caption);

        self.create_container(params).await
    }

    pub async fn create_reel_container(
        &self,
        video_url: &str,
        caption: Option<&str>,
    ) -> Result<String> {
        let mut params = Params::new();
        params.insert("media_type".to_string(), "REELS".to_string());
        params.insert("video_url".to_string(), video_url.to_string());
        insert_caption(&mut params, caption);

        self.create_container(params).await
    }

    pub async fn create_carousel_child(&self, media_url: &str, is_video: bool) -> Result<String> {
        let mut params = Params::new();
        params.insert("is_carousel_item".to_string(), "true".to_string());
        let key = if is_video { "video_url" } else { "image_url" };
        params.insert(key.to_string(), media_url.to_string());

        self.create_container(params).await
    }

    pub async fn create_carousel_container(
        &self,
        child_ids: &[String],
        caption: Option<&str>,
    ) -> Result<String> {
        let mut params = Params::new();
        params.insert("media_type".to_string(), "CAROUSEL".to_string());
        params.insert("children".to_string(), child_ids.join(","));
        insert_caption(&mut params, caption);

        self.create_container(params).await
    }

    /// Wait until a creation finishes processing
    ///
    /// Checks `status_code` once per `interval` until it reads `FINISHED`.
    /// The deadline is checked once per iteration, so at most
    /// `ceil(timeout / interval) + 1` requests are made and the last one may
    /// land up to one interval past the deadline.
    ///
    /// # Errors
    ///
    /// - `GraphpostError::MediaProcessing` when the status reads `ERROR`
    /// - `GraphpostError::PollTimeout` once the deadline has passed
    /// - `GraphpostError::Cancelled` if `cancel` fires during a wait
    /// - any transport or API error from the status request
    pub async fn poll_status(
        &self,
        creation_id: &str,
        interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            if Instant::now() > deadline {
                return Err(GraphpostError::PollTimeout { timeout });
            }

            let mut params = Params::new();
            params.insert("fields".to_string(), "status_code".to_string());
            let response = self
                .transport
                .request(Method::GET, creation_id, params)
                .await?;

            match ProcessingStatus::from_response(&response) {
                ProcessingStatus::Finished => {
                    debug!(creation_id, "media processing finished");
                    return Ok(());
                }
                ProcessingStatus::Error => return Err(GraphpostError::MediaProcessing),
                ProcessingStatus::InProgress(status) => {
                    debug!(creation_id, status = ?status, "media still processing");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(GraphpostError::Cancelled),
                _ = sleep(interval) => {}
            }
        }
    }

    pub async fn publish(&self, creation_id: &str) -> Result<String> {
        let mut params = Params::new();
        params.insert("creation_id".to_string(), creation_id.to_string());

        let response = self
            .transport
            .request(
                Method::POST,
                &format!("{}/media_publish", self.actor_id),
                params,
            )
            .await?;

        extract_id(&response)
    }

    async fn create_container(&self, params: Params) -> Result<String> {
        let response = self
            .transport
            .request(Method::POST, &format!("{}/media", self.actor_id), params)
            .await?;

        extract_id(&response)
    }
}

fn insert_caption(params: &mut Params, caption: Option<&str>) {
    if let Some(caption) = caption.filter(|c| !c.is_empty()) {
        params.insert("caption".to_string(), caption.to_string());
    }
}

/// Read the `id` of a created resource
///
/// Strings are taken verbatim, numbers are rendered as integers.
pub fn extract_id(response: &JsonObject) -> Result<String> {
    match response.get("id") {
        None => Err(MissingFieldError::MissingId.into()),
        Some(Value::String(id)) if id.is_empty() => Err(MissingFieldError::EmptyId.into()),
        Some(Value::String(id)) => Ok(id.clone()),
        Some(Value::Number(number)) => Ok(format_numeric_id(number)),
        Some(_) => Err(MissingFieldError::UnexpectedIdType.into()),
    }
}

fn format_numeric_id(number: &Number) -> String {
    if let Some(value) = number.as_u64() {
        value.to_string()
    } else if let Some(value) = number.as_i64() {
        value.to_string()
    } else {
        format!("{:.0}", number.as_f64().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {}", other),
        }
    }

    fn missing_field(result: Result<String>) -> MissingFieldError {
        match result {
            Err(GraphpostError::MissingField(e)) => e,
            other => panic!("expected MissingField error, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_id_string() {
        assert_eq!(extract_id(&object(json!({"id": "123"}))).unwrap(), "123");
    }

    #[test]
    fn test_extract_id_number() {
        assert_eq!(extract_id(&object(json!({"id": 123}))).unwrap(), "123");
        assert_eq!(
            extract_id(&object(json!({"id": 17895695668004550u64}))).unwrap(),
            "17895695668004550"
        );
        assert_eq!(extract_id(&object(json!({"id": 42.0}))).unwrap(), "42");
    }

    #[test]
    fn test_extract_id_errors() {
        assert_eq!(
            missing_field(extract_id(&object(json!({"id": ""})))),
            MissingFieldError::EmptyId
        );
        assert_eq!(
            missing_field(extract_id(&object(json!({})))),
            MissingFieldError::MissingId
        );
        assert_eq!(
            missing_field(extract_id(&object(json!({"id": true})))),
            MissingFieldError::UnexpectedIdType
        );
        assert_eq!(
            missing_field(extract_id(&object(json!({"id": null})))),
            MissingFieldError::UnexpectedIdType
        );
    }

    #[test]
    fn test_extract_id_is_repeatable() {
        let response = object(json!({"id": 987}));
        assert_eq!(extract_id(&response).unwrap(), extract_id(&response).unwrap());
    }

    #[test]
    fn test_processing_status_from_response() {
        assert_eq!(
            ProcessingStatus::from_response(&object(json!({"status_code": "FINISHED"}))),
            ProcessingStatus::Finished
        );
        assert_eq!(
            ProcessingStatus::from_response(&object(json!({"status_code": "ERROR"}))),
            ProcessingStatus::Error
        );
        assert_eq!(
            ProcessingStatus::from_response(&object(json!({"status_code": "IN_PROGRESS"}))),
            ProcessingStatus::InProgress(Some("IN_PROGRESS".to_string()))
        );
        assert_eq!(
            ProcessingStatus::from_response(&object(json!({"id": "1"}))),
            ProcessingStatus::InProgress(None)
        );
    }

    #[test]
    fn test_empty_caption_is_omitted() {
        let mut params = Params::new();
        insert_caption(&mut params, Some(""));
        assert!(params.is_empty());
        insert_caption(&mut params, Some("hello"));
        assert_eq!(params.get("caption").map(String::as_str), Some("hello"));
    }
}
