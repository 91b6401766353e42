//! Scripted transport and uploader for testing
//!
//! `MockTransport` replays queued responses per `(method, path)` and records
//! every request, so workflow tests can assert on exactly which calls were
//! made without a network. `MockUploader` hands out predictable URLs.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{ApiError, GraphpostError, Result, TransportError, UploadError};
use crate::graph::client::{JsonObject, Method, Params, Transport};
use crate::upload::Uploader;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockResponse {
    Json(Value),
    Api(ApiError),
    Transport(TransportError),
}

/// A request seen by `MockTransport`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub params: Params,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Transport that answers from a script
///
/// Responses for a route are consumed in order; the last one is repeated
/// once the queue is down to a single entry. Unscripted routes fail with a
/// 404 status error.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<HashMap<(Method, String), VecDeque<MockResponse>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `method` on `path`
    pub fn respond(&self, method: Method, path: &str, response: MockResponse) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// Queue a JSON body for `method` on `path`
    pub fn json(&self, method: Method, path: &str, body: Value) -> &Self {
        self.respond(method, path, MockResponse::Json(body))
    }

    /// Queue one status response per entry, in order
    pub fn statuses(&self, creation_id: &str, statuses: &[&str]) -> &Self {
        for status in statuses {
            self.json(
                Method::GET,
                creation_id,
                serde_json::json!({ "status_code": status, "id": creation_id }),
            );
        }
        self
    }

    /// Every request made so far, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests made to `path` with `method`
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_response(&self, method: &Method, path: &str) -> Option<MockResponse> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(&(method.clone(), path.to_string()))?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        resource_path: &str,
        params: Params,
    ) -> Result<JsonObject> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.clone(),
            path: resource_path.to_string(),
            params,
        });

        match self.next_response(&method, resource_path) {
            Some(MockResponse::Json(Value::Object(body))) => Ok(body),
            Some(MockResponse::Json(other)) => Err(TransportError::Parse(format!(
                "expected JSON object, got {}",
                other
            ))
            .into()),
            Some(MockResponse::Api(api_error)) => Err(GraphpostError::Api(api_error)),
            Some(MockResponse::Transport(error)) => Err(GraphpostError::Transport(error)),
            None => Err(TransportError::Status(404).into()),
        }
    }
}

/// Uploader returning `https://cdn.test/<file name>`
#[derive(Debug, Clone, Default)]
pub struct MockUploader {
    uploaded: Arc<Mutex<Vec<PathBuf>>>,
    failure: Option<String>,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// An uploader whose every upload is rejected with `message`
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn uploaded(&self) -> Vec<PathBuf> {
        self.uploaded.lock().unwrap().clone()
    }

    pub fn url_for(path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("https://cdn.test/{}", name)
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(&self, path: &Path) -> Result<String> {
        self.uploaded.lock().unwrap().push(path.to_path_buf());
        if let Some(message) = &self.failure {
            return Err(UploadError::Rejected(message.clone()).into());
        }
        Ok(Self::url_for(path))
    }
}
