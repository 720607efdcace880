use crate::config::ClassifierApiConfig;
use crate::models::{
    ClassificationRecord, ClassifyResponse, HistoryEntry, HistoryResponse, ModelSelector,
    ResultsResponse, SelectedImage, ServiceErrorBody, UploadProgress,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT},
    multipart::{Form, Part},
    Response, StatusCode, Url,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::instrument;

const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

pub const NETWORK_ERROR_MESSAGE: &str = "Network error: Unable to connect to the server. Please check your internet connection and try again.";
pub const TIMEOUT_ERROR_MESSAGE: &str =
    "No response from server: The server is not responding. Please try again later.";
pub const NOT_FOUND_MESSAGE: &str = "No results found for this image.";
pub const UPLOAD_FAILED_MESSAGE: &str = "Failed to upload image. Please try again.";

/// Receives upload progress while a submission is in flight.
pub type ProgressSender = mpsc::UnboundedSender<UploadProgress>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Service responded with HTTP {status_code}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Service {
        status_code: u16,
        detail: Option<String>,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
    #[error("Client configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::InvalidInput(_) => "invalid_input",
            ClientError::Network(_) => "network",
            ClientError::Timeout => "timeout",
            ClientError::Service { .. } => "service",
            ClientError::NotFound(_) => "not_found",
            ClientError::InvalidResponse(_) => "invalid_response",
            ClientError::Configuration(_) => "configuration",
        }
    }

    /// Message shown to the user when an upload fails.
    pub fn user_message(&self) -> String {
        self.user_message_or(UPLOAD_FAILED_MESSAGE)
    }

    /// Message shown to the user, with `generic` for failures that carry nothing more specific.
    pub fn user_message_or(&self, generic: &str) -> String {
        match self {
            ClientError::InvalidInput(message) => message.clone(),
            ClientError::Network(_) => NETWORK_ERROR_MESSAGE.to_string(),
            ClientError::Timeout => TIMEOUT_ERROR_MESSAGE.to_string(),
            ClientError::Service {
                detail: Some(detail),
                ..
            } => detail.clone(),
            ClientError::Service {
                status_code,
                detail: None,
            } => match *status_code {
                400 => "Bad request: The server could not process your image. Please try a different image format.".to_string(),
                413 => "Image too large: Please select a smaller image file.".to_string(),
                415 => "Unsupported file type: Please select a valid image file (JPEG, PNG, etc.).".to_string(),
                _ => generic.to_string(),
            },
            ClientError::NotFound(_) => NOT_FOUND_MESSAGE.to_string(),
            ClientError::InvalidResponse(_) | ClientError::Configuration(_) => generic.to_string(),
        }
    }
}

fn transport_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else if err.is_decode() {
        ClientError::InvalidResponse(err.to_string())
    } else {
        ClientError::Network(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub identifier: String,
}

#[async_trait]
pub trait ClassifierApi: Send + Sync {
    /// Uploads `image`. Progress values sent to `on_progress` never decrease
    /// and end at 100 when the call succeeds.
    async fn submit(
        &self,
        image: &SelectedImage,
        model: ModelSelector,
        on_progress: Option<ProgressSender>,
    ) -> Result<Submission, ClientError>;

    async fn fetch_results(
        &self,
        identifier: &str,
        model: ModelSelector,
    ) -> Result<ClassificationRecord, ClientError>;

    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, ClientError>;
}

/// Forwards strictly increasing progress values to an optional listener.
#[derive(Debug, Default)]
struct ProgressTracker {
    sender: Option<ProgressSender>,
    last: Option<UploadProgress>,
}

impl ProgressTracker {
    fn new(sender: Option<ProgressSender>) -> Self {
        Self { sender, last: None }
    }

    fn report(&mut self, progress: UploadProgress) {
        if self.last.is_some_and(|last| progress <= last) {
            return;
        }
        self.last = Some(progress);
        tracing::debug!("Upload progress {}", progress);
        if let Some(sender) = &self.sender {
            let _ = sender.send(progress);
        }
    }

    fn complete(&mut self) {
        self.report(UploadProgress::COMPLETE);
    }
}

fn progress_body(bytes: Bytes, tracker: Arc<Mutex<ProgressTracker>>) -> reqwest::Body {
    let total = bytes.len() as u64;
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len())))
        .collect();

    let mut loaded = 0u64;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        loaded += chunk.len() as u64;
        tracker
            .lock()
            .report(UploadProgress::from_bytes(loaded, total));
        Ok::<Bytes, std::io::Error>(chunk)
    });

    reqwest::Body::wrap_stream(stream)
}

#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: Url,
}

impl RestClient {
    pub fn new(config: &ClassifierApiConfig) -> Result<Self, ClientError> {
        let base_url = config.get_base_url().map_err(ClientError::Configuration)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.get_timeout())
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        tracing::info!(
            "Classification API at {} with timeout {:?}",
            base_url,
            config.get_timeout()
        );

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn check_status(response: Response) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let detail = response
            .json::<ServiceErrorBody>()
            .await
            .ok()
            .and_then(|body| body.detail)
            .and_then(|detail| match detail {
                serde_json::Value::String(message) if !message.trim().is_empty() => Some(message),
                _ => None,
            });

        Err(ClientError::Service {
            status_code: status.as_u16(),
            detail,
        })
    }
}

#[async_trait]
impl ClassifierApi for RestClient {
    #[instrument(skip(self, image, on_progress), fields(name = %image.name))]
    async fn submit(
        &self,
        image: &SelectedImage,
        model: ModelSelector,
        on_progress: Option<ProgressSender>,
    ) -> Result<Submission, ClientError> {
        let bytes = image
            .read()
            .await
            .map_err(|e| ClientError::InvalidInput(format!("Failed to read {}: {}", image.name, e)))?;
        let length = bytes.len() as u64;

        let tracker = Arc::new(Mutex::new(ProgressTracker::new(on_progress)));
        tracker.lock().report(UploadProgress::ZERO);

        let part = Part::stream_with_length(progress_body(bytes, tracker.clone()), length)
            .file_name(image.name.clone())
            .mime_str(image.media_type.trim())
            .map_err(|e| ClientError::InvalidInput(format!("Invalid media type: {}", e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint(&["classify"]))
            .query(&[("model_type", model.as_str())])
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check_status(response).await?;
        let body: ClassifyResponse = response.json().await.map_err(transport_error)?;

        if body.filename.trim().is_empty() {
            return Err(ClientError::InvalidResponse(
                "classification response has an empty filename".into(),
            ));
        }

        tracker.lock().complete();
        tracing::info!("Uploaded {} ({} bytes) as {}", image.name, length, body.filename);

        Ok(Submission {
            identifier: body.filename,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_results(
        &self,
        identifier: &str,
        model: ModelSelector,
    ) -> Result<ClassificationRecord, ClientError> {
        let response = self
            .client
            .get(self.endpoint(&["results", identifier]))
            .query(&[("model_type", model.as_str())])
            .send()
            .await
            .map_err(transport_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(identifier.to_string()));
        }
        let response = Self::check_status(response).await?;
        let body: ResultsResponse = response.json().await.map_err(transport_error)?;

        let results = body
            .results
            .ok_or_else(|| ClientError::NotFound(identifier.to_string()))?;
        tracing::debug!("Fetched {} labels for {}", results.len(), identifier);

        Ok(ClassificationRecord {
            identifier: identifier.to_string(),
            results,
            timestamp: body.timestamp,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_history(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        let response = self
            .client
            .get(self.endpoint(&["history"]))
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::check_status(response).await?;
        let body: HistoryResponse = response.json().await.map_err(transport_error)?;

        tracing::debug!("Fetched {} history entries", body.history.len());
        Ok(body.history)
    }
}
