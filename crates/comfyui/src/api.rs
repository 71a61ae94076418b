//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps workflow submission, history retrieval and image upload using
//! [`reqwest`]. The [`EngineApi`] trait is the seam the orchestrator and
//! watcher depend on, so they can run against an in-memory engine in tests.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine as _;
use clipgen_core::workflow::WorkflowGraph;
use serde::{Deserialize, Serialize};

/// Standard alphabet, padding optional.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &base64::alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: i32,
}

/// Response returned by `/upload/image`.
#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    /// Stored file name, usable as a `LoadImage` input value.
    pub name: String,
    #[serde(default)]
    pub subfolder: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// An image ready to be sent to `/upload/image`.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadImage {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadImage {
    /// Decode a base64 image. A `data:<mime>;base64,` prefix is accepted
    /// and its MIME type used; otherwise the image is sent as PNG.
    /// Line breaks and missing padding are tolerated.
    pub fn from_base64(encoded: &str) -> Result<Self, ComfyUIApiError> {
        let trimmed = encoded.trim();
        let (content_type, payload) = match trimmed.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    ComfyUIApiError::InvalidImage("data URL has no ',' separator".to_string())
                })?;
                let mime = header.strip_suffix(";base64").unwrap_or(header);
                (mime.to_string(), payload)
            }
            None => ("image/png".to_string(), trimmed),
        };

        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let data = LENIENT_BASE64
            .decode(compact)
            .map_err(|e| ComfyUIApiError::InvalidImage(format!("invalid base64 image: {e}")))?;

        let extension = content_type.rsplit('/').next().unwrap_or("png");
        Ok(Self {
            filename: format!("image.{extension}"),
            content_type,
            data,
        })
    }
}

#[derive(Serialize)]
struct SubmitRequest<'a> {
    prompt: &'a WorkflowGraph,
    client_id: &'a str,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, body decoding).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The image handed to the upload call could not be decoded.
    #[error("Invalid image: {0}")]
    InvalidImage(String),
}

/// Engine operations consumed by the orchestrator.
#[async_trait]
pub trait EngineApi: Send + Sync {
    /// Upload a reference image; returns the name to put into the graph.
    async fn upload_image(&self, image: UploadImage) -> Result<String, ComfyUIApiError>;

    /// Queue a workflow under the given client (session) id.
    async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError>;

    /// Fetch the history entry of one prompt.
    async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError>;
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8188`.
    pub fn new(api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }

    /// Create an API client whose requests each give up after `timeout`.
    pub fn with_timeout(api_url: String, timeout: Duration) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (connection pooling and timeouts are configured by the caller).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow and client
    /// ID. Returns the server-assigned `prompt_id` and queue position.
    pub async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = SubmitRequest {
            prompt: workflow,
            client_id,
        };

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The returned JSON maps
    /// the prompt ID to its `outputs` keyed by node ID; an unknown prompt
    /// yields an empty object.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Upload an image via `POST /upload/image` (multipart, overwriting any
    /// file of the same name). Returns the stored name.
    pub async fn upload_image(&self, image: UploadImage) -> Result<String, ComfyUIApiError> {
        let part = reqwest::multipart::Part::bytes(image.data)
            .file_name(image.filename)
            .mime_str(&image.content_type)?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let response = self
            .client
            .post(format!("{}/upload/image", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let uploaded: UploadResponse = Self::parse_response(response).await?;
        tracing::debug!(
            name = %uploaded.name,
            subfolder = %uploaded.subfolder,
            kind = %uploaded.kind,
            "Image uploaded to ComfyUI",
        );
        Ok(uploaded.name)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl EngineApi for ComfyUIApi {
    async fn upload_image(&self, image: UploadImage) -> Result<String, ComfyUIApiError> {
        ComfyUIApi::upload_image(self, image).await
    }

    async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        ComfyUIApi::submit_workflow(self, workflow, client_id).await
    }

    async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        ComfyUIApi::get_history(self, prompt_id).await
    }
}
