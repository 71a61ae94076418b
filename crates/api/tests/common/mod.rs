use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use clipgen_api::config::ServerConfig;
use clipgen_api::state::AppState;
use clipgen_comfyui::api::{ComfyUIApiError, EngineApi, SubmitResponse, UploadImage};
use clipgen_comfyui::client::{ComfyUIClientError, EventChannel, EventConnector};
use clipgen_comfyui::orchestrator::GenerationOrchestrator;
use clipgen_core::workflow::{WorkflowGraph, WorkflowTemplate};

pub const JOB_ID: &str = "job-42";
pub const BOUNDARY: &str = "clipgen-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        comfyui_url: "127.0.0.1:1".to_string(),
        workflow_path: PathBuf::from("workflow.json"),
        listen_timeout_secs: 1,
        poll_delay_ms: 1,
        request_timeout_secs: 30,
        engine_timeout_secs: 5,
    }
}

/// Template in API format with every default slot title.
pub fn complete_template() -> Value {
    json!({
        "3": { "class_type": "KSampler", "inputs": { "seed": 0 } },
        "6": { "class_type": "CLIPTextEncode", "inputs": { "text": "" }, "_meta": { "title": "positive_prompt" } },
        "7": { "class_type": "CLIPTextEncode", "inputs": { "text": "" }, "_meta": { "title": "negative_prompt" } },
        "10": { "class_type": "LoadImage", "inputs": { "image": "x.png" }, "_meta": { "title": "load_image" } },
        "60": { "class_type": "ShowText|pysssss", "inputs": {}, "_meta": { "title": "output_paths" } }
    })
}

/// Engine stub: accepts uploads and submissions, answers history with
/// the given document.
pub struct StubEngine {
    history: Value,
    reject_submit: bool,
    pub submitted: Mutex<Vec<WorkflowGraph>>,
}

impl StubEngine {
    /// History holding `paths` as the output of node 60.
    pub fn producing(paths: &[&str]) -> Self {
        let serialized = json!([true, paths]).to_string();
        Self {
            history: json!({ JOB_ID: { "outputs": { "60": { "text": [serialized] } } } }),
            reject_submit: false,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_submit() -> Self {
        Self {
            reject_submit: true,
            ..Self::producing(&[])
        }
    }
}

#[async_trait]
impl EngineApi for StubEngine {
    async fn upload_image(&self, image: UploadImage) -> Result<String, ComfyUIApiError> {
        Ok(format!("uploaded_{}", image.filename))
    }

    async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
        _client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        if self.reject_submit {
            return Err(ComfyUIApiError::ApiError {
                status: 400,
                body: "invalid prompt".to_string(),
            });
        }
        self.submitted.lock().unwrap().push(workflow.clone());
        Ok(SubmitResponse {
            prompt_id: JOB_ID.to_string(),
            number: 1,
        })
    }

    async fn get_history(&self, _prompt_id: &str) -> Result<Value, ComfyUIApiError> {
        Ok(self.history.clone())
    }
}

/// Connector whose push channel can never be opened, so every job
/// resolves through the history endpoint.
pub struct NoPushChannel;

#[async_trait]
impl EventConnector for NoPushChannel {
    async fn open(&self, _session_id: &str) -> Result<Box<dyn EventChannel>, ComfyUIClientError> {
        Err(ComfyUIClientError::Connection("push channel disabled".to_string()))
    }
}

/// Build the full application router around a stub engine.
pub fn build_test_app(template: Value, engine: Arc<StubEngine>) -> Router {
    let config = test_config();
    let orchestrator = GenerationOrchestrator::new(
        WorkflowTemplate::from_json(&template).unwrap(),
        engine,
        Arc::new(NoPushChannel),
        config.orchestrator_config(),
    );

    clipgen_api::build_app(AppState {
        config: Arc::new(config),
        orchestrator: Arc::new(orchestrator),
    })
}

/// One multipart part: `(name, filename, content)`.
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

/// Encode parts as a `multipart/form-data` body using [`BOUNDARY`].
pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// POST a multipart form.
pub async fn post_multipart(app: Router, uri: &str, parts: &[Part<'_>]) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Issue a GET request.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
