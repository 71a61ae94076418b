//! In-memory engine and push channel for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipgen_core::workflow::{NodeDescriptor, WorkflowGraph};
use serde_json::{json, Value};

use crate::api::{ComfyUIApiError, EngineApi, SubmitResponse, UploadImage};
use crate::client::{ComfyUIClientError, EventChannel, EventConnector};
use crate::events::{ChannelError, CompletionEvent};

pub const OUTPUT_NODE: &str = "60";

/// Graph with every default slot title, a sampler and an unrelated node.
pub fn sample_graph() -> WorkflowGraph {
    let mut graph = WorkflowGraph::default();
    graph.insert(
        "3",
        NodeDescriptor::new("KSampler")
            .with_input("seed", 0)
            .with_input("steps", 20),
    );
    graph.insert("4", NodeDescriptor::new("CheckpointLoaderSimple"));
    graph.insert(
        "6",
        NodeDescriptor::new("CLIPTextEncode")
            .with_title("positive_prompt")
            .with_input("text", ""),
    );
    graph.insert(
        "7",
        NodeDescriptor::new("CLIPTextEncode")
            .with_title("negative_prompt")
            .with_input("text", ""),
    );
    graph.insert(
        "10",
        NodeDescriptor::new("LoadImage")
            .with_title("load_image")
            .with_input("image", "placeholder.png"),
    );
    graph.insert(
        OUTPUT_NODE,
        NodeDescriptor::new("ShowText|pysssss").with_title("output_paths"),
    );
    graph
}

/// Output payload in the shape the path-reporting node emits.
pub fn output_payload(paths: &[&str]) -> Value {
    let serialized = json!([true, paths]).to_string();
    json!({ "text": [serialized] })
}

/// History document holding `payload` for one node of one job.
pub fn history_with(job_id: &str, node_id: &str, payload: Value) -> Value {
    json!({ job_id: { "outputs": { node_id: payload } } })
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeEngine {
    history: Option<Value>,
    fail_submit: bool,
    fail_upload: bool,
    fail_history: bool,
    uploads: Mutex<Vec<UploadImage>>,
    submitted: Mutex<Vec<(WorkflowGraph, String)>>,
    history_calls: AtomicUsize,
}

impl FakeEngine {
    pub const JOB_ID: &'static str = "job-1";
    pub const UPLOADED_NAME: &'static str = "uploaded_ref.png";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, history: Value) -> Self {
        self.history = Some(history);
        self
    }

    pub fn failing_submit(mut self) -> Self {
        self.fail_submit = true;
        self
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn failing_history(mut self) -> Self {
        self.fail_history = true;
        self
    }

    pub fn uploads(&self) -> Vec<UploadImage> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<(WorkflowGraph, String)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    /// True when no engine endpoint has been touched.
    pub fn untouched(&self) -> bool {
        self.uploads().is_empty() && self.submitted().is_empty() && self.history_calls() == 0
    }
}

fn unavailable() -> ComfyUIApiError {
    ComfyUIApiError::ApiError {
        status: 500,
        body: "engine unavailable".to_string(),
    }
}

#[async_trait]
impl EngineApi for FakeEngine {
    async fn upload_image(&self, image: UploadImage) -> Result<String, ComfyUIApiError> {
        self.uploads.lock().unwrap().push(image);
        if self.fail_upload {
            return Err(unavailable());
        }
        Ok(Self::UPLOADED_NAME.to_string())
    }

    async fn submit_workflow(
        &self,
        workflow: &WorkflowGraph,
        client_id: &str,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        self.submitted
            .lock()
            .unwrap()
            .push((workflow.clone(), client_id.to_string()));
        if self.fail_submit {
            return Err(unavailable());
        }
        Ok(SubmitResponse {
            prompt_id: Self::JOB_ID.to_string(),
            number: 0,
        })
    }

    async fn get_history(&self, _prompt_id: &str) -> Result<Value, ComfyUIApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_history {
            return Err(unavailable());
        }
        Ok(self.history.clone().unwrap_or_else(|| json!({})))
    }
}

// ---------------------------------------------------------------------------
// Push channel
// ---------------------------------------------------------------------------

/// What a fake channel does once its scripted events are exhausted.
#[derive(Debug, Clone)]
pub enum AfterScript {
    /// Never yield another event.
    Hang,
    /// Report that the server closed the connection.
    Close,
    /// Yield `event` again every `every`, forever.
    Repeat {
        every: Duration,
        event: CompletionEvent,
    },
}

pub struct FakeConnector {
    script: Vec<CompletionEvent>,
    after: AfterScript,
    fail_connect: bool,
    sessions: Mutex<Vec<String>>,
    closed: Arc<AtomicUsize>,
}

impl FakeConnector {
    /// Every opened channel replays `script`, then behaves per `after`.
    pub fn scripted(script: Vec<CompletionEvent>, after: AfterScript) -> Self {
        Self {
            script,
            after,
            fail_connect: false,
            sessions: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn silent() -> Self {
        Self::scripted(Vec::new(), AfterScript::Hang)
    }

    pub fn refusing() -> Self {
        Self {
            fail_connect: true,
            ..Self::silent()
        }
    }

    /// Session IDs of every open attempt, in order.
    pub fn sessions(&self) -> Vec<String> {
        self.sessions.lock().unwrap().clone()
    }

    /// Number of channels that have been closed.
    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventConnector for FakeConnector {
    async fn open(&self, session_id: &str) -> Result<Box<dyn EventChannel>, ComfyUIClientError> {
        self.sessions.lock().unwrap().push(session_id.to_string());
        if self.fail_connect {
            return Err(ComfyUIClientError::Connection("connection refused".to_string()));
        }
        Ok(Box::new(FakeChannel {
            events: self.script.iter().cloned().collect(),
            after: self.after.clone(),
            closed: AtomicBool::new(false),
            closed_count: Arc::clone(&self.closed),
        }))
    }
}

struct FakeChannel {
    events: VecDeque<CompletionEvent>,
    after: AfterScript,
    closed: AtomicBool,
    closed_count: Arc<AtomicUsize>,
}

#[async_trait]
impl EventChannel for FakeChannel {
    async fn next_event(&mut self) -> CompletionEvent {
        if let Some(event) = self.events.pop_front() {
            return event;
        }
        match &self.after {
            AfterScript::Hang => std::future::pending().await,
            AfterScript::Close => CompletionEvent::ChannelError(ChannelError::Closed),
            AfterScript::Repeat { every, event } => {
                tokio::time::sleep(*every).await;
                event.clone()
            }
        }
    }

    async fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closed_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
