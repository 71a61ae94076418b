//! End-to-end generation: template to artifact.
//!
//! [`GenerationOrchestrator`] is created once at startup and shared across
//! requests. Every call to [`generate`](GenerationOrchestrator::generate)
//! works on its own graph copy, session ID and push channel.

use std::sync::Arc;
use std::time::Duration;

use clipgen_core::artifact::{ArtifactExtractor, ResolvedArtifact};
use clipgen_core::error::CoreError;
use clipgen_core::injection::{InjectionParams, ParameterInjector, ResolvedSlots, SlotTitles};
use clipgen_core::request::{ImageSource, JobRequest};
use clipgen_core::workflow::{WorkflowGraph, WorkflowTemplate};

use crate::api::{ComfyUIApi, ComfyUIApiError, EngineApi, UploadImage};
use crate::client::{ComfyUIClient, EventConnector};
use crate::submitter::{new_session_id, JobSubmitter};
use crate::watcher::{CompletionWatcher, WatcherConfig};

/// Default per-request limit for upload, submit and history calls.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(60);

/// Tunables for one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub titles: SlotTitles,
    pub watcher: WatcherConfig,
    pub extractor: ArtifactExtractor,
    /// Applied to every REST call by [`GenerationOrchestrator::for_comfyui`].
    pub engine_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            titles: SlotTitles::default(),
            watcher: WatcherConfig::default(),
            extractor: ArtifactExtractor::default(),
            engine_timeout: DEFAULT_ENGINE_TIMEOUT,
        }
    }
}

/// Composes slot resolution, upload, injection, submission and watching.
pub struct GenerationOrchestrator {
    template: Arc<WorkflowTemplate>,
    injector: ParameterInjector,
    engine: Arc<dyn EngineApi>,
    submitter: JobSubmitter,
    watcher: CompletionWatcher,
}

impl GenerationOrchestrator {
    pub fn new(
        template: WorkflowTemplate,
        engine: Arc<dyn EngineApi>,
        connector: Arc<dyn EventConnector>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            template: Arc::new(template),
            injector: ParameterInjector::new(config.titles),
            submitter: JobSubmitter::new(Arc::clone(&engine)),
            watcher: CompletionWatcher::new(
                connector,
                Arc::clone(&engine),
                config.extractor,
                config.watcher,
            ),
            engine,
        }
    }

    /// Orchestrator talking to a real ComfyUI instance.
    ///
    /// * `api_url` - HTTP base URL, e.g. `http://host:8188`.
    /// * `ws_url`  - WebSocket base URL, e.g. `ws://host:8188`.
    ///
    /// Fails only if the HTTP client cannot be built.
    pub fn for_comfyui(
        template: WorkflowTemplate,
        api_url: String,
        ws_url: String,
        config: OrchestratorConfig,
    ) -> Result<Self, ComfyUIApiError> {
        let api = ComfyUIApi::with_timeout(api_url, config.engine_timeout)?;
        Ok(Self::new(
            template,
            Arc::new(api),
            Arc::new(ComfyUIClient::new(ws_url)),
            config,
        ))
    }

    pub fn template(&self) -> &WorkflowTemplate {
        &self.template
    }

    /// Resolve the slots of the loaded template without touching the engine.
    pub fn check_template(&self) -> Result<ResolvedSlots, CoreError> {
        self.injector.resolve(&WorkflowGraph::load(&self.template))
    }

    /// Run one request to completion.
    ///
    /// Fails with [`CoreError::IncompleteTemplate`] before any network call
    /// when the template lacks a required slot.
    pub async fn generate(&self, request: JobRequest) -> Result<ResolvedArtifact, CoreError> {
        let mut graph = WorkflowGraph::load(&self.template);
        let slots = self.injector.resolve(&graph)?;

        let image_ref = self.upload(request.image).await?;

        let seed = self.injector.inject(
            &mut graph,
            &slots,
            InjectionParams {
                image_ref: &image_ref,
                positive_prompt: &request.prompt,
                negative_prompt: &request.negative_prompt,
            },
        )?;

        let session_id = new_session_id();
        let subscription = self.watcher.subscribe(&session_id).await;

        let handle = match self.submitter.submit(&graph, &session_id).await {
            Ok(handle) => handle,
            Err(e) => {
                subscription.close().await;
                return Err(e);
            }
        };

        tracing::info!(
            job_id = %handle.job_id,
            session_id = %session_id,
            image = %image_ref,
            seed = ?seed,
            output_node = %slots.output,
            "Generation job queued",
        );

        self.watcher.wait(subscription, &handle, &slots.output).await
    }

    async fn upload(&self, image: ImageSource) -> Result<String, CoreError> {
        let upload = match image {
            ImageSource::Uploaded(name) => return Ok(name),
            ImageSource::Bytes {
                filename,
                content_type,
                data,
            } => UploadImage {
                filename,
                content_type,
                data,
            },
            ImageSource::Base64(encoded) => UploadImage::from_base64(&encoded)
                .map_err(|e| CoreError::UploadFailed(e.to_string()))?,
        };

        let size = upload.data.len();
        let name = self
            .engine
            .upload_image(upload)
            .await
            .map_err(|e| CoreError::UploadFailed(e.to_string()))?;

        tracing::debug!(name = %name, size, "Reference image uploaded");
        Ok(name)
    }
}
