use std::sync::Arc;

use clipgen_comfyui::orchestrator::GenerationOrchestrator;

use crate::config::ServerConfig;

/// Shared application state available to all handlers.
///
/// Cheaply cloneable; the orchestrator is created once at startup and
/// holds no per-request state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub orchestrator: Arc<GenerationOrchestrator>,
}
