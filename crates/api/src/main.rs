use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipgen_api::config::ServerConfig;
use clipgen_api::state::AppState;
use clipgen_comfyui::orchestrator::GenerationOrchestrator;
use clipgen_core::workflow::WorkflowTemplate;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipgen_api=debug,clipgen_comfyui=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => fail(&e),
    };
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Workflow template ---
    let template = match WorkflowTemplate::from_file(&config.workflow_path) {
        Ok(template) => template,
        Err(e) => fail(&e),
    };
    tracing::info!(
        path = %config.workflow_path.display(),
        nodes = template.node_count(),
        "Workflow template loaded",
    );

    // --- Orchestrator ---
    let (api_url, ws_url) = config.engine_urls();
    tracing::info!(api_url = %api_url, ws_url = %ws_url, "Using ComfyUI instance");

    let orchestrator = match GenerationOrchestrator::for_comfyui(
        template,
        api_url,
        ws_url,
        config.orchestrator_config(),
    ) {
        Ok(orchestrator) => orchestrator,
        Err(e) => fail(&e),
    };

    // Requests against an incomplete template are answered with 404, but
    // the operator should hear about it now.
    if let Err(e) = orchestrator.check_template() {
        tracing::warn!(error = %e, "Workflow template is missing required nodes");
    }

    let addr: SocketAddr = match config.host.parse() {
        Ok(ip) => SocketAddr::new(ip, config.port),
        Err(e) => fail(&format!("Invalid HOST address '{}': {e}", config.host)),
    };

    // --- App state ---
    let state = AppState {
        config: Arc::new(config),
        orchestrator: Arc::new(orchestrator),
    };
    let app = clipgen_api::build_app(state);

    // --- Start server ---
    tracing::info!(%addr, "Starting server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => fail(&format!("Failed to bind to {addr}: {e}")),
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        fail(&format!("Server error: {e}"));
    }

    tracing::info!("Graceful shutdown complete");
}

/// Log a fatal startup error and exit with status 1.
fn fail(error: &dyn std::fmt::Display) -> ! {
    tracing::error!(error = %error, "Startup failed");
    std::process::exit(1);
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
