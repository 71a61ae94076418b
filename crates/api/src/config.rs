use std::path::PathBuf;
use std::time::Duration;

use clipgen_comfyui::client::derive_urls;
use clipgen_comfyui::orchestrator::OrchestratorConfig;
use clipgen_comfyui::watcher::WatcherConfig;

/// Server configuration loaded from environment variables.
///
/// Everything except the workflow path has a default suitable for a
/// ComfyUI instance running on the same machine.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// ComfyUI address, with or without scheme (default: `127.0.0.1:8188`).
    pub comfyui_url: String,
    /// API-format workflow template.
    pub workflow_path: PathBuf,
    /// Ceiling on waiting for a push event, in seconds (default: `300`).
    pub listen_timeout_secs: u64,
    /// Settle delay before polling history, in milliseconds (default: `1000`).
    pub poll_delay_ms: u64,
    /// HTTP request timeout in seconds (default: `900`).
    pub request_timeout_secs: u64,
    /// Limit on each upload, submit or history call to ComfyUI, in seconds
    /// (default: `60`).
    pub engine_timeout_secs: u64,
}

/// Invalid or missing configuration. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default          |
    /// |----------------------------|------------------|
    /// | `HOST`                     | `0.0.0.0`        |
    /// | `PORT`                     | `8000`           |
    /// | `COMFYUI_URL`              | `127.0.0.1:8188` |
    /// | `WORKFLOW_PATH`            | (required)       |
    /// | `LISTEN_TIMEOUT_SECS`      | `300`            |
    /// | `POLL_DELAY_MS`            | `1000`           |
    /// | `REQUEST_TIMEOUT_SECS`     | `900`            |
    /// | `ENGINE_HTTP_TIMEOUT_SECS` | `60`             |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "PORT", 8000u16, "a valid u16")?;
        let comfyui_url = lookup("COMFYUI_URL").unwrap_or_else(|| "127.0.0.1:8188".into());

        let workflow_path = lookup("WORKFLOW_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .ok_or(ConfigError::Missing("WORKFLOW_PATH"))?;

        let listen_timeout_secs = parse_or(&lookup, "LISTEN_TIMEOUT_SECS", 300u64, "a valid u64")?;
        let poll_delay_ms = parse_or(&lookup, "POLL_DELAY_MS", 1000u64, "a valid u64")?;
        let request_timeout_secs =
            parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 900u64, "a valid u64")?;
        let engine_timeout_secs =
            parse_or(&lookup, "ENGINE_HTTP_TIMEOUT_SECS", 60u64, "a valid u64")?;

        Ok(Self {
            host,
            port,
            comfyui_url,
            workflow_path,
            listen_timeout_secs,
            poll_delay_ms,
            request_timeout_secs,
            engine_timeout_secs,
        })
    }

    /// HTTP and WebSocket base URLs of the ComfyUI instance.
    pub fn engine_urls(&self) -> (String, String) {
        derive_urls(&self.comfyui_url)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            listen_timeout: Duration::from_secs(self.listen_timeout_secs),
            poll_delay: Duration::from_millis(self.poll_delay_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            watcher: self.watcher_config(),
            engine_timeout: Duration::from_secs(self.engine_timeout_secs),
            ..OrchestratorConfig::default()
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        }),
    }
}
