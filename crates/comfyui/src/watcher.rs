//! Completion watching: push first, pull once.
//!
//! The watcher listens on the session's WebSocket for the target node's
//! `executed` event. If the channel cannot be opened, fails, closes, or
//! stays quiet past the listen ceiling, it closes the channel, waits a
//! short settle delay and asks the history endpoint exactly once.
//!
//! ```text
//! Connecting ──ok──▶ Listening ──matching event──▶ Resolved
//!     │                  │
//!     │ connect error    │ timeout / channel error
//!     ▼                  ▼
//!  TimedOut ◀────────────┘
//!     │ close channel, settle delay
//!     ▼
//!  Polling ──output present──▶ Resolved
//!     │
//!     └──absent / transport error──▶ Failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use clipgen_core::artifact::{ArtifactExtractor, ResolvedArtifact};
use clipgen_core::error::CoreError;
use serde_json::Value;
use tokio::time::Instant;

use crate::api::EngineApi;
use crate::client::{EventChannel, EventConnector};
use crate::events::{ChannelError, CompletionEvent};
use crate::submitter::JobHandle;

/// Default ceiling on waiting for a push event.
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(300);

/// Default pause between giving up on push and polling history.
pub const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(1);

/// Timing knobs for [`CompletionWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Measured from entering Listening. Non-matching events do not reset it.
    pub listen_timeout: Duration,
    /// Settle delay before the single history request.
    pub poll_delay: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            listen_timeout: DEFAULT_LISTEN_TIMEOUT,
            poll_delay: DEFAULT_POLL_DELAY,
        }
    }
}

/// A push channel opened for one session, possibly before the job exists.
///
/// Opening before submission means events of fast jobs cannot be missed.
/// A failed open is kept as the reason to go straight to polling.
pub struct Subscription {
    session_id: String,
    channel: Result<Box<dyn EventChannel>, ChannelError>,
}

impl Subscription {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_ok()
    }

    /// Close without waiting, e.g. when submission failed.
    pub async fn close(self) {
        if let Ok(mut channel) = self.channel {
            channel.close().await;
        }
    }
}

/// Why the watcher fell back to polling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
enum FallbackReason {
    #[error("no matching event within {0:?}")]
    ListenTimeout(Duration),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadSource {
    Push,
    Poll,
}

enum WatchState {
    Connecting,
    Listening {
        channel: Box<dyn EventChannel>,
        deadline: Instant,
    },
    TimedOut {
        channel: Option<Box<dyn EventChannel>>,
        reason: FallbackReason,
    },
    Polling,
    Resolved {
        payload: Value,
        via: PayloadSource,
    },
    Failed(CoreError),
}

impl WatchState {
    fn name(&self) -> &'static str {
        match self {
            WatchState::Connecting => "connecting",
            WatchState::Listening { .. } => "listening",
            WatchState::TimedOut { .. } => "timed_out",
            WatchState::Polling => "polling",
            WatchState::Resolved { .. } => "resolved",
            WatchState::Failed(_) => "failed",
        }
    }
}

/// Waits for one job's target node output and extracts the artifact.
pub struct CompletionWatcher {
    connector: Arc<dyn EventConnector>,
    engine: Arc<dyn EngineApi>,
    extractor: ArtifactExtractor,
    config: WatcherConfig,
}

impl CompletionWatcher {
    pub fn new(
        connector: Arc<dyn EventConnector>,
        engine: Arc<dyn EngineApi>,
        extractor: ArtifactExtractor,
        config: WatcherConfig,
    ) -> Self {
        Self {
            connector,
            engine,
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Open the push channel for `session_id`. Never fails: a connect
    /// error is recorded in the subscription.
    pub async fn subscribe(&self, session_id: &str) -> Subscription {
        let channel = match self.connector.open(session_id).await {
            Ok(channel) => Ok(channel),
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    error = %e,
                    "Push channel unavailable, will poll for completion",
                );
                Err(ChannelError::Connect(e.to_string()))
            }
        };
        Subscription {
            session_id: session_id.to_string(),
            channel,
        }
    }

    /// Connect, then wait for the job.
    pub async fn watch(
        &self,
        handle: &JobHandle,
        target_node: &str,
    ) -> Result<ResolvedArtifact, CoreError> {
        self.run(WatchState::Connecting, handle, target_node).await
    }

    /// Wait for the job on an already-opened subscription.
    pub async fn wait(
        &self,
        subscription: Subscription,
        handle: &JobHandle,
        target_node: &str,
    ) -> Result<ResolvedArtifact, CoreError> {
        let initial = self.entered(subscription);
        self.run(initial, handle, target_node).await
    }

    async fn run(
        &self,
        mut state: WatchState,
        handle: &JobHandle,
        target_node: &str,
    ) -> Result<ResolvedArtifact, CoreError> {
        loop {
            tracing::debug!(job_id = %handle.job_id, state = state.name(), "Watcher state");

            state = match state {
                WatchState::Connecting => {
                    let subscription = self.subscribe(&handle.session_id).await;
                    self.entered(subscription)
                }
                WatchState::Listening { channel, deadline } => {
                    self.listen(channel, deadline, handle, target_node).await
                }
                WatchState::TimedOut { channel, reason } => {
                    if let Some(mut channel) = channel {
                        channel.close().await;
                    }
                    tracing::warn!(
                        job_id = %handle.job_id,
                        reason = %reason,
                        "Falling back to history polling",
                    );
                    tokio::time::sleep(self.config.poll_delay).await;
                    WatchState::Polling
                }
                WatchState::Polling => self.poll(handle, target_node).await,
                WatchState::Resolved { payload, via } => {
                    let artifact = self.extractor.extract(&payload)?;
                    tracing::info!(
                        job_id = %handle.job_id,
                        path = %artifact.path,
                        via = ?via,
                        "Artifact resolved",
                    );
                    return Ok(artifact);
                }
                WatchState::Failed(e) => {
                    tracing::error!(job_id = %handle.job_id, error = %e, "Watching failed");
                    return Err(e);
                }
            };
        }
    }

    /// Listening with a fresh deadline, or straight to the fallback.
    fn entered(&self, subscription: Subscription) -> WatchState {
        match subscription.channel {
            Ok(channel) => WatchState::Listening {
                channel,
                deadline: Instant::now() + self.config.listen_timeout,
            },
            Err(e) => WatchState::TimedOut {
                channel: None,
                reason: e.into(),
            },
        }
    }

    async fn listen(
        &self,
        mut channel: Box<dyn EventChannel>,
        deadline: Instant,
        handle: &JobHandle,
        target_node: &str,
    ) -> WatchState {
        loop {
            let next = tokio::time::timeout_at(deadline, channel.next_event()).await;

            match next {
                Err(_) => {
                    return WatchState::TimedOut {
                        channel: Some(channel),
                        reason: FallbackReason::ListenTimeout(self.config.listen_timeout),
                    };
                }
                Ok(CompletionEvent::Executed {
                    node_id,
                    prompt_id,
                    output,
                }) if node_id == target_node
                    && prompt_id.as_deref().map_or(true, |id| id == handle.job_id) =>
                {
                    channel.close().await;
                    return WatchState::Resolved {
                        payload: output,
                        via: PayloadSource::Push,
                    };
                }
                Ok(CompletionEvent::Executed { node_id, .. }) => {
                    tracing::trace!(job_id = %handle.job_id, node_id = %node_id, "Ignoring executed event");
                }
                Ok(CompletionEvent::Progress { value, max }) => {
                    tracing::trace!(job_id = %handle.job_id, value, max, "Progress");
                }
                Ok(CompletionEvent::Ignored) => {}
                Ok(CompletionEvent::ChannelError(e)) => {
                    return WatchState::TimedOut {
                        channel: Some(channel),
                        reason: e.into(),
                    };
                }
            }
        }
    }

    async fn poll(&self, handle: &JobHandle, target_node: &str) -> WatchState {
        let history = match self.engine.get_history(&handle.job_id).await {
            Ok(history) => history,
            Err(e) => return WatchState::Failed(CoreError::PollFailed(e.to_string())),
        };

        match history_output(&history, &handle.job_id, target_node) {
            Some(payload) => WatchState::Resolved {
                payload: payload.clone(),
                via: PayloadSource::Poll,
            },
            None => WatchState::Failed(CoreError::ArtifactNotProduced {
                job_id: handle.job_id.clone(),
                node_id: target_node.to_string(),
            }),
        }
    }
}

/// The output of `node_id` in a history document, if the job recorded one.
pub fn history_output<'a>(history: &'a Value, job_id: &str, node_id: &str) -> Option<&'a Value> {
    history
        .get(job_id)?
        .get("outputs")?
        .get(node_id)
        .filter(|output| !output.is_null())
}
