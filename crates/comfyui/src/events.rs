//! Completion events observed on the push channel.
//!
//! Raw WebSocket frames are reduced to the handful of outcomes the
//! completion watcher distinguishes. Anything it does not act on becomes
//! [`CompletionEvent::Ignored`].

use crate::messages::{parse_frame, EngineFrame};

/// One observation from the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum CompletionEvent {
    /// A node finished and reported its output.
    Executed {
        node_id: String,
        prompt_id: Option<String>,
        output: serde_json::Value,
    },
    /// Step progress inside a node. Never acted upon.
    Progress { value: i32, max: i32 },
    /// Any other frame, including ones that failed to parse.
    Ignored,
    /// The channel itself failed; no further events will arrive.
    ChannelError(ChannelError),
}

/// Push-channel failures. Always recovered by polling, never surfaced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The WebSocket handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A receive error on an established connection.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server closed the connection or the stream ended.
    #[error("channel closed")]
    Closed,
}

impl CompletionEvent {
    /// Interpret one WebSocket text frame.
    pub fn from_text(text: &str) -> Self {
        match parse_frame(text) {
            Ok(frame) => frame.into(),
            Err(e) => {
                tracing::trace!(error = %e, raw_message = %text, "Skipping unrecognised ComfyUI message");
                CompletionEvent::Ignored
            }
        }
    }
}

impl From<EngineFrame> for CompletionEvent {
    fn from(frame: EngineFrame) -> Self {
        match frame {
            EngineFrame::Executed(data) => CompletionEvent::Executed {
                node_id: data.node,
                prompt_id: data.prompt_id,
                output: data.output,
            },
            EngineFrame::Progress(data) => CompletionEvent::Progress {
                value: data.value,
                max: data.max,
            },
            EngineFrame::ExecutionError(data) => {
                tracing::warn!(
                    prompt_id = ?data.prompt_id,
                    node_id = ?data.node_id,
                    error_type = %data.exception_type,
                    error_message = %data.exception_message,
                    "ComfyUI reported an execution error",
                );
                CompletionEvent::Ignored
            }
            EngineFrame::Other(kind) => {
                tracing::trace!(kind = %kind, "Ignoring ComfyUI frame");
                CompletionEvent::Ignored
            }
        }
    }
}
