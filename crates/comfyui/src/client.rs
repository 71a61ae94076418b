//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the WebSocket base URL. Call
//! [`ComfyUIClient::connect`] to open a live [`ComfyUIConnection`] scoped
//! to one session ID. The [`EventConnector`] and [`EventChannel`] traits
//! are what the completion watcher consumes, so it never sees raw frames.

use async_trait::async_trait;
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};

use crate::events::{ChannelError, CompletionEvent};

/// Configuration handle for a ComfyUI WebSocket endpoint.
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
pub struct ComfyUIConnection {
    /// Session ID sent during the handshake. The engine routes events for
    /// jobs submitted with the same ID to this connection.
    pub client_id: String,
    /// The raw WebSocket stream for reading/writing frames.
    pub ws_stream: tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

/// Opens push channels for a session.
#[async_trait]
pub trait EventConnector: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<Box<dyn EventChannel>, ComfyUIClientError>;
}

/// A session-scoped stream of completion events.
///
/// After a [`CompletionEvent::ChannelError`] the channel is finished and
/// must not be read again.
#[async_trait]
pub trait EventChannel: Send {
    /// Wait for the next event. Cancel-safe only between frames.
    async fn next_event(&mut self) -> CompletionEvent;

    /// Close the channel. Idempotent.
    async fn close(&mut self);
}

impl ComfyUIClient {
    /// Create a client for a WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: String) -> Self {
        Self {
            ws_url: ws_url.trim_end_matches('/').to_string(),
        }
    }

    /// WebSocket base URL (e.g. `ws://host:8188`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Connect to the ComfyUI WebSocket endpoint under `client_id`.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = format!("{}/ws?clientId={}", self.ws_url, client_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(client_id = %client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

#[async_trait]
impl EventConnector for ComfyUIClient {
    async fn open(&self, session_id: &str) -> Result<Box<dyn EventChannel>, ComfyUIClientError> {
        let connection = self.connect(session_id).await?;
        Ok(Box::new(connection))
    }
}

#[async_trait]
impl EventChannel for ComfyUIConnection {
    async fn next_event(&mut self) -> CompletionEvent {
        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => return CompletionEvent::from_text(&text),
                Some(Ok(Message::Close(frame))) => {
                    tracing::debug!(client_id = %self.client_id, ?frame, "ComfyUI closed the WebSocket");
                    return CompletionEvent::ChannelError(ChannelError::Closed);
                }
                // Binary frames carry preview images; pings are answered by tungstenite.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return CompletionEvent::ChannelError(ChannelError::Transport(e.to_string()))
                }
                None => return CompletionEvent::ChannelError(ChannelError::Closed),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::trace!(client_id = %self.client_id, error = %e, "WebSocket close was not clean");
        }
    }
}

/// Derive the HTTP and WebSocket base URLs from one engine address.
///
/// Accepts a bare `host:port` (plain HTTP) or any of the `http`, `https`,
/// `ws` and `wss` schemes. Secure schemes map to secure schemes.
pub fn derive_urls(address: &str) -> (String, String) {
    let address = address.trim().trim_end_matches('/');
    let (secure, host) = if let Some(rest) = address.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = address.strip_prefix("wss://") {
        (true, rest)
    } else if let Some(rest) = address.strip_prefix("http://") {
        (false, rest)
    } else if let Some(rest) = address.strip_prefix("ws://") {
        (false, rest)
    } else {
        (false, address)
    };

    if secure {
        (format!("https://{host}"), format!("wss://{host}"))
    } else {
        (format!("http://{host}"), format!("ws://{host}"))
    }
}

/// Errors that can occur when working with the WebSocket client.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the initial WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),
}
