//! Shared helpers for the comfyui integration tests.

use futures::SinkExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

/// Accept a single WebSocket client, send `frames`, then close.
///
/// Returns the `ws://` base URL and a receiver yielding the request URI
/// the client connected with.
pub async fn serve_frames(frames: Vec<Message>) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        send_and_close(stream, frames, move |uri| {
            let _ = uri_tx.send(uri);
        })
        .await;
    });

    (format!("ws://{addr}"), uri_rx)
}

/// Accept `clients` WebSocket clients and send every one of them the same
/// `frames`, the way the engine broadcasts to sessions it cannot tell apart.
///
/// The receiver yields each client's request URI.
pub async fn serve_broadcast(
    frames: Vec<Message>,
    clients: usize,
) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (uri_tx, uri_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for _ in 0..clients {
            let (stream, _) = listener.accept().await.unwrap();
            let frames = frames.clone();
            let uri_tx = uri_tx.clone();
            tokio::spawn(send_and_close(stream, frames, move |uri| {
                let _ = uri_tx.send(uri);
            }));
        }
    });

    (format!("ws://{addr}"), uri_rx)
}

async fn send_and_close(
    stream: TcpStream,
    frames: Vec<Message>,
    on_uri: impl FnOnce(String) + Send + Unpin + 'static,
) {
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        on_uri(req.uri().to_string());
        Ok(resp)
    };
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
        .await
        .unwrap();
    for frame in frames {
        if ws.send(frame).await.is_err() {
            return;
        }
    }
    let _ = ws.close(None).await;
}

/// An `executed` frame carrying the given media paths.
pub fn executed_frame(node: &str, prompt_id: &str, paths: &[&str]) -> Message {
    let serialized = serde_json::json!([true, paths]).to_string();
    let frame = serde_json::json!({
        "type": "executed",
        "data": {
            "node": node,
            "prompt_id": prompt_id,
            "output": { "text": [serialized] },
        }
    });
    Message::Text(frame.to_string())
}
