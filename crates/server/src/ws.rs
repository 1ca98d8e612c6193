//! WebSocket peers.
//!
//! Each connection is one broadcast subscription. The first frame is the
//! `sync` event; after that the peer receives block and transaction events
//! until it disconnects or falls too far behind.

use crate::routes::SharedNode;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use keyto_chain::Subscription;
use tracing::{debug, warn};

pub async fn handler(ws: WebSocketUpgrade, State(node): State<SharedNode>) -> Response {
    ws.on_upgrade(move |socket| peer_session(socket, node))
}

async fn peer_session(mut socket: WebSocket, node: SharedNode) {
    let Subscription { id, mut receiver } = node.subscribe();

    loop {
        tokio::select! {
            event = receiver.recv() => {
                let Some(event) = event else {
                    debug!(peer = id, "Event stream closed");
                    break;
                };
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(peer = id, error = %e, "Failed to encode event");
                        continue;
                    }
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Peers only listen.
                Some(Ok(_)) => {}
            },
        }
    }

    node.unsubscribe(id);
    let _ = socket.close().await;
}
