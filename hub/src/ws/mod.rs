//! WebSocket endpoint: client action dispatch and the bus-to-broker
//! broadcaster.

pub mod broker;
pub mod messages;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::StreamExt;
use futures::SinkExt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use cast_core::time::now_ms;

use self::broker::ClientQueue;
use self::messages::{ClientMessage, ServerMessage};
use crate::ingest::SyncEvent;
use crate::state::AppState;

/// Upgrade handler for `/ws/updates`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (id, queue) = state.broker.register();
    info!(conn = id, "websocket client connected");

    queue.push(
        ServerMessage::Connected {
            message: "connected to candlecast updates".to_string(),
            timestamp: now_ms(),
        }
        .json(),
    );

    // Writer: drain this connection's queue onto the socket.
    let writer_queue = queue.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = writer_queue.pop().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_text(&state, id, &queue, &text),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // binary/ping/pong frames are ignored
                Some(Err(e)) => {
                    debug!(conn = id, "websocket receive error: {e}");
                    break;
                }
            },
            _ = &mut writer => break,
        }
    }

    state.broker.unregister(id);
    writer.abort();
    info!(conn = id, dropped = queue.dropped(), "websocket client disconnected");
}

fn handle_client_text(state: &Arc<AppState>, id: u64, queue: &Arc<ClientQueue>, text: &str) {
    let reply = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { symbols }) => {
            if symbols.is_empty() {
                ServerMessage::error("at least one symbol is required", now_ms())
            } else {
                let symbols = state.broker.subscribe(id, &symbols);
                debug!(conn = id, ?symbols, "subscribed");
                ServerMessage::Subscribed {
                    symbols,
                    timestamp: now_ms(),
                }
            }
        }
        Ok(ClientMessage::Unsubscribe { symbols }) => {
            if symbols.is_empty() {
                ServerMessage::error("at least one symbol is required", now_ms())
            } else {
                let symbols = state.broker.unsubscribe(id, &symbols);
                ServerMessage::Unsubscribed {
                    symbols,
                    timestamp: now_ms(),
                }
            }
        }
        Ok(ClientMessage::Ping) => ServerMessage::Pong { timestamp: now_ms() },
        Ok(ClientMessage::Stats) => ServerMessage::Stats {
            data: state.broker.stats(),
            timestamp: now_ms(),
        },
        Err(_) => ServerMessage::error(describe_bad_frame(text), now_ms()),
    };
    queue.push(reply.json());
}

/// A malformed frame keeps the connection open; the error message
/// distinguishes unknown actions from plain junk.
fn describe_bad_frame(text: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) => match value.get("action").and_then(|a| a.as_str()) {
            Some(action) => format!("unknown action: {action}"),
            None => "message has no action field".to_string(),
        },
        Err(_) => "message is not valid JSON".to_string(),
    }
}

/// Single consumer of the sync bus: serialize each event once and
/// fan it out through the per-symbol index.
pub fn spawn_broadcaster(
    state: Arc<AppState>,
    mut bus: broadcast::Receiver<SyncEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = bus.recv() => match event {
                    Ok(event) => {
                        let frame = ServerMessage::sync_complete(&event, now_ms()).json();
                        let reached = state.broker.broadcast_to_symbol(&event.symbol, &frame);
                        debug!(symbol = %event.symbol, reached, "sync event broadcast");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "broadcaster lagged behind the sync bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        info!("broadcaster stopped");
    })
}
