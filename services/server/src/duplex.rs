//! The duplex connection handler (§4.6 Hub, §4.7 Client, §6.1 wire protocol):
//! accepts the WebSocket upgrade, binds a `Client` to the `Hub`, hydrates it
//! from `ClientStateStore` on session-token recovery, and drives the
//! read-pump/write-pump pair described in §5.
//!
//! Grounded on the teacher's `ws_forwarder.rs` connect/hello/loop shape,
//! generalized from a fixed forwarder handshake keyed on a bearer device
//! token to the duplex protocol's `init` handshake keyed on an optional
//! session-recovery token, and from a single read-loop-with-heartbeat to the
//! read-pump/write-pump split §5 requires ("Each Client has two threads: a
//! read loop and a write loop").

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rs_protocol::{decode, encode, Frame};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::Client;
use crate::config::PubSubBackend;
use crate::hub;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DuplexQuery {
    /// Session-recovery token, presented as `?token=...` when a client's own
    /// transport doesn't let it set an `Authorization` header (e.g. a
    /// browser's native `WebSocket` constructor).
    token: Option<String>,
}

/// The framework's single duplex upgrade endpoint (§6.2): "a single
/// endpoint performs protocol upgrade and hands the resulting socket to a
/// new Client bound to the Hub."
pub async fn duplex_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<DuplexQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = query.token.or_else(|| bearer_token(&headers));
    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let recovered_client_id = token.as_deref().and_then(|t| state.sessions.validate(t));
    let client_id = recovered_client_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let (client, send_rx) = Client::new(
        client_id.clone(),
        state.hub.clone(),
        state.config.send_queue_capacity,
        state.config.diffing_enabled,
        state.config.compression_enabled,
    );
    if state.config.pubsub_backend != PubSubBackend::Memory {
        client.enable_pubsub_bridge(Arc::clone(&state.pubsub));
    }

    if recovered_client_id.is_some() {
        if let Some(snapshot) = state.client_states.get(&client_id).await {
            client.hydrate(&snapshot);
            info!(client_id = %client_id, "recovered session state on reconnect");
        }
    }

    let session_token = state.sessions.create(&client_id);
    let incarnation = hub::next_incarnation();
    state
        .hub
        .register(client_id.clone(), incarnation, client.send_tx())
        .await;
    info!(client_id = %client_id, recovered = recovered_client_id.is_some(), "duplex client connected");

    if !client.enqueue_frame(&client.init_frame(session_token)) {
        warn!(client_id = %client_id, "failed to enqueue init frame on connect");
    }

    let (sink, stream) = socket.split();
    let mut write_task = tokio::spawn(write_pump(sink, send_rx, state.config.heartbeat_interval));

    read_pump(stream, &state, &client).await;

    state.hub.unregister(client_id.clone(), incarnation).await;
    state
        .client_states
        .save(&client_id, &client.state.serialize())
        .await;

    write_task.abort();
    let _ = write_task.await;
    info!(client_id = %client_id, "duplex client disconnected");
}

/// Drains the client's bounded send queue onto the socket, and sends a
/// `ping` whenever no traffic has gone out for `heartbeat_interval` (§4.7).
/// Exits — closing the socket — on the first write failure or once the Hub's
/// unregister path closes the queue.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Vec<u8>>,
    heartbeat_interval: Duration,
) {
    let mut ticker = tokio::time::interval(heartbeat_interval);
    ticker.tick().await;
    loop {
        tokio::select! {
            maybe_bytes = send_rx.recv() => {
                match maybe_bytes {
                    Some(bytes) => {
                        if sink.send(Message::Binary(bytes)).await.is_err() {
                            break;
                        }
                        ticker.reset();
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                let Ok(bytes) = encode(&Frame::Ping, false) else { continue };
                if sink.send(Message::Binary(bytes)).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.close().await;
}

/// Reads one message at a time, decoding and dispatching each as a protocol
/// frame (§4.7). A malformed frame gets an `error` reply — per §7's protocol
/// error handling, the connection stays open — while a transport-level
/// failure or close ends the pump.
async fn read_pump(mut stream: SplitStream<WebSocket>, state: &AppState, client: &Arc<Client>) {
    loop {
        let message = match stream.next().await {
            Some(Ok(message)) => message,
            Some(Err(err)) => {
                warn!(client_id = %client.id, %err, "transport read error");
                break;
            }
            None => break,
        };
        let bytes = match message {
            Message::Binary(bytes) => bytes,
            Message::Text(text) => text.into_bytes(),
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => break,
        };
        match decode(&bytes) {
            Ok(frame) => handle_inbound_frame(state, client, frame).await,
            Err(err) => {
                client.enqueue_frame(&Frame::Error {
                    message: err.to_string(),
                });
            }
        }
    }
}

async fn handle_inbound_frame(state: &AppState, client: &Arc<Client>, frame: Frame) {
    match frame {
        Frame::Update { key, value } => {
            client.state.set(key, value);
        }
        Frame::Action { name, payload } => {
            if let Err(err) = state.actions.dispatch(client, &name, payload) {
                client.enqueue_frame(&Frame::Error {
                    message: err.to_string(),
                });
            }
        }
        Frame::Ping => {
            client.enqueue_frame(&Frame::Pong);
        }
        Frame::Pong => {}
        Frame::Init { .. } | Frame::Sync { .. } | Frame::Patch { .. } | Frame::Error { .. } => {
            warn!(client_id = %client.id, kind = frame.kind(), "ignoring server-directed frame sent by a client");
        }
    }
}
