//! `Client` (§4.7): the server-side handle for one connected duplex
//! session. Owns a private `StateMap`, tracks the last snapshot it pushed
//! (so diffing mode can compute a `patch` instead of resending the whole
//! state), and exposes a bounded send queue that the write pump in
//! [`crate::duplex`] drains onto the socket.
//!
//! Grounded on the teacher's `ws_forwarder.rs` per-connection state
//! (a struct owning a bounded `mpsc` outbox plus a last-seen snapshot for
//! change detection), generalized from forwarding wire-format race reads
//! to pushing arbitrary JSON state.

use std::sync::{Arc, Mutex};

use rs_protocol::{encode, Frame};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::warn;

use crate::hub::HubHandle;
use crate::pubsub::PubSub;
use crate::state_map::StateMap;

/// The channel every duplex broadcast is published under when a
/// multi-process `PubSub` backend is configured (§4.6, §9 "prefork + shared
/// state").
pub const BROADCAST_CHANNEL: &str = "rs:broadcast";

struct PubSubBridge {
    pubsub: Arc<dyn PubSub>,
    channel: &'static str,
}

pub struct Client {
    pub id: String,
    pub state: Arc<StateMap>,
    hub: HubHandle,
    send_tx: mpsc::Sender<Vec<u8>>,
    last_sent: Mutex<Map<String, Value>>,
    diffing_enabled: bool,
    compression_enabled: bool,
    pubsub_bridge: Mutex<Option<PubSubBridge>>,
}

impl Client {
    /// Builds a new client bound to `id`. Returns the client (already wired
    /// so that any change to its `StateMap` enqueues a `sync`/`patch`
    /// frame, both to itself and — per §2's "write pump emits the
    /// resulting diff... back to all subscribers via the Hub's PubSub" —
    /// broadcast to every other client through `hub`) and the receiving
    /// half of its send queue, which the write pump owns exclusively.
    pub fn new(
        id: String,
        hub: HubHandle,
        send_queue_capacity: usize,
        diffing_enabled: bool,
        compression_enabled: bool,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        let (send_tx, send_rx) = mpsc::channel(send_queue_capacity);
        let client = Arc::new(Self {
            id,
            state: Arc::new(StateMap::new()),
            hub,
            send_tx,
            last_sent: Mutex::new(Map::new()),
            diffing_enabled,
            compression_enabled,
            pubsub_bridge: Mutex::new(None),
        });
        client.wire_state_push();
        (client, send_rx)
    }

    /// Enables the multi-process broadcast bridge (§4.6): every state push
    /// this client originates is, in addition to the local Hub fan-out,
    /// published to `pubsub` so other processes' Hubs can relay it to their
    /// own local clients. Only meaningful when `pubsub` is a shared backend
    /// (e.g. Redis) — the default in-memory backend has no other process to
    /// reach, so callers leave this unset in that configuration.
    pub fn enable_pubsub_bridge(&self, pubsub: Arc<dyn PubSub>) {
        *self.pubsub_bridge.lock().unwrap() = Some(PubSubBridge {
            pubsub,
            channel: BROADCAST_CHANNEL,
        });
    }

    fn wire_state_push(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.state.on_change(move |_key, _value| {
            if let Some(client) = weak.upgrade() {
                client.push_state();
            }
        });
    }

    /// Builds the `init` frame sent immediately after a connection is
    /// accepted, and seeds `last_sent` so the first diff (if diffing is
    /// enabled) is computed against exactly what the client was told.
    pub fn init_frame(&self, session_token: String) -> Frame {
        let state = self.state.serialize();
        *self.last_sent.lock().unwrap() = state.clone();
        Frame::Init {
            client_id: self.id.clone(),
            session_token,
            state,
        }
    }

    /// Replaces the client's state wholesale (recovery on reconnect) and
    /// resets `last_sent` so the recovered state isn't immediately
    /// re-diffed against an empty baseline.
    pub fn hydrate(&self, snapshot: &Map<String, Value>) {
        self.state.deserialize(snapshot);
        *self.last_sent.lock().unwrap() = snapshot.clone();
    }

    /// Pushes the client's current state as a `sync` (full snapshot) or
    /// `patch` (diff since the last push), per the configured mode (§4.4).
    pub fn push_state(&self) {
        let current = self.state.serialize();
        let frame = {
            let mut last_sent = self.last_sent.lock().unwrap();
            let frame = if self.diffing_enabled {
                let diff = self.state.diff(&last_sent);
                Frame::Patch {
                    added: diff.added,
                    removed: diff.removed,
                    changed: diff.changed,
                }
            } else {
                Frame::Sync {
                    state: current.clone(),
                }
            };
            *last_sent = current;
            frame
        };
        self.enqueue_frame(&frame);
        self.broadcast_frame(&frame);
    }

    /// Fans `frame` out to every other connected client via the Hub,
    /// matching the spec's description of the write pump's output as
    /// going "back to all subscribers" rather than only to the client
    /// whose mutation produced it. Spawned rather than awaited since
    /// `push_state` runs from inside a synchronous `Cell` notification.
    fn broadcast_frame(&self, frame: &Frame) {
        let Ok(bytes) = encode(frame, self.compression_enabled) else {
            return;
        };
        let hub = self.hub.clone();
        let exclude = self.id.clone();
        let bridge = self.pubsub_bridge.lock().unwrap().as_ref().map(|b| (Arc::clone(&b.pubsub), b.channel));
        let bytes_for_pubsub = bridge.is_some().then(|| bytes.clone());
        tokio::spawn(async move {
            hub.broadcast(bytes, Some(exclude)).await;
            if let (Some((pubsub, channel)), Some(bytes)) = (bridge, bytes_for_pubsub) {
                pubsub.publish(channel, bytes).await;
            }
        });
    }

    /// Encodes and enqueues `frame` onto this client's send queue.
    /// Returns `false` if the queue is full or encoding failed — the
    /// caller (the duplex handler) treats either as a reason to drop the
    /// connection, per the Hub's full-queue-drops-the-client contract.
    pub fn enqueue_frame(&self, frame: &Frame) -> bool {
        match encode(frame, self.compression_enabled) {
            Ok(bytes) => match self.send_tx.try_send(bytes) {
                Ok(()) => true,
                Err(_) => {
                    warn!(client_id = %self.id, "send queue full, frame dropped");
                    false
                }
            },
            Err(err) => {
                warn!(client_id = %self.id, %err, "failed to encode frame");
                false
            }
        }
    }

    pub fn send_tx(&self) -> mpsc::Sender<Vec<u8>> {
        self.send_tx.clone()
    }

    /// Sends `frame` to one other client by id via the Hub (§4.9: action
    /// handlers "may... send targeted messages"). Fire-and-forget — the Hub
    /// itself drops the send if the target's queue is full or it isn't
    /// connected, per its own non-blocking-enqueue contract.
    pub fn send_to(&self, target_client_id: impl Into<String>, frame: &Frame) {
        let Ok(bytes) = encode(frame, self.compression_enabled) else {
            return;
        };
        let hub = self.hub.clone();
        let target_client_id = target_client_id.into();
        tokio::spawn(async move {
            hub.send_to(target_client_id, bytes).await;
        });
    }

    /// Broadcasts `frame` to every connected client via the Hub (§4.9:
    /// action handlers "may... broadcast"). Set `exclude_self` to leave this
    /// client out, matching [`Client::push_state`]'s own broadcast.
    pub fn broadcast(&self, frame: &Frame, exclude_self: bool) {
        let Ok(bytes) = encode(frame, self.compression_enabled) else {
            return;
        };
        let hub = self.hub.clone();
        let exclude = exclude_self.then(|| self.id.clone());
        tokio::spawn(async move {
            hub.broadcast(bytes, exclude).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn init_frame_carries_the_current_state_and_seeds_last_sent() {
        let (client, _rx) = Client::new("c1".into(), crate::hub::spawn(), 8, false, false);
        client.state.add("count", json!(0));
        let frame = client.init_frame("token".into());
        match frame {
            Frame::Init { client_id, session_token, state } => {
                assert_eq!(client_id, "c1");
                assert_eq!(session_token, "token");
                assert_eq!(state.get("count"), Some(&json!(0)));
            }
            other => panic!("expected Init, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn state_change_in_snapshot_mode_enqueues_a_sync_frame() {
        let (client, mut rx) = Client::new("c1".into(), crate::hub::spawn(), 8, false, false);
        client.state.add("count", json!(0));
        client.state.set("count", json!(1));

        let bytes = rx.recv().await.unwrap();
        let frame = rs_protocol::decode(&bytes).unwrap();
        assert!(matches!(frame, Frame::Sync { state } if state.get("count") == Some(&json!(1))));
    }

    #[tokio::test]
    async fn state_change_in_diffing_mode_enqueues_a_patch_frame() {
        let (client, mut rx) = Client::new("c1".into(), crate::hub::spawn(), 8, true, false);
        client.state.add("count", json!(0));

        client.state.set("count", json!(1));
        let bytes = rx.recv().await.unwrap();
        let frame = rs_protocol::decode(&bytes).unwrap();
        match frame {
            Frame::Patch { changed, removed, .. } => {
                assert_eq!(changed.get("count"), Some(&json!(1)));
                assert!(removed.is_empty());
            }
            other => panic!("expected Patch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn a_full_send_queue_causes_enqueue_frame_to_report_failure() {
        let (client, _rx) = Client::new("c1".into(), crate::hub::spawn(), 1, false, false);
        // Fill the single-slot queue directly.
        client.send_tx().try_send(b"filler".to_vec()).unwrap();
        assert!(!client.enqueue_frame(&Frame::Ping));
    }

    #[tokio::test]
    async fn send_to_reaches_only_the_named_target_through_the_hub() {
        let hub = crate::hub::spawn();
        let (a, _rx_a) = Client::new("a".into(), hub.clone(), 8, false, false);
        let (b, mut rx_b) = Client::new("b".into(), hub.clone(), 8, false, false);
        hub.register("a".into(), crate::hub::next_incarnation(), a.send_tx())
            .await;
        hub.register("b".into(), crate::hub::next_incarnation(), b.send_tx())
            .await;

        a.send_to("b", &Frame::Ping);

        let bytes = rx_b.recv().await.unwrap();
        assert_eq!(rs_protocol::decode(&bytes).unwrap(), Frame::Ping);
    }

    #[tokio::test]
    async fn broadcast_with_exclude_self_skips_the_originating_client() {
        let hub = crate::hub::spawn();
        let (a, mut rx_a) = Client::new("a".into(), hub.clone(), 8, false, false);
        let (b, mut rx_b) = Client::new("b".into(), hub.clone(), 8, false, false);
        hub.register("a".into(), crate::hub::next_incarnation(), a.send_tx())
            .await;
        hub.register("b".into(), crate::hub::next_incarnation(), b.send_tx())
            .await;

        a.broadcast(&Frame::Ping, true);

        let bytes = rx_b.recv().await.unwrap();
        assert_eq!(rs_protocol::decode(&bytes).unwrap(), Frame::Ping);
        assert!(rx_a.try_recv().is_err(), "originating client is excluded");
    }

    #[tokio::test]
    async fn hydrate_replaces_state_and_resets_the_diff_baseline() {
        let (client, _rx) = Client::new("c1".into(), crate::hub::spawn(), 8, true, false);
        client.state.add("stale", json!(true));
        let mut snapshot = Map::new();
        snapshot.insert("recovered".to_owned(), json!(42));
        client.hydrate(&snapshot);
        assert_eq!(client.state.get("stale"), None);
        assert_eq!(client.state.get("recovered"), Some(json!(42)));
    }
}
