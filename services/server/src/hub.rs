//! `Hub` (§4.6): the registry and router for live duplex connections. Runs
//! on a single dedicated task that owns all mutations to the client
//! registry — no external code may mutate it directly, only through the
//! three channels described in §5 (register, unregister, broadcast).
//!
//! Grounded on the teacher's single-select-loop worker shape
//! (`workers/client_pool.rs`'s `begin()` loop, generalized from a
//! fixed-protocol command dispatcher to the three-channel register/
//! unregister/broadcast design the spec requires) and on
//! `venantvr-pubsub…broker.rs`'s dedicated-worker-task idiom.
//!
//! The double-close hazard (§9) is resolved by construction: the broadcast
//! arm never removes a registry entry directly. A full send queue is
//! recorded in a scratch list and reconciled through the *same* removal
//! code the unregister arm uses, so a given client id's entry — and the
//! `Sender` whose drop closes its queue — is removed by exactly one call
//! site, regardless of which arm observed the failure first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identifies one registration of a client id. A client that disconnects
/// and later reconnects under the same id gets a new incarnation, so a
/// stale unregister for the old connection can never remove the new one.
pub type Incarnation = u64;

static NEXT_INCARNATION: AtomicU64 = AtomicU64::new(1);

pub fn next_incarnation() -> Incarnation {
    NEXT_INCARNATION.fetch_add(1, Ordering::Relaxed)
}

struct RegisterMsg {
    client_id: String,
    incarnation: Incarnation,
    sender: mpsc::Sender<Vec<u8>>,
}

struct UnregisterMsg {
    client_id: String,
    incarnation: Incarnation,
}

struct BroadcastMsg {
    payload: Vec<u8>,
    exclude: Option<String>,
}

struct UnicastMsg {
    client_id: String,
    payload: Vec<u8>,
}

/// External handle to a running Hub. Cheaply `Clone`-able; every clone
/// talks to the same single Hub task through its channels.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<RegisterMsg>,
    unregister_tx: mpsc::Sender<UnregisterMsg>,
    broadcast_tx: mpsc::Sender<BroadcastMsg>,
    unicast_tx: mpsc::Sender<UnicastMsg>,
}

impl HubHandle {
    /// Registers a client's send-queue sender under `client_id` at
    /// `incarnation`. Returns immediately; actual insertion happens on the
    /// Hub's task.
    pub async fn register(&self, client_id: String, incarnation: Incarnation, sender: mpsc::Sender<Vec<u8>>) {
        let _ = self
            .register_tx
            .send(RegisterMsg {
                client_id,
                incarnation,
                sender,
            })
            .await;
    }

    pub async fn unregister(&self, client_id: String, incarnation: Incarnation) {
        let _ = self
            .unregister_tx
            .send(UnregisterMsg {
                client_id,
                incarnation,
            })
            .await;
    }

    /// Fans `payload` out to every registered client except `exclude` (if
    /// given). Per-client delivery is a non-blocking enqueue — a client
    /// whose queue is full is dropped, not waited on.
    pub async fn broadcast(&self, payload: Vec<u8>, exclude: Option<String>) {
        let _ = self.broadcast_tx.send(BroadcastMsg { payload, exclude }).await;
    }

    pub async fn send_to(&self, client_id: String, payload: Vec<u8>) {
        let _ = self.unicast_tx.send(UnicastMsg { client_id, payload }).await;
    }
}

/// Spawns the Hub's single worker task and returns a handle to it. Callers
/// must not spawn a second Hub loop in the same process (§4.6).
pub fn spawn() -> HubHandle {
    let (register_tx, mut register_rx) = mpsc::channel::<RegisterMsg>(256);
    let (unregister_tx, mut unregister_rx) = mpsc::channel::<UnregisterMsg>(256);
    let (broadcast_tx, mut broadcast_rx) = mpsc::channel::<BroadcastMsg>(256);
    let (unicast_tx, mut unicast_rx) = mpsc::channel::<UnicastMsg>(256);

    tokio::spawn(async move {
        let mut clients: HashMap<String, (Incarnation, mpsc::Sender<Vec<u8>>)> = HashMap::new();

        loop {
            tokio::select! {
                Some(msg) = register_rx.recv() => {
                    clients.insert(msg.client_id, (msg.incarnation, msg.sender));
                }
                Some(msg) = unregister_rx.recv() => {
                    remove_if_same_incarnation(&mut clients, &msg.client_id, msg.incarnation);
                }
                Some(msg) = broadcast_rx.recv() => {
                    let mut stale = Vec::new();
                    for (id, (_incarnation, sender)) in clients.iter() {
                        if msg.exclude.as_deref() == Some(id.as_str()) {
                            continue;
                        }
                        if sender.try_send(msg.payload.clone()).is_err() {
                            stale.push(id.clone());
                        }
                    }
                    for id in stale {
                        if let Some((incarnation, _)) = clients.get(&id) {
                            let incarnation = *incarnation;
                            debug!(client_id = %id, "send queue full during broadcast, marking for removal");
                            remove_if_same_incarnation(&mut clients, &id, incarnation);
                        }
                    }
                }
                Some(msg) = unicast_rx.recv() => {
                    if let Some((_incarnation, sender)) = clients.get(&msg.client_id) {
                        if sender.try_send(msg.payload).is_err() {
                            warn!(client_id = %msg.client_id, "unicast dropped, send queue full");
                        }
                    }
                }
                else => break,
            }
        }
    });

    HubHandle {
        register_tx,
        unregister_tx,
        broadcast_tx,
        unicast_tx,
    }
}

fn remove_if_same_incarnation(
    clients: &mut HashMap<String, (Incarnation, mpsc::Sender<Vec<u8>>)>,
    client_id: &str,
    incarnation: Incarnation,
) {
    if let std::collections::hash_map::Entry::Occupied(entry) = clients.entry(client_id.to_owned()) {
        if entry.get().0 == incarnation {
            entry.remove();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn broadcast_reaches_every_registered_client() {
        let hub = spawn();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        hub.register("a".into(), next_incarnation(), tx_a).await;
        hub.register("b".into(), next_incarnation(), tx_b).await;

        hub.broadcast(b"hello".to_vec(), None).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(rx_a.try_recv().unwrap(), b"hello");
        assert_eq!(rx_b.try_recv().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn broadcast_excludes_the_named_client() {
        let hub = spawn();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        hub.register("a".into(), next_incarnation(), tx_a).await;

        hub.broadcast(b"hi".to_vec(), Some("a".into())).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(rx_a.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn full_send_queue_is_dropped_without_blocking_other_clients() {
        let hub = spawn();
        let (tx_full, _rx_full) = mpsc::channel(1);
        let (tx_ok, mut rx_ok) = mpsc::channel(8);
        hub.register("full".into(), next_incarnation(), tx_full.clone()).await;
        hub.register("ok".into(), next_incarnation(), tx_ok).await;

        // Fill "full"'s queue (capacity 1) before the broadcast under test.
        tx_full.send(b"filler".to_vec()).await.unwrap();

        hub.broadcast(b"next".to_vec(), None).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(rx_ok.try_recv().unwrap(), b"next");

        // The dropped client should no longer receive subsequent broadcasts.
        let (tx_probe, mut rx_probe) = mpsc::channel(8);
        hub.register("probe".into(), next_incarnation(), tx_probe).await;
        hub.broadcast(b"after".to_vec(), None).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx_probe.try_recv().unwrap(), b"after");
        assert_eq!(rx_ok.try_recv().unwrap(), b"after");
    }

    #[tokio::test]
    async fn unregister_with_a_stale_incarnation_does_not_remove_the_current_registration() {
        let hub = spawn();
        let old_incarnation = next_incarnation();
        hub.unregister("client".into(), old_incarnation).await;

        let (tx, mut rx) = mpsc::channel(8);
        let current_incarnation = next_incarnation();
        hub.register("client".into(), current_incarnation, tx).await;

        // A stale unregister (e.g. a slow-to-arrive message from a previous
        // connection) must not tear down the current registration.
        hub.unregister("client".into(), old_incarnation).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        hub.broadcast(b"still-here".to_vec(), None).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(rx.try_recv().unwrap(), b"still-here");
    }
}
