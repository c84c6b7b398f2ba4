//! `ClientStateStore` (§3, §4.8): persists a serialized `StateMap` keyed by
//! client id, for reconnection recovery. Backed by the pluggable [`Storage`]
//! trait so the same code path works whether state lives in-process or in
//! an external KV — per §7, a storage outage degrades `save` to a
//! best-effort, logged no-op rather than a hard failure, since recovered
//! state is explicitly a Non-goal of durability (§1).

use std::sync::Arc;

use serde_json::Map;
use tracing::warn;

use crate::storage::Storage;

const KEY_PREFIX: &str = "clientstate:";

pub struct ClientStateStore {
    storage: Arc<dyn Storage>,
}

impl ClientStateStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    fn key(client_id: &str) -> String {
        format!("{KEY_PREFIX}{client_id}")
    }

    /// Persists `state`. Storage errors are swallowed after logging (§7:
    /// "ClientStateStore save silently fails with log") since losing
    /// recovery state is recoverable — the client simply starts fresh next
    /// time — whereas surfacing the error to the disconnecting client's
    /// write pump would serve no one.
    pub async fn save(&self, client_id: &str, state: &Map<String, serde_json::Value>) {
        match serde_json::to_vec(state) {
            Ok(bytes) => self.storage.set(&Self::key(client_id), bytes).await,
            Err(err) => warn!(client_id, %err, "failed to serialize state for recovery"),
        }
    }

    pub async fn get(&self, client_id: &str) -> Option<Map<String, serde_json::Value>> {
        let bytes = self.storage.get(&Self::key(client_id)).await?;
        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(client_id, %err, "stored client state is not valid JSON, discarding");
                None
            }
        }
    }

    pub async fn remove(&self, client_id: &str) {
        self.storage.delete(&Self::key(client_id)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use serde_json::json;

    #[tokio::test]
    async fn save_then_get_round_trips_the_state() {
        let store = ClientStateStore::new(Arc::new(InMemoryStorage::new()));
        let mut state = Map::new();
        state.insert("count".to_owned(), json!(3));
        store.save("client-1", &state).await;
        assert_eq!(store.get("client-1").await, Some(state));
    }

    #[tokio::test]
    async fn get_on_unknown_client_returns_none() {
        let store = ClientStateStore::new(Arc::new(InMemoryStorage::new()));
        assert_eq!(store.get("nobody").await, None);
    }

    #[tokio::test]
    async fn remove_drops_the_saved_state() {
        let store = ClientStateStore::new(Arc::new(InMemoryStorage::new()));
        store.save("client-1", &Map::new()).await;
        store.remove("client-1").await;
        assert_eq!(store.get("client-1").await, None);
    }
}
