//! `AppState` (§5, §6.4): the shared handles every HTTP/duplex route needs,
//! threaded through `axum`'s `Router::with_state`. Grounded on the
//! teacher's `AppState` (a `Clone` bundle of `Arc`-wrapped shared state
//! handed to every handler).

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use crate::action_registry::ActionRegistry;
use crate::client::BROADCAST_CHANNEL;
use crate::client_state_store::ClientStateStore;
use crate::config::Config;
use crate::hub::{self, HubHandle};
use crate::pubsub::{self, PubSub};
use crate::render::RenderPipeline;
use crate::session::{self, SessionStore};
use crate::storage::{self, Storage};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: HubHandle,
    pub sessions: Arc<SessionStore>,
    pub client_states: Arc<ClientStateStore>,
    pub actions: Arc<ActionRegistry>,
    pub storage: Arc<dyn Storage>,
    pub pubsub: Arc<dyn PubSub>,
    pub render: Arc<RenderPipeline>,
}

impl AppState {
    /// Wires up every subsystem from `config`: the in-memory or Redis
    /// storage/pubsub backends, the Hub's worker task, the session reaper,
    /// and an empty `ActionRegistry`/`RenderPipeline` ready for the binary
    /// entrypoint to register routes and actions against.
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let storage = default_storage_for(&config);
        let sessions = Arc::new(SessionStore::new(config.session_ttl));
        session::spawn_reaper(Arc::clone(&sessions), Duration::from_secs(60));

        let hub = hub::spawn();
        let pubsub = default_pubsub_for(&config);
        if config.pubsub_backend != crate::config::PubSubBackend::Memory {
            spawn_pubsub_relay(Arc::clone(&pubsub), hub.clone());
        }

        Self {
            hub,
            client_states: Arc::new(ClientStateStore::new(Arc::clone(&storage))),
            actions: Arc::new(ActionRegistry::new()),
            render: Arc::new(RenderPipeline::new(
                config.render_cache_max_entries,
                config.template_caching_enabled,
            )),
            pubsub,
            storage,
            sessions,
            config,
        }
    }
}

/// The subscribe half of the §4.6 multi-process broadcast bridge: relays
/// every payload another process publishes on [`BROADCAST_CHANNEL`] into
/// this process's Hub, reaching clients connected to *this* process that
/// never saw the originating local broadcast. The publish half lives on
/// [`crate::client::Client`], enabled per-connection by `duplex`.
fn spawn_pubsub_relay(pubsub: Arc<dyn PubSub>, hub: HubHandle) {
    tokio::spawn(async move {
        let mut stream = pubsub.subscribe(BROADCAST_CHANNEL).await;
        while let Some(message) = stream.next().await {
            match message {
                Ok(payload) => hub.broadcast(payload, None).await,
                Err(err) => tracing::warn!(%err, "pubsub relay lagged, message dropped"),
            }
        }
    });
}

/// Picking the Redis backend requires a connection URL that `Config` does
/// not carry (§6.4 only specifies backend *selection*, not connection
/// details), so wiring `RedisStorage::connect` is left to the binary
/// entrypoint, which has access to its own environment. This constructor
/// always returns the in-memory backend and warns if Redis was requested
/// but never explicitly wired.
fn default_storage_for(config: &Config) -> Arc<dyn Storage> {
    if config.storage_backend == crate::config::StorageBackend::Redis {
        tracing::warn!(
            "STORAGE_BACKEND=redis selected, but AppState::new only wires the in-memory backend; construct RedisStorage explicitly in main.rs to use it"
        );
    }
    storage::default_storage()
}

fn default_pubsub_for(config: &Config) -> Arc<dyn PubSub> {
    match config.pubsub_backend {
        crate::config::PubSubBackend::Memory => pubsub::default_pubsub(),
        crate::config::PubSubBackend::Redis => {
            tracing::warn!("PUBSUB_BACKEND=redis is configured, but this deployment uses the in-memory pubsub until a Redis-backed implementation is selected here explicitly");
            pubsub::default_pubsub()
        }
    }
}
