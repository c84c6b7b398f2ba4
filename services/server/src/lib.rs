pub mod action_registry;
pub mod client;
pub mod client_state_store;
pub mod config;
pub mod duplex;
pub mod error;
pub mod http;
pub mod hub;
pub mod pubsub;
pub mod render;
pub mod session;
pub mod state;
pub mod state_map;
pub mod storage;

pub use state::AppState;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

/// Wires the framework's entire HTTP/duplex surface (§6.2): the single
/// duplex upgrade endpoint, the page-render fallback, the render-events
/// feed, and the two health routes. Request routing to individual
/// pages/components is an external collaborator (§1) — this only dispatches
/// whatever path arrives at the fallback to [`AppState::render`].
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/duplex", get(duplex::duplex_handler))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/__render/events", get(http::events::render_events))
        .fallback(http::render_route::render_page)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

mod health {
    use axum::response::IntoResponse;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }

    pub async fn readyz() -> impl IntoResponse {
        "ok"
    }
}
