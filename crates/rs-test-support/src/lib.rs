//! Mock duplex-protocol client used by `services/server`'s integration
//! tests. Grounded on `rt-test-utils`'s `MockWsClient`/`MockWsServer` pair —
//! only the client half survives here, since the server half of this
//! framework (the Hub/Client loop under test) already lives in
//! `services/server` itself; tests spin up the real router with
//! `axum::serve` on an ephemeral port rather than a second mock server.

mod mock_duplex_client;

pub use mock_duplex_client::MockDuplexClient;
