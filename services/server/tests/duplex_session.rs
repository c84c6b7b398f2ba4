//! End-to-end duplex session tests: drive a real `services/server` instance
//! over an actual TCP/WebSocket connection using `rs-test-support`'s
//! `MockDuplexClient`, rather than calling the handler functions directly.
//!
//! Grounded on the teacher's `e2e_forwarder_server_receiver.rs` harness
//! shape ("spin up an in-process server, return the bound address, connect
//! a mock client against it"), generalized from the forwarder/receiver
//! handshake to the duplex protocol's `init`/`update`/`action` exchange.

use std::time::Duration;

use rs_protocol::Frame;
use rs_test_support::MockDuplexClient;
use server::config::Config;
use server::state::AppState;

async fn start_server(config: Config) -> (std::net::SocketAddr, Config) {
    let state = AppState::new(config.clone());
    let router = server::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server error");
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    (addr, config)
}

#[tokio::test]
async fn connecting_receives_an_init_frame_with_a_fresh_client_id() {
    let (addr, _config) = start_server(Config::default()).await;
    let mut client = MockDuplexClient::connect(&format!("ws://{addr}/duplex"))
        .await
        .unwrap();

    match client.recv_frame().await.unwrap() {
        Frame::Init { client_id, session_token, state } => {
            assert!(!client_id.is_empty());
            assert!(!session_token.is_empty());
            assert!(state.is_empty());
        }
        other => panic!("expected Init, got {other:?}"),
    }
}

#[tokio::test]
async fn reconnecting_with_a_valid_session_token_recovers_the_same_client_id() {
    let (addr, _config) = start_server(Config::default()).await;
    let url = format!("ws://{addr}/duplex");

    let mut first = MockDuplexClient::connect(&url).await.unwrap();
    let (client_id, token) = match first.recv_frame().await.unwrap() {
        Frame::Init { client_id, session_token, .. } => (client_id, session_token),
        other => panic!("expected Init, got {other:?}"),
    };
    first.close().await.ok();

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut second = MockDuplexClient::connect_with_token(&url, &token)
        .await
        .unwrap();
    match second.recv_frame().await.unwrap() {
        Frame::Init { client_id: recovered_id, .. } => {
            assert_eq!(recovered_id, client_id);
        }
        other => panic!("expected Init, got {other:?}"),
    }
}

#[tokio::test]
async fn sending_an_action_frame_for_an_unknown_name_replies_with_an_error_without_closing() {
    let (addr, _config) = start_server(Config::default()).await;
    let mut client = MockDuplexClient::connect(&format!("ws://{addr}/duplex"))
        .await
        .unwrap();
    client.recv_frame().await.unwrap(); // init

    client
        .send_frame(&Frame::Action {
            name: "does-not-exist".to_owned(),
            payload: serde_json::Value::Null,
        })
        .await
        .unwrap();

    match client.recv_frame().await.unwrap() {
        Frame::Error { message } => assert!(message.contains("does-not-exist")),
        other => panic!("expected Error, got {other:?}"),
    }

    // Connection stays open: a ping still gets a pong.
    client.send_frame(&Frame::Ping).await.unwrap();
    assert_eq!(client.recv_frame().await.unwrap(), Frame::Pong);
}

#[tokio::test]
async fn healthz_and_readyz_respond_ok() {
    let (addr, _config) = start_server(Config::default()).await;
    let body = reqwest::get(format!("http://{addr}/healthz"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn requesting_an_unregistered_page_returns_404() {
    let (addr, _config) = start_server(Config::default()).await;
    let response = reqwest::get(format!("http://{addr}/no-such-page"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
