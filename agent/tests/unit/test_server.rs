//! HTTP and WebSocket surface tests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use shipd::app::options::AppOptions;
use shipd::app::state::AppState;
use shipd::broadcast::hub::Event;
use shipd::broadcast::protocol::{ServerMessage, DEPLOYMENTS_TOPIC};
use shipd::models::deployment::DisplayStatus;
use shipd::server::serve::router;
use shipd::server::webhook::{sign, EVENT_HEADER, SIGNATURE_HEADER};
use shipd::store::memory::MemoryStore;

use crate::support::GatedRunner;

const SECRET: &str = "It's a Secret to Everybody";

struct Harness {
    app: Router,
    state: AppState,
    store: Arc<MemoryStore>,
    runner: Arc<GatedRunner>,
}

fn harness(git_ref: Option<&str>) -> Harness {
    let options = AppOptions {
        webhook_secret: Some(SecretString::from(SECRET)),
        git_ref: git_ref.map(str::to_string),
        ..Default::default()
    };
    let store = Arc::new(MemoryStore::new());
    let runner = Arc::new(GatedRunner::new());
    let state = AppState::with_parts(&options, store.clone(), runner.clone());
    let app = router(Arc::new(state.server_state(&options)));

    Harness {
        app,
        state,
        store,
        runner,
    }
}

fn push_body(message: &str) -> String {
    json!({
        "ref": "refs/heads/main",
        "head_commit": { "message": message }
    })
    .to_string()
}

fn webhook(body: &str, event: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header(EVENT_HEADER, event);
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn signed(body: &str, event: &str) -> Request<Body> {
    webhook(body, event, Some(sign(SECRET.as_bytes(), body.as_bytes()).unwrap()))
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let h = harness(None);

    let response = h.app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["deploying"], false);
}

#[tokio::test]
async fn test_unsigned_push_is_rejected() {
    let h = harness(None);
    let body = push_body("sneaky");

    let response = h
        .app
        .clone()
        .oneshot(webhook(&body, "push", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = sign(b"wrong secret", body.as_bytes()).unwrap();
    let response = h
        .app
        .oneshot(webhook(&body, "push", Some(forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert!(h.store.snapshot().await.is_empty());
    assert!(!h.state.pipeline.is_deploying());
}

#[tokio::test]
async fn test_missing_secret_rejects_everything() {
    let options = AppOptions::default();
    let state = AppState::with_parts(
        &options,
        Arc::new(MemoryStore::new()),
        Arc::new(GatedRunner::new()),
    );
    let app = router(Arc::new(state.server_state(&options)));

    let response = app.oneshot(signed(&push_body("x"), "push")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_signed_push_starts_then_queues() {
    let h = harness(None);

    let response = h
        .app
        .clone()
        .oneshot(signed(&push_body("first"), "push"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let first = json_body(response).await;
    assert_eq!(first["status"], "started");

    let response = h
        .app
        .clone()
        .oneshot(signed(&push_body("second"), "push"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let second = json_body(response).await;
    assert_eq!(second["status"], "queued");

    let records = h.store.snapshot().await;
    assert_eq!(records.len(), 2);
    assert!(records
        .iter()
        .any(|r| Some(r.id.as_str()) == first["deployment_id"].as_str()));

    h.runner.open(2);
}

#[tokio::test]
async fn test_ping_and_other_events() {
    let h = harness(None);

    let response = h.app.clone().oneshot(signed("{}", "ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "pong");

    let response = h.app.oneshot(signed("{}", "issues")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["status"], "ignored");

    assert!(h.store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_push_to_other_ref_is_ignored() {
    let h = harness(Some("refs/heads/release"));

    let response = h.app.oneshot(signed(&push_body("wip"), "push")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["status"], "ignored");
    assert!(h.store.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_malformed_push_payload() {
    let h = harness(None);

    let response = h.app.oneshot(signed("not json", "push")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deployment_history_and_lookup() {
    let h = harness(None);

    let outcome = h.state.pipeline.on_push("ship it").await;
    h.runner.open(1);
    outcome.handle.unwrap().await.unwrap();

    let response = h.app.clone().oneshot(get("/deployments")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["deployments"][0]["message"], "ship it");
    assert_eq!(body["deployments"][0]["status"], "success");
    assert_eq!(body["deployments"][0]["is_current"], true);
    assert!(body["deployments"][0].get("output").is_none());

    let uri = format!("/deployments/{}", outcome.deployment.id);
    let response = h.app.clone().oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["id"], outcome.deployment.id.as_str());

    let response = h.app.oneshot(get("/deployments/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_deployment_exposes_output() {
    let h = harness(None);
    h.runner.script(&[false]);

    let outcome = h.state.pipeline.on_push("broken").await;
    h.runner.open(1);
    outcome.handle.unwrap().await.unwrap();

    let uri = format!("/deployments/{}", outcome.deployment.id);
    let response = h.app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "failed");
    assert_eq!(body["output"], "build boom\n");
    assert_eq!(body["is_current"], false);
}

// ================================= WEBSOCKET ===================================== //

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("ws://{}/ws", addr)
}

/// Next deployment message, skipping plain text notices
async fn next_message(socket: &mut Socket) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            match serde_json::from_str(text.as_str()).unwrap() {
                ServerMessage::Message { .. } => continue,
                message => return message,
            }
        }
    }
}

async fn send(socket: &mut Socket, text: &str) {
    socket.send(Message::Text(text.into())).await.unwrap();
}

/// Wait until some connection is subscribed to the deployments topic
async fn wait_for_subscriber(h: &Harness) {
    for _ in 0..500 {
        let reached = h
            .state
            .hub
            .broadcast(Event::topic(DEPLOYMENTS_TOPIC, ServerMessage::notice("probe")));
        if reached > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no subscriber showed up");
}

#[tokio::test]
async fn test_ws_state_then_live_updates() {
    let h = harness(None);
    let existing = h.state.pipeline.on_push("before connect").await;
    h.runner.open(1);
    existing.handle.unwrap().await.unwrap();

    let url = spawn_server(h.app.clone()).await;
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();

    match next_message(&mut socket).await {
        ServerMessage::State { deployments } => {
            assert_eq!(deployments.len(), 1);
            assert_eq!(deployments[0].message, "before connect");
            assert!(deployments[0].is_current);
        }
        other => panic!("expected state, got {:?}", other),
    }
    let previous = existing.deployment.id.clone();

    // is_current as seen by the client, by deployment id
    let mut current: HashMap<String, bool> = HashMap::from([(previous.clone(), true)]);

    // garbage is ignored and the connection stays open
    send(&mut socket, "{not json").await;
    send(&mut socket, r#"{"type":"dance"}"#).await;
    send(&mut socket, r#"{"type":"subscribe","topic":"deployments"}"#).await;
    wait_for_subscriber(&h).await;

    let outcome = h.state.pipeline.on_push("after connect").await;
    match next_message(&mut socket).await {
        ServerMessage::Creation { deployment } => {
            assert_eq!(deployment.id, outcome.deployment.id);
            assert_eq!(deployment.status, DisplayStatus::Running);
        }
        other => panic!("expected creation, got {:?}", other),
    }

    h.runner.open(1);
    outcome.handle.unwrap().await.unwrap();
    match next_message(&mut socket).await {
        ServerMessage::Update { deployment } => {
            assert_eq!(deployment.status, DisplayStatus::Success);
            assert!(!deployment.is_current);
        }
        other => panic!("expected update, got {:?}", other),
    }
    current.insert(outcome.deployment.id.clone(), false);

    // going live clears the old flag and sets the new one, one update each
    for _ in 0..2 {
        match next_message(&mut socket).await {
            ServerMessage::Update { deployment } => {
                assert!(deployment.id == previous || deployment.id == outcome.deployment.id);
                current.insert(deployment.id, deployment.is_current);
            }
            other => panic!("expected update, got {:?}", other),
        }
        assert!(current.values().filter(|c| **c).count() <= 1);
    }

    assert_eq!(current.get(&outcome.deployment.id), Some(&true));
    assert_eq!(current.get(&previous), Some(&false));
}

#[tokio::test]
async fn test_ws_disconnect_unregisters() {
    let h = harness(None);
    let url = spawn_server(h.app.clone()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    assert!(matches!(
        next_message(&mut socket).await,
        ServerMessage::State { .. }
    ));
    assert_eq!(h.state.hub.len(), 1);

    socket.close(None).await.unwrap();
    for _ in 0..500 {
        if h.state.hub.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("connection was never unregistered");
}
