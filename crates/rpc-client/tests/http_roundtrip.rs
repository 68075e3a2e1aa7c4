//! Integration test: boots an in-process HTTP server that plays the MAGE
//! side (JSON-RPC endpoint plus message stream), connects a real
//! [`MageClient`] over reqwest, and checks headers, error mapping, inline
//! events and stream acknowledgment end to end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use mage_rpc::protocol::JsonRpcResponse;
use mage_rpc::{Error, MageClient, MageClientBuilder, PollTransport};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

// ── Mini MAGE server ────────────────────────────────────────────────────

#[derive(Default)]
struct ServerState {
    /// `X-MAGE-SESSION` value seen on each RPC request.
    sessions: Mutex<Vec<Option<String>>>,
    /// Query string of each message stream request.
    stream_queries: Mutex<Vec<HashMap<String, String>>>,
    stream_hits: AtomicUsize,
}

async fn jsonrpc(
    State(state): State<Arc<ServerState>>,
    Path(app): Path<String>,
    headers: HeaderMap,
    Json(req): Json<Value>,
) -> impl IntoResponse {
    let session = headers
        .get("x-mage-session")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.sessions.lock().push(session);

    if app == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "upstream down").into_response();
    }

    let Some(id) = req["id"].as_u64() else {
        let resp = JsonRpcResponse::failure(None, -32700, "missing request id");
        return Json(resp).into_response();
    };
    let params = req.get("params").cloned().unwrap_or(Value::Null);
    let body = match req["method"].as_str().unwrap_or_default() {
        "echo" => JsonRpcResponse::success(
            id,
            json!({ "result": params["msg"], "myEvents": ["[\"greet\"]"] }),
        ),
        "login" => JsonRpcResponse::success(id, json!({ "errorCode": "BAD_PASSWORD" })),
        _ => JsonRpcResponse::failure(Some(id), -32601, "Method not found"),
    };
    Json(body).into_response()
}

async fn msgstream(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    state.stream_queries.lock().push(query);
    match state.stream_hits.fetch_add(1, Ordering::SeqCst) {
        0 => r#"{"m1":[["ping"]],"m2":[["chat",{"text":"hey"}]]}"#.to_owned(),
        _ => {
            // Hold the poll briefly, as a long-polling server would.
            tokio::time::sleep(Duration::from_millis(50)).await;
            "HB".to_owned()
        }
    }
}

async fn start_mini_mage() -> (SocketAddr, Arc<ServerState>) {
    let state = Arc::new(ServerState::default());
    let app = Router::new()
        .route("/msgstream", get(msgstream))
        .route("/:app/jsonrpc", post(jsonrpc))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn client_for(addr: SocketAddr) -> MageClient {
    MageClientBuilder::new()
        .protocol("http")
        .domain(addr.to_string())
        .application("game")
        .error_delay(Duration::from_millis(20))
        .build()
        .unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn call_roundtrip_with_session_header() {
    let (addr, state) = start_mini_mage().await;
    let client = client_for(addr);

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.add_observer(Arc::new(move |name: &str, payload: Option<&Value>| {
        let _ = tx.send((name.to_owned(), payload.cloned()));
    }));

    let out = client.call("echo", json!({"msg": "hi"})).await.unwrap();
    assert_eq!(out, json!({"result": "hi"}));
    assert_eq!(rx.try_recv().unwrap(), ("greet".to_owned(), None));

    client.set_session("sk-42");
    client.call("echo", json!({"msg": "again"})).await.unwrap();
    client.clear_session();
    client.call("echo", json!({"msg": "bye"})).await.unwrap();

    assert_eq!(
        *state.sessions.lock(),
        vec![None, Some("sk-42".to_owned()), None]
    );
}

#[tokio::test]
async fn server_and_application_errors_are_typed() {
    let (addr, _state) = start_mini_mage().await;
    let client = client_for(addr);

    let err = client.call("nope", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Rpc { code: -32601, .. }));

    let err = client.call("login", json!({"user": "a"})).await.unwrap_err();
    assert!(matches!(err, Error::Application { ref code } if code == "BAD_PASSWORD"));

    client.set_application("broken");
    let err = client.call("echo", json!({"msg": "x"})).await.unwrap_err();
    assert!(matches!(err, Error::Rpc { code: -32003, .. }));
}

#[tokio::test]
async fn unreachable_server_is_a_connector_error() {
    let client = MageClientBuilder::new()
        .domain("127.0.0.1:1")
        .build()
        .unwrap();
    let err = client.call("echo", json!({})).await.unwrap_err();
    assert!(matches!(err, Error::Rpc { code: -32003, .. }));
}

#[tokio::test]
async fn stream_events_arrive_and_are_confirmed() {
    let (addr, state) = start_mini_mage().await;
    let client = client_for(addr);
    client.set_session("sk");

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.add_observer(Arc::new(move |name: &str, payload: Option<&Value>| {
        let _ = tx.send((name.to_owned(), payload.cloned()));
    }));

    client.start_polling(PollTransport::LongPolling).unwrap();

    let mut received = Vec::new();
    for _ in 0..2 {
        let ev = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        received.push(ev);
    }
    assert_eq!(
        received,
        vec![
            ("ping".to_owned(), None),
            ("chat".to_owned(), Some(json!({"text": "hey"}))),
        ]
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while state.stream_hits.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(client.stop_polling().await);

    let queries = state.stream_queries.lock().clone();
    assert_eq!(queries[0]["transport"], "longpolling");
    assert_eq!(queries[0]["sessionKey"], "sk");
    assert!(!queries[0].contains_key("confirmIds"));
    assert_eq!(queries[1]["confirmIds"], "m1,m2");
    // Heartbeats confirm nothing.
    assert!(!queries[2].contains_key("confirmIds"));
}
