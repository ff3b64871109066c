#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use chatwire_client::config;
use chatwire_client::credentials::StaticCredentials;
use chatwire_client::store::MemoryStore;
use chatwire_client::{ChatClient, ConnectionState};

#[derive(Default)]
struct TestServer {
    connections: AtomicUsize,
    tokens: Mutex<Vec<String>>,
    hang_up_first: bool,
}

async fn upgrade(
    ws: WebSocketUpgrade,
    Query(q): Query<HashMap<String, String>>,
    State(server): State<Arc<TestServer>>,
) -> Response {
    let n = server.connections.fetch_add(1, Ordering::SeqCst);
    if let Some(t) = q.get("token") {
        server.tokens.lock().unwrap().push(t.clone());
    }
    let hang_up = server.hang_up_first && n == 0;
    ws.on_upgrade(move |socket| serve_socket(socket, hang_up))
}

async fn serve_socket(mut socket: WebSocket, hang_up: bool) {
    if hang_up {
        let _ = socket.send(Message::Close(None)).await;
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let v: Value = serde_json::from_str(&text).unwrap();
        let reply = match v["type"].as_str() {
            Some("ping") => json!({ "type": "pong" }),
            Some("send_message") => json!({
                "type": "new_message",
                "payload": v["payload"].clone(),
                "timestamp": "2024-05-01T12:00:00Z",
            }),
            _ => continue,
        };
        if socket.send(Message::Text(reply.to_string())).await.is_err() {
            break;
        }
    }
}

async fn start(server: Arc<TestServer>) -> SocketAddr {
    let app = Router::new()
        .route("/messenger/ws", get(upgrade))
        .with_state(server);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client_for(addr: SocketAddr) -> ChatClient {
    let yaml = format!(
        r#"
version: 1
endpoint:
  origin: "http://{addr}"
reconnect:
  base_delay_ms: 50
  max_delay_ms: 200
"#
    );
    let cfg = config::load_from_str(&yaml).unwrap();
    ChatClient::builder(cfg, StaticCredentials::new("secret"))
        .store(MemoryStore::new())
        .build()
        .unwrap()
}

#[tokio::test]
async fn round_trip_over_websocket() {
    let server = Arc::new(TestServer::default());
    let addr = start(Arc::clone(&server)).await;
    let c = client_for(addr);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _sub = c.on("new_message", move |payload, _| {
        let _ = tx.send(payload.clone());
    });

    c.connect("secret").await.unwrap();
    assert!(c.is_connected());
    c.send_message(42, "hello", "text").unwrap();

    let got = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no echo")
        .unwrap();
    assert_eq!(got["content"], "hello");
    assert_eq!(got["room_id"], 42);
    assert_eq!(*server.tokens.lock().unwrap(), vec!["secret".to_string()]);

    c.disconnect().await;
    assert_eq!(c.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn server_hang_up_triggers_reconnect() {
    let server = Arc::new(TestServer {
        hang_up_first: true,
        ..TestServer::default()
    });
    let addr = start(Arc::clone(&server)).await;
    let c = client_for(addr);

    c.connect("secret").await.unwrap();

    let reconnected = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if server.connections.load(Ordering::SeqCst) >= 2 && c.is_connected() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "client did not come back");
    assert_eq!(server.tokens.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn refused_connection_fails_the_caller() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let c = client_for(addr);
    let err = c.connect("secret").await.expect_err("nothing listening");
    assert_eq!(err.code().as_str(), "TRANSPORT");
    assert_eq!(c.state(), ConnectionState::Reconnecting);
    c.disconnect().await;
}
