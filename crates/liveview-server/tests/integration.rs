//! End-to-end tests using a real WebSocket client.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use liveview_core::HandlerError;
use liveview_server::session::{Session, SessionHooks, SessionSpec};
use liveview_server::{EventComponent, LiveviewServer, ServerConfig, SessionConfig};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn layout() -> EventComponent {
    EventComponent::markup(
        r#"<div id="out"></div><div id="answer"></div><input id="input1"/><button id="btn">go</button>"#,
    )
}

fn button() -> EventComponent {
    EventComponent::handlers()
        .on("Click", |session: Arc<Session>, payload: Value| async move {
            let _ = session.fill("out", format!("clicked:{payload}"));
            Ok(())
        })
        .on("Fail", |_, _| async { Err(HandlerError::failed("expected failure")) })
}

fn asker() -> EventComponent {
    EventComponent::handlers().on("Click", |session: Arc<Session>, _| async move {
        let value = session
            .query_value("input1")
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))?;
        let _ = session.fill("answer", value.as_str().unwrap_or_default().to_owned());
        Ok(())
    })
}

fn shouter() -> EventComponent {
    EventComponent::handlers().on("Click", |session: Arc<Session>, _| async move {
        let _ = session.broadcast("SHOUT").await;
        Ok(())
    })
}

fn quiet_sessions() -> SessionConfig {
    SessionConfig {
        settle_delay: Duration::from_secs(3600),
        tick_interval: Duration::from_secs(3600),
        query_timeout: Some(Duration::from_secs(5)),
    }
}

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// Boot a test server and return the WS URL plus the server.
async fn boot_server(destroyed: Arc<AtomicUsize>) -> (String, Arc<LiveviewServer>) {
    let factory = move || {
        let destroyed = Arc::clone(&destroyed);
        SessionSpec::new(layout())
            .mount("btn", button())
            .mount("ask", asker())
            .mount("shout", shouter())
            .hooks(
                SessionHooks::new()
                    .on_event(|session: Arc<Session>, message: Value| async move {
                        let _ = session.set_text("out", message.as_str().unwrap_or_default());
                    })
                    .on_destroy(move |_, _| {
                        let _ = destroyed.fetch_add(1, Ordering::SeqCst);
                        async {}
                    }),
            )
    };
    let server = Arc::new(LiveviewServer::new(test_config(), quiet_sessions(), factory));
    let addr = server.listen().await.unwrap();
    let ws_url = format!("ws://{addr}{}", server.config().ws_path);
    (ws_url, server)
}

async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn click(ws: &mut WsStream, id: &str, data: Value) {
    send_json(ws, json!({"type": "data", "id": id, "event": "Click", "data": data})).await;
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn root_is_committed_on_connect() {
    let (url, server) = boot_server(Arc::default()).await;
    let mut ws = connect(&url).await;

    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["type"], "fill");
    assert_eq!(frame["id"], "content");
    assert!(frame["value"].as_str().unwrap().contains(r#"<div id="out">"#));
    wait_until(|| server.registry().len() == 1).await;
}

#[tokio::test]
async fn click_dispatches_to_handler() {
    let (url, _server) = boot_server(Arc::default()).await;
    let mut ws = connect(&url).await;
    let _root = recv_json(&mut ws).await;

    click(&mut ws, "btn", Value::Null).await;
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame, json!({"type": "fill", "id": "out", "value": "clicked:null"}));
}

#[tokio::test]
async fn bad_frames_do_not_close_connection() {
    let (url, _server) = boot_server(Arc::default()).await;
    let mut ws = connect(&url).await;
    let _root = recv_json(&mut ws).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    send_json(&mut ws, json!({"type": "bogus"})).await;
    send_json(&mut ws, json!({"type": "data", "id": "ghost", "event": "Click"})).await;
    send_json(&mut ws, json!({"type": "data", "id": "btn", "event": "Fail"})).await;
    send_json(&mut ws, json!({"type": "get", "id_ret": "nobody", "data": 1})).await;

    click(&mut ws, "btn", json!("still here")).await;
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame["value"], "clicked:\"still here\"");
}

#[tokio::test]
async fn handler_query_round_trip() {
    let (url, _server) = boot_server(Arc::default()).await;
    let mut ws = connect(&url).await;
    let _root = recv_json(&mut ws).await;

    click(&mut ws, "ask", Value::Null).await;
    let request = recv_json(&mut ws).await;
    assert_eq!(request["type"], "get");
    assert_eq!(request["id"], "input1");
    assert_eq!(request["sub_type"], "value");

    send_json(
        &mut ws,
        json!({"type": "get", "id_ret": request["id_ret"], "data": "typed text"}),
    )
    .await;
    let frame = recv_json(&mut ws).await;
    assert_eq!(frame, json!({"type": "fill", "id": "answer", "value": "typed text"}));
}

#[tokio::test]
async fn broadcast_reaches_every_client() {
    let (url, server) = boot_server(Arc::default()).await;
    let mut a = connect(&url).await;
    let _ = recv_json(&mut a).await;
    let mut b = connect(&url).await;
    let _ = recv_json(&mut b).await;
    wait_until(|| server.registry().len() == 2).await;

    click(&mut a, "shout", Value::Null).await;
    for ws in [&mut a, &mut b] {
        let frame = recv_json(ws).await;
        assert_eq!(frame, json!({"type": "text", "id": "out", "value": "SHOUT"}));
    }
}

#[tokio::test]
async fn disconnect_tears_session_down_once() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let (url, server) = boot_server(Arc::clone(&destroyed)).await;
    let mut ws = connect(&url).await;
    let _ = recv_json(&mut ws).await;
    wait_until(|| server.registry().len() == 1).await;

    ws.close(None).await.unwrap();
    wait_until(|| server.registry().is_empty()).await;
    wait_until(|| destroyed.load(Ordering::SeqCst) == 1).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn health_reports_active_sessions() {
    let (url, server) = boot_server(Arc::default()).await;
    let mut ws = connect(&url).await;
    let _ = recv_json(&mut ws).await;
    wait_until(|| server.registry().len() == 1).await;

    let app = server.router();
    let req = axum::http::Request::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let resp = tower::ServiceExt::oneshot(app, req).await.unwrap();
    let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
    let parsed: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["active_sessions"], 1);
}

#[tokio::test]
async fn close_tears_down_sessions_and_stops_listening() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let (url, server) = boot_server(Arc::clone(&destroyed)).await;
    let mut ws = connect(&url).await;
    let _ = recv_json(&mut ws).await;
    wait_until(|| server.registry().len() == 1).await;

    let report = timeout(TIMEOUT, server.close()).await.expect("shutdown hung");
    assert_eq!(report.sessions_closed, 1);
    assert!(!report.timed_out);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(connect_async(url.as_str()).await.is_err());
}
