//! Integration tests for the object model server.
//!
//! These tests start an actual server and connect with a WebSocket client
//! to verify end-to-end functionality.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;

use dsf_core::{Filter, PathElement};
use dsf_server::{ModelProvider, ObjectModelServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Find an available port for testing.
async fn find_available_port() -> SocketAddr {
    // Bind to port 0 to get an available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start a test server and return the address and model provider.
async fn start_test_server(
    default_filters: &[&str],
) -> (SocketAddr, ModelProvider, tokio::task::JoinHandle<()>) {
    let addr = find_available_port().await;

    let config = ServerConfig {
        name: "test-server".to_string(),
        version: "0.1.0".to_string(),
        bind_addr: addr,
        default_filters: default_filters
            .iter()
            .map(|f| Filter::new(f).unwrap())
            .collect(),
    };

    let server = ObjectModelServer::new(config, ModelProvider::default());
    let provider = server.provider();

    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, provider, handle)
}

/// Connect a WebSocket client and skip the Hello message.
async fn connect_client(addr: SocketAddr) -> Client {
    let url = format!("ws://{}", addr);
    let (mut ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect");
    let _ = recv_json(&mut ws_stream).await.expect("Should receive Hello");
    ws_stream
}

/// Wait for a text message with timeout.
async fn recv_text(ws: &mut Client) -> Result<String, &'static str> {
    match timeout(Duration::from_secs(5), ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => Ok(text),
        Ok(Some(Ok(_))) => Err("Unexpected message type"),
        Ok(Some(Err(_))) => Err("WebSocket error"),
        Ok(None) => Err("Connection closed"),
        Err(_) => Err("Timeout"),
    }
}

async fn recv_json(ws: &mut Client) -> Result<Value, &'static str> {
    let text = recv_text(ws).await?;
    serde_json::from_str(&text).map_err(|_| "Invalid JSON")
}

async fn send_json(ws: &mut Client, msg: Value) {
    ws.send(Message::Text(msg.to_string())).await.unwrap();
}

fn status_path() -> Vec<PathElement> {
    vec![PathElement::name("state"), PathElement::name("status")]
}

#[tokio::test]
async fn test_hello_message_on_connect() {
    let (addr, _provider, handle) = start_test_server(&[]).await;

    let url = format!("ws://{}", addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    // First message should be Hello
    let hello = recv_json(&mut ws).await.expect("Should receive Hello");
    assert_eq!(hello["name"], "test-server");
    assert_eq!(hello["version"], "0.1.0");
    assert!(hello["clientId"].is_string());
    assert!(hello["timestamp"].is_string());

    // Clean up
    ws.close(None).await.ok();
    handle.abort();
}

#[tokio::test]
async fn test_patch_subscription() {
    let (addr, provider, handle) = start_test_server(&[]).await;
    let mut ws = connect_client(addr).await;

    send_json(
        &mut ws,
        json!({"subscribe": "patch", "filters": ["state.status", "global/**"]}),
    )
    .await;

    let initial = recv_json(&mut ws).await.expect("Should receive initial model");
    assert_eq!(initial["update"], "full");
    assert_eq!(
        initial["model"],
        json!({"state": {"status": null}, "global": {}})
    );

    // Unrelated change is not forwarded
    provider
        .write()
        .await
        .set(&[PathElement::name("state"), PathElement::name("upTime")], 12i64)
        .unwrap();
    provider.write().await.set(&status_path(), "busy").unwrap();

    let patch = recv_json(&mut ws).await.expect("Should receive patch");
    assert_eq!(patch["update"], "patch");
    assert_eq!(patch["sequence"], 2);
    assert_eq!(patch["model"], json!({"state": {"status": "busy"}}));

    provider
        .write()
        .await
        .set_global("enableBroadcast", true)
        .unwrap();
    let patch = recv_json(&mut ws).await.expect("Should receive patch");
    assert_eq!(patch["model"], json!({"global": {"enableBroadcast": true}}));

    ws.close(None).await.ok();
    handle.abort();
}

#[tokio::test]
async fn test_full_subscription_with_default_filters() {
    let (addr, provider, handle) = start_test_server(&["state.status", "state.upTime"]).await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"subscribe": "full"})).await;
    let _ = recv_json(&mut ws).await.expect("Should receive initial model");

    {
        let mut model = provider.write().await;
        model.set(&status_path(), "processing").unwrap();
        model
            .set(&[PathElement::name("state"), PathElement::name("upTime")], 5i64)
            .unwrap();
    }

    let update = recv_json(&mut ws).await.expect("Should receive update");
    assert_eq!(update["update"], "full");
    assert_eq!(
        update["model"],
        json!({"state": {"status": "processing", "upTime": 5}})
    );

    ws.close(None).await.ok();
    handle.abort();
}

#[tokio::test]
async fn test_query() {
    let (addr, provider, handle) = start_test_server(&[]).await;
    provider
        .write()
        .await
        .set_global("machineName", "printer")
        .unwrap();

    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"query": "global.machineName"})).await;
    let result = recv_json(&mut ws).await.unwrap();
    assert_eq!(result["path"], "global.machineName");
    assert_eq!(result["found"], true);
    assert_eq!(result["result"], "printer");

    send_json(
        &mut ws,
        json!({"query": "global.machineName", "restrictedOnly": true}),
    )
    .await;
    let result = recv_json(&mut ws).await.unwrap();
    assert_eq!(result["found"], false);
    assert_eq!(result["result"], Value::Null);

    ws.close(None).await.ok();
    handle.abort();
}

#[tokio::test]
async fn test_errors_keep_connection_open() {
    let (addr, _provider, handle) = start_test_server(&[]).await;
    let mut ws = connect_client(addr).await;

    send_json(&mut ws, json!({"subscribe": "patch", "filters": ["tools[0,1]"]})).await;
    let error = recv_json(&mut ws).await.unwrap();
    assert!(error["error"].as_str().unwrap().contains("tools[0,1]"));

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    let error = recv_json(&mut ws).await.unwrap();
    assert!(error["error"].is_string());

    // Still usable afterwards
    send_json(&mut ws, json!({"query": "state.status"})).await;
    let result = recv_json(&mut ws).await.unwrap();
    assert_eq!(result["found"], true);

    ws.close(None).await.ok();
    handle.abort();
}
