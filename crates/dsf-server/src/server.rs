//! Object model IPC server.
//!
//! This module provides the WebSocket server that handles:
//! - Client connections
//! - Hello message on connect
//! - Filtered subscriptions with full or patch updates
//! - Single value queries

use std::net::SocketAddr;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use dsf_core::{Filter, FilterError, ObjectModelStore, ServerSettings};
use dsf_protocol::codec::{error_message, model_message};
use dsf_protocol::{
    decode_client_message, encode_server_message, ClientMessage, CodecError, HelloMessage,
    QueryRequest, QueryResult, ServerMessage, SubscribeRequest, SubscriptionMode,
};

use crate::provider::{ChangeSet, ModelProvider};
use crate::subscription::{query, SubscriptionManager};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Errors that can occur while serving clients.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("Invalid default filters: {0}")]
    InvalidFilters(#[from] FilterError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Configuration for the object model server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name sent in Hello message.
    pub name: String,
    /// Server version sent in Hello message.
    pub version: String,
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Filters used when a subscription does not name any.
    pub default_filters: Vec<Filter>,
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Result<Self, ServerError> {
        let bind_addr = settings
            .bind_address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(settings.bind_address.clone()))?;

        Ok(Self {
            name: settings.server_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bind_addr,
            default_filters: settings.default_filters()?,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "dsf-rs".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9888)),
            default_filters: Vec::new(),
        }
    }
}

/// The object model server.
pub struct ObjectModelServer {
    config: ServerConfig,
    provider: ModelProvider,
}

impl ObjectModelServer {
    pub fn new(config: ServerConfig, provider: ModelProvider) -> Self {
        Self { config, provider }
    }

    /// Get a handle to the served object model.
    pub fn provider(&self) -> ModelProvider {
        self.provider.clone()
    }

    /// Run the server, listening for WebSocket connections.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Object model server listening on {}", self.config.bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let config = self.config.clone();
                    let provider = self.provider.clone();
                    let changes_rx = provider.subscribe();

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, addr, config, provider, changes_rx).await
                        {
                            error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Per-connection state.
struct Connection {
    addr: SocketAddr,
    config: ServerConfig,
    provider: ModelProvider,
    subscription: Option<SubscriptionManager>,
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: ServerConfig,
    provider: ModelProvider,
    mut changes_rx: broadcast::Receiver<ChangeSet>,
) -> Result<(), ServerError> {
    info!("New connection from {}", addr);

    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // Send Hello message
    let client_id = Uuid::new_v4();
    let hello = HelloMessage::new(&config.name, &config.version, client_id.to_string());
    send(&mut ws_tx, &ServerMessage::Hello(hello)).await?;
    debug!(%client_id, "Sent Hello to {}", addr);

    let mut connection = Connection {
        addr,
        config,
        provider,
        subscription: None,
    };

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        connection.handle_client_message(&text, &mut ws_tx).await?;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        send(&mut ws_tx, &error_message(CodecError::BinaryFrame)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} closed connection", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_tx.send(Message::Pong(data)).await?;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    _ => {} // Ignore other message types
                }
            }

            // Handle model changes
            set = changes_rx.recv() => {
                match set {
                    Ok(set) => connection.handle_changes(&set, &mut ws_tx).await?,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} lagged {} change sets", addr, n);
                        connection.resync(&mut ws_tx).await?;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Change channel closed");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}

impl Connection {
    /// Handle a message received from a client.
    ///
    /// Requests that cannot be processed are answered with an error message.
    async fn handle_client_message(
        &mut self,
        text: &str,
        ws_tx: &mut WsSink,
    ) -> Result<(), ServerError> {
        let msg = match decode_client_message(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Invalid message from {}: {}", self.addr, e);
                return send(ws_tx, &error_message(e)).await;
            }
        };

        match msg {
            ClientMessage::Subscribe(req) => self.subscribe(req, ws_tx).await,
            ClientMessage::Query(req) => self.query(req, ws_tx).await,
        }
    }

    async fn subscribe(
        &mut self,
        req: SubscribeRequest,
        ws_tx: &mut WsSink,
    ) -> Result<(), ServerError> {
        let subscription = if req.filters.is_empty() {
            Ok(SubscriptionManager::with_filters(
                req.subscribe,
                self.config.default_filters.clone(),
            ))
        } else {
            SubscriptionManager::new(req.subscribe, &req.filters)
        };

        let subscription = match subscription {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!("Rejected subscription from {}: {}", self.addr, e);
                return send(ws_tx, &error_message(e)).await;
            }
        };
        debug!(
            mode = ?subscription.mode(),
            filters = subscription.filters().len(),
            "Client {} subscribed",
            self.addr
        );

        self.subscription = Some(subscription);
        self.resync(ws_tx).await
    }

    async fn query(&self, req: QueryRequest, ws_tx: &mut WsSink) -> Result<(), ServerError> {
        let result = {
            let model = self.provider.read().await;
            query(&*model, &req.query, req.restricted_only)
        };

        let msg = match result {
            Ok(value) => ServerMessage::QueryResult(QueryResult {
                path: req.query,
                found: value.is_some(),
                result: value.unwrap_or_default(),
            }),
            Err(e) => error_message(e),
        };
        send(ws_tx, &msg).await
    }

    /// Send the complete filtered model.
    async fn resync(&self, ws_tx: &mut WsSink) -> Result<(), ServerError> {
        let Some(subscription) = &self.subscription else {
            return Ok(());
        };

        let msg = {
            let model = self.provider.read().await;
            let filtered = subscription.initial_model(&*model);
            model_message(SubscriptionMode::Full, model.sequence(), &filtered)
        };
        send(ws_tx, &msg).await
    }

    async fn handle_changes(
        &self,
        set: &ChangeSet,
        ws_tx: &mut WsSink,
    ) -> Result<(), ServerError> {
        let Some(subscription) = &self.subscription else {
            return Ok(());
        };

        let msg = {
            let model = self.provider.read().await;
            subscription
                .update(&*model, &set.changes)
                .map(|update| model_message(subscription.mode(), set.sequence, &update))
        };

        match msg {
            Some(msg) => send(ws_tx, &msg).await,
            None => Ok(()),
        }
    }
}

async fn send(ws_tx: &mut WsSink, msg: &ServerMessage) -> Result<(), ServerError> {
    let text = encode_server_message(msg)?;
    ws_tx.send(Message::Text(text)).await?;
    Ok(())
}
