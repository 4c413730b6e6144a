//! Protocol message types for IPC communication.
//!
//! This module defines all message types exchanged with the object model server:
//! - Server → Client: Hello, ModelUpdate, QueryResult, Error
//! - Client → Server: Subscribe, Query
//!
//! Messages are serialized as JSON over WebSocket text frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How model updates are delivered to a subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionMode {
    /// Every update carries the complete filtered model
    Full,
    /// Updates only carry the parts covered by the changed paths
    #[default]
    Patch,
}

/// Subscription request message.
///
/// # Example
/// ```json
/// { "subscribe": "patch", "filters": ["state.status", "move/axes[*]/**"] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    pub subscribe: SubscriptionMode,

    /// Filter expressions. Each entry may itself be a delimited filter list.
    #[serde(default)]
    pub filters: Vec<String>,
}

/// Exact lookup of a single value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    /// Wildcard-free path, e.g. `global.enableBroadcast`
    pub query: String,

    /// Only return values below a restricted property
    #[serde(default)]
    pub restricted_only: bool,
}

// ============================================================================
// Hello Message (Server → Client on connect)
// ============================================================================

/// Hello message sent by server immediately on connection.
///
/// # Example
/// ```json
/// {
///   "name": "dsf-rs",
///   "version": "0.1.0",
///   "clientId": "9b2f5d8e-2a38-4f0c-a6de-0d6f7c1f3b11",
///   "timestamp": "2024-01-17T10:30:00.000Z"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloMessage {
    /// Server name identifier.
    pub name: String,

    /// Server version.
    pub version: String,

    /// Identifier assigned to this connection.
    pub client_id: String,

    /// Current server timestamp in ISO 8601 format.
    pub timestamp: String,
}

impl HelloMessage {
    /// Create a new Hello message.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            client_id: client_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        }
    }
}

/// Filtered object model pushed to a subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelUpdate {
    /// `full` for complete filtered models, `patch` for partial ones
    pub update: SubscriptionMode,

    /// Number of model mutations applied when this update was built
    pub sequence: u64,

    pub model: Value,
}

/// Result of a [`QueryRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub path: String,
    pub found: bool,
    pub result: Value,
}

/// Error report. The connection stays open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}

impl ErrorMessage {
    pub fn new(error: impl ToString) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

// ============================================================================
// Unified Message Enums
// ============================================================================

/// Messages that can be sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Hello message sent on connection.
    Hello(HelloMessage),

    /// Filtered object model.
    Model(ModelUpdate),

    /// Response to a query.
    QueryResult(QueryResult),

    /// Request could not be processed.
    Error(ErrorMessage),
}

/// Messages that can be received from client.
///
/// Uses untagged deserialization - the message type is determined by
/// examining which fields are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Subscribe to object model updates.
    Subscribe(SubscribeRequest),

    /// Look up a single value.
    Query(QueryRequest),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_serialization() {
        let hello = HelloMessage::new("test-server", "0.1.0", "client-1");
        let json = serde_json::to_string(&hello).unwrap();

        assert!(json.contains("\"name\":\"test-server\""));
        assert!(json.contains("\"version\":\"0.1.0\""));
        assert!(json.contains("\"clientId\":\"client-1\""));
        assert!(json.contains("\"timestamp\":"));
    }

    #[test]
    fn test_subscribe_deserialization() {
        let json = r#"{
            "subscribe": "full",
            "filters": ["state.status", "move/axes[*]/**"]
        }"#;

        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Subscribe(req) => {
                assert_eq!(req.subscribe, SubscriptionMode::Full);
                assert_eq!(req.filters.len(), 2);
                assert_eq!(req.filters[1], "move/axes[*]/**");
            }
            _ => panic!("Expected Subscribe message"),
        }
    }

    #[test]
    fn test_subscribe_without_filters() {
        let msg: ClientMessage = serde_json::from_str(r#"{"subscribe": "patch"}"#).unwrap();
        match msg {
            ClientMessage::Subscribe(req) => {
                assert_eq!(req.subscribe, SubscriptionMode::Patch);
                assert!(req.filters.is_empty());
            }
            _ => panic!("Expected Subscribe message"),
        }
    }

    #[test]
    fn test_query_deserialization() {
        let json = r#"{"query": "sbc.cpu.temperature", "restrictedOnly": true}"#;

        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Query(req) => {
                assert_eq!(req.query, "sbc.cpu.temperature");
                assert!(req.restricted_only);
            }
            _ => panic!("Expected Query message"),
        }
    }

    #[test]
    fn test_model_update_serialization() {
        let msg = ServerMessage::Model(ModelUpdate {
            update: SubscriptionMode::Patch,
            sequence: 7,
            model: serde_json::json!({"state": {"status": "idle"}}),
        });
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["update"], "patch");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["model"]["state"]["status"], "idle");
    }
}
