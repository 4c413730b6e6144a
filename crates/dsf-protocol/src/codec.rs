//! Message codec for the IPC protocol.
//!
//! Messages are JSON documents carried in WebSocket text frames. This module
//! provides encoding and decoding utilities for the protocol messages.

use crate::messages::{ClientMessage, ErrorMessage, ModelUpdate, ServerMessage, SubscriptionMode};
use dsf_core::ModelNode;
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization failed.
    #[error("Failed to serialize message: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Received binary frame instead of text.
    #[error("Expected text frame, received binary")]
    BinaryFrame,
}

/// Encode a server message to JSON string for transmission.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(CodecError::from)
}

/// Decode a client message from JSON string.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::from)
}

/// Build a model update message from a filtered model.
pub fn model_message(mode: SubscriptionMode, sequence: u64, model: &ModelNode) -> ServerMessage {
    ServerMessage::Model(ModelUpdate {
        update: mode,
        sequence,
        model: model.to_json(),
    })
}

/// Build an error message.
pub fn error_message(error: impl ToString) -> ServerMessage {
    ServerMessage::Error(ErrorMessage::new(error))
}
