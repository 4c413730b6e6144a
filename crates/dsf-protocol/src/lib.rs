//! # dsf-protocol
//!
//! IPC message types and codec.
//!
//! This crate defines the JSON messages exchanged between the object model
//! server and its clients over WebSocket text frames.

pub mod codec;
pub mod messages;

pub use codec::{decode_client_message, encode_server_message, CodecError};
pub use messages::*;
