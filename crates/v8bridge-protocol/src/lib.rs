//! v8bridge-protocol: wire types and framing for the V8 debugger protocol.
//!
//! The V8 remote debugger speaks JSON messages framed with a
//! `Content-Length` header, the same framing the Debug Adapter Protocol
//! uses. This crate holds the message structures, command arguments,
//! reply bodies and the encoder/decoder for that framing.

pub mod error;
pub mod protocol;
pub mod transport;

pub use error::ProtocolError;
pub use protocol::*;
pub use transport::{decode_message, encode_message, Frame};
