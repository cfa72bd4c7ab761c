//! Wire-level foundation for the Model Context Protocol engine: JSON-RPC
//! 2.0 framing, request ids, error classification, and the MCP domain
//! types carried as request params / results.
//!
//! This crate has no transport, no async runtime, and no notion of a
//! session — it is the part of the stack every other `protomcp-*` crate
//! depends on.

pub mod cancel;
pub mod error;
pub mod jsonrpc;
pub mod method;
pub mod types;

pub use cancel::CancellationToken;
pub use error::{Error, ErrorKind, Result};
pub use jsonrpc::{
    decode, encode, Frame, JsonRpcVersion, Message, Notification, Request, RequestId, Response,
    ResponsePayload, RpcError,
};
pub use types::PROTOCOL_VERSION;
