//! Error classification shared by every layer of the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an engine-level failure.
///
/// Variants that carry a JSON-RPC reserved code document it; the rest are
/// local-only and never cross the wire as a numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed JSON or JSON-RPC frame (-32700).
    ParseError,
    /// Well-formed JSON, ill-formed RPC envelope (-32600).
    InvalidRequest,
    /// No handler registered for this method (-32601).
    MethodNotFound,
    /// Params failed schema or type checks (-32602).
    InvalidParams,
    /// Handler failure or unexpected internal state (-32603).
    InternalError,
    /// A method was called before the initialize handshake completed.
    NotInitialized,
    /// The awaited response never arrived before the deadline.
    Timeout,
    /// The caller (or a peer) cancelled an in-flight request.
    Cancelled,
    /// The underlying transport closed while a request was outstanding.
    TransportClosed,
    /// The server no longer recognizes a previously valid session id.
    SessionLost,
    /// The transport's outbound buffer is saturated.
    BackpressureFull,
}

impl ErrorKind {
    /// The JSON-RPC reserved numeric code for this kind, if it has one.
    ///
    /// Kinds with no wire representation (`NotInitialized`, `Timeout`, ...)
    /// are surfaced to local callers only and never serialized as a code;
    /// callers that must put *something* on the wire use [`Self::internal_error`].
    #[must_use]
    pub fn code(self) -> Option<i64> {
        match self {
            Self::ParseError => Some(-32700),
            Self::InvalidRequest => Some(-32600),
            Self::MethodNotFound => Some(-32601),
            Self::InvalidParams => Some(-32602),
            Self::InternalError => Some(-32603),
            _ => None,
        }
    }

    /// The fallback reserved code used when a local-only kind must be
    /// reported over the wire anyway (e.g. a handler panic).
    #[must_use]
    pub const fn internal_error() -> i64 {
        -32603
    }
}

/// Engine error type.
///
/// Mirrors the shape other `protomcp-*` crates use for their own error
/// enums: a `thiserror` enum carrying just enough structure to recover the
/// [`ErrorKind`] and a human message, nothing heavier.
#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct Error {
    /// Classification used by callers for programmatic recovery.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl Error {
    /// Construct an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for [`ErrorKind::ParseError`].
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseError, message)
    }

    /// Shorthand for [`ErrorKind::InvalidRequest`].
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Shorthand for [`ErrorKind::MethodNotFound`].
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(ErrorKind::MethodNotFound, format!("unknown method: {}", method.into()))
    }

    /// Shorthand for [`ErrorKind::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParams, message)
    }

    /// Shorthand for [`ErrorKind::InternalError`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    /// Shorthand for [`ErrorKind::NotInitialized`].
    pub fn not_initialized() -> Self {
        Self::new(ErrorKind::NotInitialized, "handshake not yet complete")
    }

    /// Shorthand for [`ErrorKind::Timeout`].
    pub fn timeout() -> Self {
        Self::new(ErrorKind::Timeout, "operation timed out")
    }

    /// Shorthand for [`ErrorKind::Cancelled`].
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    /// Shorthand for [`ErrorKind::TransportClosed`].
    pub fn transport_closed() -> Self {
        Self::new(ErrorKind::TransportClosed, "transport closed")
    }

    /// Shorthand for [`ErrorKind::SessionLost`].
    pub fn session_lost() -> Self {
        Self::new(ErrorKind::SessionLost, "session id not recognized by server")
    }
}
