//! Transport-layer error type.
//!
//! Deliberately flatter than [`protomcp_core::Error`]: transports only need
//! to tell the correlator *why* a send/receive failed, not carry the rich
//! per-kind taxonomy the protocol layer uses for JSON-RPC codes.

use thiserror::Error;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    #[error("outbound buffer full")]
    BackpressureFull,

    #[error("transport closed")]
    Closed,

    #[error("operation timed out")]
    Timeout,

    #[error("session lost: {0}")]
    SessionLost(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<protomcp_core::Error> for TransportError {
    fn from(e: protomcp_core::Error) -> Self {
        Self::Serialization(e.message)
    }
}

impl From<TransportError> for protomcp_core::Error {
    fn from(e: TransportError) -> Self {
        use protomcp_core::ErrorKind;
        let kind = match &e {
            TransportError::Closed => ErrorKind::TransportClosed,
            TransportError::SessionLost(_) => ErrorKind::SessionLost,
            TransportError::Timeout => ErrorKind::Timeout,
            TransportError::BackpressureFull => ErrorKind::BackpressureFull,
            _ => ErrorKind::InternalError,
        };
        protomcp_core::Error::new(kind, e.to_string())
    }
}
