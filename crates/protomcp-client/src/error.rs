//! Client-facing error type: a thin wrapper around [`protomcp_core::Error`]
//! so callers outside this crate don't need to depend on `protomcp-core`
//! directly for everyday error matching.

use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct ClientError(#[from] pub protomcp_core::Error);

impl ClientError {
    #[must_use]
    pub fn kind(&self) -> protomcp_core::ErrorKind {
        self.0.kind
    }
}

impl From<protomcp_transport::TransportError> for ClientError {
    fn from(e: protomcp_transport::TransportError) -> Self {
        Self(e.into())
    }
}
