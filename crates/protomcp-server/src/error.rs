//! Server-facing error type, mirroring [`protomcp_client::ClientError`]'s
//! shape on the other side of the wire.

use thiserror::Error;

pub type ServerResult<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Clone, Error)]
#[error(transparent)]
pub struct ServerError(#[from] pub protomcp_core::Error);

impl ServerError {
    #[must_use]
    pub fn kind(&self) -> protomcp_core::ErrorKind {
        self.0.kind
    }
}

impl From<ServerError> for protomcp_core::RpcError {
    fn from(e: ServerError) -> Self {
        (&e.0).into()
    }
}
