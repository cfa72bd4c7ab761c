//! The transport contract the engines program against (§4.2).

use async_trait::async_trait;
use protomcp_core::Frame;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::TransportResult;

/// Current lifecycle state of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Failed { reason: String },
}

/// Which of the four concrete transports this is. Mostly useful for
/// logging and metrics tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Sse,
    StreamableHttp,
    InProcess,
}

/// Context handed to [`Transport::start`]; currently just a label used in
/// logs and error messages, but exists as a seam for auth headers or other
/// pass-through configuration the spec places outside the core's scope.
#[derive(Debug, Clone, Default)]
pub struct StartContext {
    pub label: Option<String>,
}

/// The asynchronous byte-carrier abstraction engines send/receive JSON-RPC
/// frames through. One reader task and one writer task own the underlying
/// I/O; everything else talks to this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Current lifecycle state.
    async fn state(&self) -> TransportState;

    /// Begin I/O. Idempotent after the first successful call.
    async fn start(&self, ctx: StartContext) -> TransportResult<()>;

    /// Enqueue an outgoing frame. Non-blocking up to a bounded buffer;
    /// fails fast with `BackpressureFull` or `Closed` rather than block.
    async fn send(&self, frame: Frame) -> TransportResult<()>;

    /// Take ownership of the inbound frame stream. Each transport instance
    /// yields this receiver exactly once; later calls return `None`.
    /// The channel closes when the transport closes; see
    /// [`Transport::error_signal`] for fatal out-of-band errors.
    fn take_receiver(&self) -> Option<mpsc::Receiver<Frame>>;

    /// A side channel reporting fatal transport-level errors (distinct
    /// from the receive channel closing normally).
    fn take_error_signal(&self) -> Option<mpsc::Receiver<crate::error::TransportError>>;

    /// Initiate shutdown: drain pending sends up to an internal deadline,
    /// then cancel the rest with `Closed`.
    async fn close(&self) -> TransportResult<()>;
}
