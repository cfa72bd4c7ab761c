//! In-process transport: client and server share a pair of bounded
//! in-memory channels, frames crossing without serialization. Exists for
//! testing and embedded use (§4.2 "In-process transport").

use async_trait::async_trait;
use parking_lot::Mutex;
use protomcp_core::Frame;
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};
use crate::traits::{StartContext, Transport, TransportKind, TransportState};

const DEFAULT_CAPACITY: usize = 256;

struct Inner {
    state: Mutex<TransportState>,
    outbound: mpsc::Sender<Frame>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    error_rx: Mutex<Option<mpsc::Receiver<TransportError>>>,
    error_tx: mpsc::Sender<TransportError>,
}

/// One end of an in-process pair. Cloning is cheap (it's an `Arc` handle).
pub struct InProcessTransport {
    inner: std::sync::Arc<Inner>,
}

impl InProcessTransport {
    /// Build a connected client/server pair sharing bounded channels.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        Self::pair_with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn pair_with_capacity(capacity: usize) -> (Self, Self) {
        let (a_to_b, b_from_a) = mpsc::channel(capacity);
        let (b_to_a, a_from_b) = mpsc::channel(capacity);
        let (a_err_tx, a_err_rx) = mpsc::channel(8);
        let (b_err_tx, b_err_rx) = mpsc::channel(8);

        let a = Self {
            inner: std::sync::Arc::new(Inner {
                state: Mutex::new(TransportState::Connected),
                outbound: a_to_b,
                inbound_rx: Mutex::new(Some(a_from_b)),
                error_rx: Mutex::new(Some(a_err_rx)),
                error_tx: a_err_tx,
            }),
        };
        let b = Self {
            inner: std::sync::Arc::new(Inner {
                state: Mutex::new(TransportState::Connected),
                outbound: b_to_a,
                inbound_rx: Mutex::new(Some(b_from_a)),
                error_rx: Mutex::new(Some(b_err_rx)),
                error_tx: b_err_tx,
            }),
        };
        (a, b)
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::InProcess
    }

    async fn state(&self) -> TransportState {
        self.inner.state.lock().clone()
    }

    async fn start(&self, _ctx: StartContext) -> TransportResult<()> {
        *self.inner.state.lock() = TransportState::Connected;
        Ok(())
    }

    async fn send(&self, frame: Frame) -> TransportResult<()> {
        self.inner
            .outbound
            .try_send(frame)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::BackpressureFull,
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<Frame>> {
        self.inner.inbound_rx.lock().take()
    }

    fn take_error_signal(&self) -> Option<mpsc::Receiver<TransportError>> {
        self.inner.error_rx.lock().take()
    }

    async fn close(&self) -> TransportResult<()> {
        *self.inner.state.lock() = TransportState::Disconnecting;
        let _ = self
            .inner
            .error_tx
            .try_send(TransportError::Closed);
        *self.inner.state.lock() = TransportState::Disconnected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protomcp_core::{Message, Request, RequestId};

    #[tokio::test]
    async fn frames_cross_the_pair() {
        let (client, server) = InProcessTransport::pair();
        let mut server_rx = server.take_receiver().unwrap();

        let req = Request::new(RequestId::Number(1), "ping", None);
        client
            .send(Frame::Single(Message::Request(req)))
            .await
            .unwrap();

        let got = server_rx.recv().await.unwrap();
        match got {
            Frame::Single(Message::Request(r)) => assert_eq!(r.method, "ping"),
            _ => panic!("unexpected frame"),
        }
    }

    #[tokio::test]
    async fn close_surfaces_on_error_signal() {
        let (client, _server) = InProcessTransport::pair();
        let mut errs = client.take_error_signal().unwrap();
        client.close().await.unwrap();
        let e = errs.recv().await.unwrap();
        assert!(matches!(e, TransportError::Closed));
    }
}
