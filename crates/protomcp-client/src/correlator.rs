//! Request correlator (§4.3): pairs outgoing requests with incoming
//! responses by id, routes notifications and server-initiated requests to
//! registered handlers, enforces timeout/cancellation.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use protomcp_core::{method, CancellationToken, Frame, Message, RequestId, Response};
use protomcp_transport::{Transport, TransportState};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tracing::{debug, instrument, trace, warn};

use crate::error::{ClientError, ClientResult};

/// Called for every inbound notification the correlator is not itself
/// consuming (everything except `$/cancelled`, which it handles directly).
pub type NotificationHandler =
    Arc<dyn Fn(String, Option<serde_json::Value>) + Send + Sync>;

/// Called for a server-initiated request (e.g. sampling); returns the
/// JSON-RPC result value to reply with, or an error to reply with instead.
pub type ServerRequestHandler = Arc<
    dyn Fn(
            String,
            Option<serde_json::Value>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<serde_json::Value, protomcp_core::Error>> + Send>,
        > + Send
        + Sync,
>;

struct Slot {
    tx: oneshot::Sender<Response>,
    /// Set by [`Correlator::cancel`] before the slot is dropped, so the
    /// waiting `send_request` can tell a caller-initiated cancel apart from
    /// the transport dying underneath it (§8 scenario 3).
    cancelled: CancellationToken,
}

/// Owns the id→slot map and the pump task that classifies inbound frames.
pub struct Correlator {
    transport: Arc<dyn Transport>,
    slots: DashMap<RequestId, Slot>,
    notification_handler: AsyncMutex<Option<NotificationHandler>>,
    server_request_handler: AsyncMutex<Option<ServerRequestHandler>>,
    next_id: std::sync::atomic::AtomicI64,
}

impl Correlator {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            slots: DashMap::new(),
            notification_handler: AsyncMutex::new(None),
            server_request_handler: AsyncMutex::new(None),
            next_id: std::sync::atomic::AtomicI64::new(1),
        }
    }

    /// Allocate a fresh numeric id unique to this correlator's lifetime.
    pub fn next_request_id(&self) -> RequestId {
        let n = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        RequestId::Number(n)
    }

    pub async fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.notification_handler.lock().await = Some(handler);
    }

    pub async fn set_server_request_handler(&self, handler: ServerRequestHandler) {
        *self.server_request_handler.lock().await = Some(handler);
    }

    /// Start the transport and begin pumping inbound frames. Called once,
    /// at the top of [`crate::Client::initialize`].
    pub async fn transport_start_and_pump(self: &Arc<Self>) -> ClientResult<()> {
        self.transport
            .start(protomcp_transport::StartContext::default())
            .await
            .map_err(|e| ClientError::from(protomcp_core::Error::from(e)))?;
        self.spawn_pump();
        Ok(())
    }

    /// Drive the inbound frame stream until the transport closes. Spawn
    /// this once per connection; it runs for the connection's lifetime.
    pub fn spawn_pump(self: &Arc<Self>) {
        let this = self.clone();
        let Some(mut rx) = this.transport.take_receiver() else {
            warn!("correlator pump requested twice; receiver already taken");
            return;
        };
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                this.clone().handle_inbound(frame).await;
            }
            debug!("correlator pump exiting: transport receive channel closed");
            this.fail_all_pending(ClientError::from(protomcp_core::Error::transport_closed()));
        });
    }

    async fn handle_inbound(self: Arc<Self>, frame: Frame) {
        match frame {
            Frame::Single(m) => self.handle_message(m).await,
            Frame::Batch(items) => {
                // §9 open question: batch frames are handled as independent
                // elements in receive order.
                for m in items {
                    self.clone().handle_message(m).await;
                }
            }
        }
    }

    async fn handle_message(self: Arc<Self>, message: Message) {
        match message {
            Message::Response(resp) => self.handle_response(resp),
            Message::Notification(note) => self.handle_notification(note).await,
            Message::Request(req) => self.handle_server_request(req).await,
        }
    }

    fn handle_response(&self, resp: Response) {
        let Some(id) = resp.id.clone() else {
            trace!("dropping response with null id (parse-error echo)");
            return;
        };
        // Stale responses (no matching slot) are dropped silently (§4.3, §8).
        if let Some((_, slot)) = self.slots.remove(&id) {
            let _ = slot.tx.send(resp);
        } else {
            trace!(id = %id, "dropping response with no matching outstanding request");
        }
    }

    async fn handle_notification(&self, note: protomcp_core::Notification) {
        if note.method == method::CANCELLED {
            trace!("received $/cancelled notification, no local action needed for client role");
            return;
        }
        let handler = self.notification_handler.lock().await.clone();
        if let Some(handler) = handler {
            handler(note.method, note.params);
        }
    }

    async fn handle_server_request(&self, req: protomcp_core::Request) {
        let handler = self.server_request_handler.lock().await.clone();
        let reply = match handler {
            Some(handler) => handler(req.method, req.params).await,
            None => Err(protomcp_core::Error::method_not_found(req.method)),
        };
        let response = match reply {
            Ok(value) => Response::success(req.id, value),
            Err(e) => Response::error(Some(req.id), (&e).into()),
        };
        let _ = self
            .transport
            .send(Frame::Single(Message::Response(response)))
            .await;
    }

    fn fail_all_pending(&self, _reason: ClientError) {
        let ids: Vec<RequestId> = self.slots.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, slot)) = self.slots.remove(&id) {
                drop(slot); // dropping the sender fails the awaiting receiver
            }
        }
    }

    /// Send `req` and wait for its correlated response, honoring `timeout`
    /// and best-effort `$/cancelled` emission if the caller's future is
    /// dropped before completion (§4.3, §5).
    #[instrument(skip(self, req), fields(id = %req.id, method = %req.method))]
    pub async fn send_request(
        &self,
        req: protomcp_core::Request,
        timeout: Option<Duration>,
    ) -> ClientResult<Response> {
        let id = req.id.clone();
        let (tx, rx) = oneshot::channel();
        let cancelled = CancellationToken::new();
        if self
            .slots
            .insert(id.clone(), Slot { tx, cancelled: cancelled.clone() })
            .is_some()
        {
            return Err(ClientError::from(protomcp_core::Error::internal(format!(
                "request id {id} collides with a live entry"
            ))));
        }

        if let TransportState::Disconnected | TransportState::Failed { .. } =
            self.transport.state().await
        {
            self.slots.remove(&id);
            return Err(ClientError::from(protomcp_core::Error::transport_closed()));
        }

        if let Err(e) = self.transport.send(Frame::Single(Message::Request(req))).await {
            self.slots.remove(&id);
            return Err(ClientError::from(protomcp_core::Error::from(e)));
        }

        let closed_err = |cancelled: &CancellationToken| {
            if cancelled.is_cancelled() {
                protomcp_core::Error::cancelled()
            } else {
                protomcp_core::Error::transport_closed()
            }
        };
        let wait = async {
            match timeout {
                Some(d) => tokio::time::timeout(d, rx)
                    .await
                    .map_err(|_| protomcp_core::Error::timeout())
                    .and_then(|r| r.map_err(|_| closed_err(&cancelled))),
                None => rx.await.map_err(|_| closed_err(&cancelled)),
            }
        };

        match wait.await {
            Ok(resp) => Ok(resp),
            Err(e) => {
                self.slots.remove(&id);
                if e.kind != protomcp_core::ErrorKind::Cancelled {
                    self.cancel(id).await;
                }
                Err(ClientError::from(e))
            }
        }
    }

    /// Cancel an in-flight request: mark its slot cancelled (so the waiting
    /// `send_request` fails with `Cancelled` rather than `TransportClosed`),
    /// drop the slot, and emit a best-effort `$/cancelled` notification; no
    /// confirmation is awaited (§4.3, §5).
    pub async fn cancel(&self, id: RequestId) {
        if let Some((_, slot)) = self.slots.remove(&id) {
            slot.cancelled.cancel();
        }
        let params = serde_json::to_value(protomcp_core::types::CancelledParams {
            request_id: id,
            reason: None,
        })
        .ok();
        let note = protomcp_core::Notification::new(method::CANCELLED, params);
        let _ = self
            .transport
            .send(Frame::Single(Message::Notification(note)))
            .await;
    }

    pub async fn send_notification(&self, note: protomcp_core::Notification) -> ClientResult<()> {
        self.transport
            .send(Frame::Single(Message::Notification(note)))
            .await
            .map_err(|e| ClientError::from(protomcp_core::Error::from(e)))
    }
}
