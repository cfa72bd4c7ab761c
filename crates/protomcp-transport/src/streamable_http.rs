//! Streamable-HTTP transport (§4.2 "Streamable-HTTP transport").
//!
//! Each outbound JSON-RPC frame is POSTed to a single endpoint. The
//! response is one of: an immediate `application/json` document, a
//! `text/event-stream` body carrying zero or more notifications followed
//! by the terminal response, or HTTP 202 Accepted with no body (valid only
//! for a notification). The open question in §9 — distinguishing an
//! intermediate notification from the terminal response inside the SSE
//! body — is resolved here by the presence of `method`: a frame with
//! `method` is forwarded as a notification, a frame without one is the
//! terminal response and ends the read for this POST.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use protomcp_core::{Frame, Message};
use reqwest::{header, Client};
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::{TransportError, TransportResult};
use crate::traits::{StartContext, Transport, TransportKind, TransportState};

const SESSION_HEADER: &str = "Mcp-Session-Id";
const CHANNEL_CAPACITY: usize = 256;

/// Configuration for [`StreamableHttpTransport`].
#[derive(Debug, Clone)]
pub struct StreamableHttpConfig {
    pub endpoint: String,
    pub headers: Vec<(String, String)>,
}

struct Inner {
    client: Client,
    config: StreamableHttpConfig,
    state: Mutex<TransportState>,
    session_id: Mutex<Option<String>>,
    inbound_tx: mpsc::Sender<Frame>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    error_tx: mpsc::Sender<TransportError>,
    error_rx: Mutex<Option<mpsc::Receiver<TransportError>>>,
}

/// Client-side streamable-HTTP transport.
pub struct StreamableHttpTransport {
    inner: Arc<Inner>,
}

impl StreamableHttpTransport {
    #[must_use]
    pub fn new(config: StreamableHttpConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(8);
        Self {
            inner: Arc::new(Inner {
                client: Client::new(),
                config,
                state: Mutex::new(TransportState::Disconnected),
                session_id: Mutex::new(None),
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
                error_tx,
                error_rx: Mutex::new(Some(error_rx)),
            }),
        }
    }

    /// Session id learned from the initialize response, if any (§6).
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.lock().clone()
    }

    async fn process_sse_body(inner: &Arc<Inner>, resp: reqwest::Response) -> TransportResult<()> {
        use futures::StreamExt;
        let mut stream = resp.bytes_stream();
        let mut buffer = String::new();
        loop {
            let Some(chunk) = stream.next().await else {
                return Ok(());
            };
            let chunk = chunk.map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find("\n\n") {
                let event_str = buffer[..pos].to_string();
                buffer = buffer[pos + 2..].to_string();
                let data: String = event_str
                    .lines()
                    .filter_map(|l| l.strip_prefix("data:").or_else(|| l.strip_prefix("data: ")))
                    .map(str::trim_start)
                    .collect::<Vec<_>>()
                    .join("\n");
                if data.is_empty() {
                    continue;
                }
                let frame = protomcp_core::decode(data.as_bytes())
                    .map_err(|e| TransportError::Serialization(e.message))?;
                let is_terminal = matches!(
                    &frame,
                    Frame::Single(Message::Response(_))
                );
                inner
                    .inbound_tx
                    .send(frame)
                    .await
                    .map_err(|_| TransportError::Closed)?;
                if is_terminal {
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::StreamableHttp
    }

    async fn state(&self) -> TransportState {
        self.inner.state.lock().clone()
    }

    async fn start(&self, _ctx: StartContext) -> TransportResult<()> {
        *self.inner.state.lock() = TransportState::Connected;
        Ok(())
    }

    async fn send(&self, frame: Frame) -> TransportResult<()> {
        let is_notification = matches!(&frame, Frame::Single(Message::Notification(_)));
        let body = protomcp_core::encode(frame);

        let mut req = self
            .inner
            .client
            .post(&self.inner.config.endpoint)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json, text/event-stream")
            .body(body);
        for (k, v) in &self.inner.config.headers {
            req = req.header(k, v);
        }
        if let Some(session_id) = self.inner.session_id.lock().clone() {
            req = req.header(SESSION_HEADER, session_id);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            let msg = self.inner.session_id.lock().clone().unwrap_or_default();
            let _ = self
                .inner
                .error_tx
                .send(TransportError::SessionLost(msg.clone()))
                .await;
            return Err(TransportError::SessionLost(msg));
        }

        if resp.status() == reqwest::StatusCode::ACCEPTED {
            // 202 Accepted: valid only for a notification, no body to read.
            debug_assert!(is_notification, "202 Accepted for a non-notification send");
            return Ok(());
        }

        if !resp.status().is_success() {
            return Err(TransportError::SendFailed(format!(
                "unexpected status: {}",
                resp.status()
            )));
        }

        if let Some(sid) = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.inner.session_id.lock() = Some(sid.to_string());
        }

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if content_type.starts_with("text/event-stream") {
            Self::process_sse_body(&self.inner, resp).await
        } else {
            let bytes = resp
                .bytes()
                .await
                .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;
            let frame = protomcp_core::decode(&bytes).map_err(|e| TransportError::Serialization(e.message))?;
            trace!("decoded immediate JSON response");
            self.inner
                .inbound_tx
                .send(frame)
                .await
                .map_err(|_| TransportError::Closed)
        }
    }

    fn take_receiver(&self) -> Option<mpsc::Receiver<Frame>> {
        self.inner.inbound_rx.lock().take()
    }

    fn take_error_signal(&self) -> Option<mpsc::Receiver<TransportError>> {
        self.inner.error_rx.lock().take()
    }

    async fn close(&self) -> TransportResult<()> {
        *self.inner.state.lock() = TransportState::Disconnected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builds() {
        let cfg = StreamableHttpConfig {
            endpoint: "http://localhost/mcp".into(),
            headers: vec![],
        };
        let t = StreamableHttpTransport::new(cfg);
        assert!(t.session_id().is_none());
    }
}
