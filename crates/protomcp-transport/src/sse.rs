//! SSE transport (§4.2 "SSE transport").
//!
//! A long-lived `GET /sse` delivers server→client frames as `data:` events;
//! the server advertises the URL clients must POST to as the first SSE
//! event (`event: endpoint`). Outbound requests are POSTed there.
//! Reconnects with exponential backoff on a dropped stream; in-flight
//! requests at the time of a drop fail rather than silently reissue, since
//! this transport has no session-resumption signal of its own (§4.2).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use protomcp_core::Frame;
use reqwest::Client;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{TransportError, TransportResult};
use crate::traits::{StartContext, Transport, TransportKind, TransportState};

const CHANNEL_CAPACITY: usize = 256;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration for [`SseTransport`].
#[derive(Debug, Clone)]
pub struct SseConfig {
    pub sse_url: String,
    pub headers: Vec<(String, String)>,
}

struct Inner {
    client: Client,
    config: SseConfig,
    state: Mutex<TransportState>,
    post_url: Mutex<Option<String>>,
    inbound_tx: mpsc::Sender<Frame>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    error_tx: mpsc::Sender<TransportError>,
    error_rx: Mutex<Option<mpsc::Receiver<TransportError>>>,
    reconnect_attempts: AtomicU32,
}

/// Client-side SSE transport.
pub struct SseTransport {
    inner: Arc<Inner>,
}

impl SseTransport {
    #[must_use]
    pub fn new(config: SseConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(8);
        Self {
            inner: Arc::new(Inner {
                client: Client::new(),
                config,
                state: Mutex::new(TransportState::Disconnected),
                post_url: Mutex::new(None),
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
                error_tx,
                error_rx: Mutex::new(Some(error_rx)),
                reconnect_attempts: AtomicU32::new(0),
            }),
        }
    }

    async fn run_event_loop(inner: Arc<Inner>) {
        loop {
            *inner.state.lock() = TransportState::Connecting;
            let mut req = inner.client.get(&inner.config.sse_url);
            for (k, v) in &inner.config.headers {
                req = req.header(k, v);
            }
            match req.send().await {
                Ok(resp) if resp.status().is_success() => {
                    inner.reconnect_attempts.store(0, Ordering::Relaxed);
                    *inner.state.lock() = TransportState::Connected;
                    Self::consume_stream(&inner, resp).await;
                    *inner.state.lock() = TransportState::Disconnected;
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "SSE connect rejected");
                }
                Err(e) => {
                    warn!(error = %e, "SSE connect failed");
                }
            }

            let attempt = inner.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
            let backoff = std::cmp::min(INITIAL_BACKOFF * 2u32.saturating_pow(attempt), MAX_BACKOFF);
            tokio::time::sleep(backoff).await;
        }
    }

    async fn consume_stream(inner: &Arc<Inner>, resp: reqwest::Response) {
        use futures::StreamExt;
        let mut stream = resp.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = inner
                        .error_tx
                        .send(TransportError::ReceiveFailed(e.to_string()))
                        .await;
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find("\n\n") {
                let event_str = buffer[..pos].to_string();
                buffer = buffer[pos + 2..].to_string();
                Self::process_event(inner, &event_str).await;
            }
        }
        debug!("SSE stream ended");
    }

    /// Parse one `field: value` block. An event with no `event:` line is
    /// the SSE-spec default `message` event (§8 boundary behavior).
    async fn process_event(inner: &Arc<Inner>, event_str: &str) {
        let mut event_type: Option<&str> = None;
        let mut data_lines: Vec<&str> = Vec::new();
        for line in event_str.lines() {
            if let Some((field, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                match field {
                    "event" => event_type = Some(value),
                    "data" => data_lines.push(value),
                    _ => {}
                }
            }
        }
        let event_type = event_type.unwrap_or("message");
        if data_lines.is_empty() {
            return;
        }
        let data = data_lines.join("\n");

        if event_type == "endpoint" {
            *inner.post_url.lock() = Some(data);
            return;
        }

        match protomcp_core::decode(data.as_bytes()) {
            Ok(frame) => {
                trace!(event = event_type, "decoded SSE frame");
                if inner.inbound_tx.send(frame).await.is_err() {
                    warn!("inbound channel closed while delivering SSE frame");
                }
            }
            Err(e) => warn!(error = %e, "dropping malformed SSE event"),
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn state(&self) -> TransportState {
        self.inner.state.lock().clone()
    }

    async fn start(&self, _ctx: StartContext) -> TransportResult<()> {
        let inner = self.inner.clone();
        tokio::spawn(Self::run_event_loop(inner));
        Ok(())
    }

    async fn send(&self, frame: Frame) -> TransportResult<()> {
        let post_url = self
            .inner
            .post_url
            .lock()
            .clone()
            .ok_or_else(|| TransportError::ConnectionFailed("POST endpoint not yet advertised".into()))?;
        let body = protomcp_core::encode(frame);
        let mut req = self.inner.client.post(&post_url).body(body);
        for (k, v) in &self.inner.config.headers {
            req = req.header(k, v);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(TransportError::SendFailed(format!(
                "POST rejected: {}",
                resp.status()
            )));
        }
        Ok(())
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

    #[tokio::test]
    async fn send_without_endpoint_fails() {
        let t = SseTransport::new(SseConfig {
            sse_url: "http://localhost/sse".into(),
            headers: vec![],
        });
        let req = protomcp_core::Request::new(protomcp_core::RequestId::Number(1), "ping", None);
        let frame = Frame::Single(protomcp_core::Message::Request(req));
        let err = t.send(frame).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
