//! Stdio transport: newline-delimited JSON over stdin/stdout (§4.2).
//!
//! Two roles share one implementation, matching how MCP actually deploys
//! stdio: [`StdioTransport::server`] reads/writes this process's own
//! stdin/stdout (used when *this* process is the spawned MCP server);
//! [`StdioTransport::spawn`] launches a child process and talks to *its*
//! stdin/stdout (used by a client driving a subprocess server). A spawned
//! child's stderr is captured and forwarded to `tracing` rather than
//! discarded.

use std::process::Stdio as StdStdio;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use protomcp_core::Frame;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::error::{TransportError, TransportResult};
use crate::traits::{StartContext, Transport, TransportKind, TransportState};

const CHANNEL_CAPACITY: usize = 256;

enum IoSource {
    OwnProcess,
    Child(Child),
}

struct Inner {
    state: Mutex<TransportState>,
    started: Mutex<bool>,
    outbound_tx: mpsc::Sender<Frame>,
    outbound_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    inbound_tx: mpsc::Sender<Frame>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Frame>>>,
    error_tx: mpsc::Sender<TransportError>,
    error_rx: Mutex<Option<mpsc::Receiver<TransportError>>>,
    io: Mutex<Option<IoSource>>,
}

/// Newline-delimited-JSON transport over a process's stdin/stdout.
pub struct StdioTransport {
    inner: Arc<Inner>,
}

impl StdioTransport {
    /// Talk over this process's own stdin/stdout (server role).
    #[must_use]
    pub fn server() -> Self {
        Self::new(IoSource::OwnProcess)
    }

    /// Spawn `program` with `args`/`envs` and talk over its stdin/stdout
    /// (client role). stderr is piped and forwarded to `tracing`.
    pub fn spawn(
        program: impl AsRef<std::ffi::OsStr>,
        args: impl IntoIterator<Item = impl AsRef<std::ffi::OsStr>>,
        envs: impl IntoIterator<Item = (String, String)>,
    ) -> TransportResult<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(envs)
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::piped());
        let child = cmd
            .spawn()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(IoSource::Child(child)))
    }

    fn new(source: IoSource) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(8);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TransportState::Disconnected),
                started: Mutex::new(false),
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
                error_tx,
                error_rx: Mutex::new(Some(error_rx)),
                io: Mutex::new(Some(source)),
            }),
        }
    }

    /// Spawn the reader task: decode one JSON frame per line, forward to
    /// `inbound_tx`, signal `error_tx` on a fatal read failure.
    fn spawn_reader<R>(reader: R, inbound_tx: mpsc::Sender<Frame>, error_tx: mpsc::Sender<TransportError>)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match protomcp_core::decode(line.as_bytes()) {
                            Ok(frame) => {
                                if inbound_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, "dropping malformed stdio frame"),
                        }
                    }
                    Ok(None) => {
                        debug!("stdio reader reached EOF");
                        break;
                    }
                    Err(e) => {
                        let _ = error_tx
                            .send(TransportError::ReceiveFailed(e.to_string()))
                            .await;
                        break;
                    }
                }
            }
            let _ = error_tx.send(TransportError::Closed).await;
        });
    }

    /// Spawn the writer task: one task owns the writer so concurrent
    /// `send` calls never interleave partial lines on the wire.
    fn spawn_writer<W>(
        mut writer: W,
        mut outbound_rx: mpsc::Receiver<Frame>,
        error_tx: mpsc::Sender<TransportError>,
    ) where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let mut bytes = protomcp_core::encode(frame);
                bytes.push(b'\n');
                if let Err(e) = writer.write_all(&bytes).await {
                    let _ = error_tx
                        .send(TransportError::SendFailed(e.to_string()))
                        .await;
                    break;
                }
                trace!(bytes = bytes.len(), "wrote stdio frame");
            }
            let _ = writer.flush().await;
        });
    }

    fn spawn_stderr_sink(stderr: tokio::process::ChildStderr) {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "protomcp_transport::child_stderr", "{line}");
            }
        });
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn state(&self) -> TransportState {
        self.inner.state.lock().clone()
    }

    async fn start(&self, _ctx: StartContext) -> TransportResult<()> {
        {
            let mut started = self.inner.started.lock();
            if *started {
                return Ok(());
            }
            *started = true;
        }
        *self.inner.state.lock() = TransportState::Connecting;

        let source = self
            .inner
            .io
            .lock()
            .take()
            .ok_or_else(|| TransportError::ConnectionFailed("already started".into()))?;

        let outbound_rx = self
            .inner
            .outbound_rx
            .lock()
            .take()
            .expect("outbound receiver taken exactly once at start");
        let inbound_tx = self.inner.inbound_tx.clone();
        let error_tx = self.inner.error_tx.clone();

        match source {
            IoSource::OwnProcess => {
                Self::spawn_reader(tokio::io::stdin(), inbound_tx, error_tx.clone());
                Self::spawn_writer(tokio::io::stdout(), outbound_rx, error_tx);
            }
            IoSource::Child(mut child) => {
                let stdin = child
                    .stdin
                    .take()
                    .ok_or_else(|| TransportError::ConnectionFailed("child stdin unavailable".into()))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| TransportError::ConnectionFailed("child stdout unavailable".into()))?;
                if let Some(stderr) = child.stderr.take() {
                    Self::spawn_stderr_sink(stderr);
                }
                Self::spawn_reader(stdout, inbound_tx, error_tx.clone());
                Self::spawn_writer(stdin, outbound_rx, error_tx);
                // Keep the child alive for the transport's lifetime.
                tokio::spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }

        *self.inner.state.lock() = TransportState::Connected;
        Ok(())
    }

    async fn send(&self, frame: Frame) -> TransportResult<()> {
        self.inner
            .outbound_tx
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
        *self.inner.state.lock() = TransportState::Disconnected;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_mode_constructs_without_starting() {
        let t = StdioTransport::server();
        assert_eq!(t.state().await, TransportState::Disconnected);
    }
}
