//! Per-request context handed to capability handlers.

use protomcp_core::CancellationToken;

/// Session-scoped context passed into every tool/resource/prompt handler
/// invocation. Handlers are expected to observe `cancellation` and
/// terminate promptly (§5).
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub session_id: String,
    pub cancellation: CancellationToken,
}

impl RequestContext {
    #[must_use]
    pub fn new(session_id: impl Into<String>, cancellation: CancellationToken) -> Self {
        Self {
            session_id: session_id.into(),
            cancellation,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
