//! Session manager (§4.7): tracks connected peers, their negotiated
//! capabilities, their notification mailbox, and their resource
//! subscriptions.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use protomcp_core::types::ClientCapabilities;
use protomcp_core::{CancellationToken, Frame, Message, Notification, RequestId};
use protomcp_transport::Transport;
use tracing::debug;
use uuid::Uuid;

/// A connected peer relationship (§3 Session).
pub struct Session {
    pub id: String,
    pub transport: Arc<dyn Transport>,
    pub protocol_version: Mutex<String>,
    pub client_capabilities: Mutex<ClientCapabilities>,
    subscriptions: Mutex<HashSet<String>>,
    in_flight: DashMap<RequestId, CancellationToken>,
}

impl Session {
    fn new(id: String, transport: Arc<dyn Transport>) -> Self {
        Self {
            id,
            transport,
            protocol_version: Mutex::new(String::new()),
            client_capabilities: Mutex::new(ClientCapabilities::default()),
            subscriptions: Mutex::new(HashSet::new()),
            in_flight: DashMap::new(),
        }
    }

    /// `subscribe` is idempotent: a duplicate call leaves the set
    /// unchanged (§4.7, §8).
    pub fn subscribe(&self, uri: String) {
        self.subscriptions.lock().insert(uri);
    }

    pub fn unsubscribe(&self, uri: &str) {
        self.subscriptions.lock().remove(uri);
    }

    pub fn is_subscribed(&self, uri: &str) -> bool {
        self.subscriptions.lock().contains(uri)
    }

    /// Deliver a notification to this session's mailbox. Notifications
    /// emitted to a single session preserve emission order on delivery
    /// because `send` hands frames to one sender task in call order (§5).
    pub async fn notify(&self, notification: Notification) {
        if let Err(e) = self
            .transport
            .send(Frame::Single(Message::Notification(notification)))
            .await
        {
            debug!(session = %self.id, error = %e, "failed to deliver notification");
        }
    }

    pub fn register_in_flight(&self, id: RequestId) -> CancellationToken {
        let token = CancellationToken::new();
        self.in_flight.insert(id, token.clone());
        token
    }

    pub fn complete_in_flight(&self, id: &RequestId) {
        self.in_flight.remove(id);
    }

    pub fn cancel_in_flight(&self, id: &RequestId) -> bool {
        if let Some(token) = self.in_flight.get(id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Cancel every in-flight handler for this session; called on teardown
    /// so no handler invocation outlives its session (§3, §8).
    pub fn cancel_all(&self) {
        for entry in self.in_flight.iter() {
            entry.value().cancel();
        }
    }
}

/// Tracks connected sessions by id (§4.7).
#[derive(Default)]
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a session id and store the new session record.
    pub fn register(&self, transport: Arc<dyn Transport>) -> Arc<Session> {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), transport));
        self.sessions.insert(id, session.clone());
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|e| e.clone())
    }

    /// Drop the session record. All pending requests on this session fail
    /// and subscriptions are dropped as a consequence of the `Arc` going
    /// out of scope (§3 Session lifecycle).
    pub fn unregister(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, s)| {
            s.cancel_all();
            s
        })
    }

    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
