//! Observable session state for the presentation layer.

use std::sync::Arc;

use strum::Display;
use tokio::sync::watch;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Watchable connection state, recording flag and session id.
///
/// Cloning shares the same underlying state.
#[derive(Debug, Clone)]
pub struct SessionState {
    connection: Arc<watch::Sender<ConnectionState>>,
    recording: Arc<watch::Sender<bool>>,
    session_id: Arc<watch::Sender<Option<String>>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            connection: Arc::new(watch::channel(ConnectionState::Disconnected).0),
            recording: Arc::new(watch::channel(false).0),
            session_id: Arc::new(watch::channel(None).0),
        }
    }

    pub fn connection(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.connection() == ConnectionState::Connected
    }

    pub fn recording(&self) -> bool {
        *self.recording.borrow()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.borrow().clone()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub fn subscribe_recording(&self) -> watch::Receiver<bool> {
        self.recording.subscribe()
    }

    pub fn subscribe_session_id(&self) -> watch::Receiver<Option<String>> {
        self.session_id.subscribe()
    }

    pub(crate) fn set_connection(&self, state: ConnectionState) {
        let previous = self.connection.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    pub(crate) fn set_recording(&self, recording: bool) {
        self.recording.send_replace(recording);
    }

    pub(crate) fn set_session_id(&self, session_id: Option<String>) {
        self.session_id.send_replace(session_id);
    }
}
