//! Seam to the external protocol client: the send operation, the event
//! shapes it emits, and the session that owns it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub mod events;
pub mod http;

pub use events::{ConnectionState, ProtocolEvent};

/// Outcome reported by the protocol client for one send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub ok: bool,
    pub detail: String,
}

#[async_trait]
pub trait ProtocolClient: Send + Sync {
    async fn send_text(&self, destination: &str, body: &str) -> anyhow::Result<SendReceipt>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connected,
    LoggedOut,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::LoggedOut | SessionState::Closed)
    }
}

/// The one live protocol session of the process. Created at startup and
/// handed out as `Arc<Session>`; once logged out or closed it stays that way.
pub struct Session {
    client: Arc<dyn ProtocolClient>,
    state: watch::Sender<SessionState>,
}

impl Session {
    pub fn new(client: Arc<dyn ProtocolClient>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Arc::new(Self { client, state })
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Applies a connection signal from the client. Terminal states are never
    /// left.
    pub fn apply(&self, signal: ConnectionState) -> SessionState {
        let next = match signal {
            ConnectionState::Connected => SessionState::Connected,
            ConnectionState::Disconnected => SessionState::Disconnected,
            ConnectionState::LoggedOut => SessionState::LoggedOut,
        };
        self.transition(next)
    }

    pub fn close(&self) {
        self.transition(SessionState::Closed);
    }

    fn transition(&self, next: SessionState) -> SessionState {
        let mut current = next;
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                if *state != next {
                    warn!("Session: ignoring {:?}, session already {:?}", next, state);
                }
                current = *state;
                return false;
            }
            if *state == next {
                return false;
            }
            info!("Session: {:?} -> {:?}", state, next);
            *state = next;
            true
        });
        current
    }

    /// The client handle, unless the session has been torn down.
    pub fn client(&self) -> Option<Arc<dyn ProtocolClient>> {
        if self.state().is_terminal() {
            None
        } else {
            Some(self.client.clone())
        }
    }
}
