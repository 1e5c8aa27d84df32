//! Boundary to the device-linking protocol client.
//!
//! The protocol client owns the handshake, payload generation and raw
//! credential persistence. The pairing core only sees it through these
//! traits: one `connect` call per session, a typed event stream, a flush
//! hook and a best-effort terminate.
//!
//! ```text
//! PairingController ──connect()──► LinkClient
//!        ▲                             │
//!        │      mpsc::Receiver         │
//!        └──────── LinkEvent ◄─────────┘   (one channel per session,
//!                                           emission order preserved)
//! ```

pub mod simulated;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::LinkError;

pub use simulated::SimulatedLinkClient;

/// Connection state reported by the protocol client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

/// Events emitted by a live protocol connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Connection/state update, optionally carrying a fresh scannable payload.
    ConnectionUpdate {
        qr: Option<String>,
        connection: Option<ConnectionState>,
    },
    /// Credential material changed and must be flushed to disk.
    CredentialsUpdated,
    /// Numeric pairing code, delivered at most once per attempt.
    PairingCode(String),
}

impl LinkEvent {
    /// Shorthand for a payload-only connection update.
    pub fn qr(payload: impl Into<String>) -> Self {
        LinkEvent::ConnectionUpdate {
            qr: Some(payload.into()),
            connection: None,
        }
    }

    /// Shorthand for a state-only connection update.
    pub fn connection(state: ConnectionState) -> Self {
        LinkEvent::ConnectionUpdate {
            qr: None,
            connection: Some(state),
        }
    }
}

/// Parameters for one pairing attempt.
#[derive(Debug, Clone)]
pub struct LinkRequest {
    /// Session code the attempt is bound to.
    pub code: String,
    /// Directory the client persists raw credential files into.
    pub working_dir: PathBuf,
}

/// Live handle to a protocol connection.
#[async_trait]
pub trait LinkHandle: Send + Sync + fmt::Debug {
    /// Flush raw credential material into the working directory.
    async fn save_credentials(&self) -> Result<(), LinkError>;

    /// Request termination of the connection. Must not block.
    fn terminate(&self);
}

/// An established connection: the handle plus its event stream.
pub struct LinkConnection {
    pub handle: Arc<dyn LinkHandle>,
    pub events: mpsc::Receiver<LinkEvent>,
}

impl fmt::Debug for LinkConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkConnection")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Factory for protocol connections.
#[async_trait]
pub trait LinkClient: Send + Sync {
    /// Start a pairing attempt. Errors here cover version negotiation and
    /// auth-state setup.
    async fn connect(&self, request: LinkRequest) -> Result<LinkConnection, LinkError>;
}
