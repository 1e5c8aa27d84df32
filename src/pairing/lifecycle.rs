//! Pairing lifecycle controller.
//!
//! Drives one session from `created` to a terminal status by consuming the
//! protocol client's event stream. The controller is the only writer of a
//! record's status and payload fields.
//!
//! ```text
//! start(code)        --> status = connecting, client.connect()
//! connect fails      --> status = error, error = reason
//! qr payload         --> payload stored; status = qr unless code/open
//! pairing code       --> code stored; status = code unless open
//! credentials update --> handle.save_credentials()
//! connection open    --> status = open, flush, materialize artifact
//! connection close   --> status = closed
//! ```
//!
//! Every handler re-reads the record after an await point; the session may
//! have been evicted or changed by another task in the meantime.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;

use super::artifact;
use super::session::SessionStatus;
use super::store::SessionStore;
use crate::link::{ConnectionState, LinkClient, LinkEvent, LinkHandle, LinkRequest};

/// Whether the event loop should keep consuming events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The session no longer exists.
    Stop,
}

/// Drives pairing attempts against a protocol client.
#[derive(Clone)]
pub struct PairingController {
    store: SessionStore,
    client: Arc<dyn LinkClient>,
}

impl PairingController {
    pub fn new(store: SessionStore, client: Arc<dyn LinkClient>) -> Self {
        Self { store, client }
    }

    /// Spawn the pairing attempt for `code` as a background task.
    pub fn start(&self, code: String) -> JoinHandle<()> {
        let controller = self.clone();
        tokio::spawn(async move { controller.run(&code).await })
    }

    /// Run one pairing attempt to completion.
    ///
    /// Returns when the event stream ends or the session disappears.
    /// Startup failures are recorded on the record, never propagated.
    pub async fn run(&self, code: &str) {
        let Some(working_dir) = self
            .store
            .update(code, |r| {
                if r.status == SessionStatus::Created {
                    r.status = SessionStatus::Connecting;
                }
                r.working_dir.clone()
            })
            .await
        else {
            tracing::debug!(code = %code, "Session vanished before pairing started");
            return;
        };

        tracing::debug!(code = %code, "Pairing attempt started");

        let request = LinkRequest {
            code: code.to_string(),
            working_dir,
        };
        let connection = match self.client.connect(request).await {
            Ok(connection) => connection,
            Err(e) => {
                tracing::error!(code = %code, error = %e, "Pairing attempt failed to start");
                self.store
                    .update(code, |r| {
                        r.status = SessionStatus::Error;
                        r.error = Some(e.to_string());
                    })
                    .await;
                return;
            }
        };

        let handle = connection.handle;
        let mut events = connection.events;

        let attached = self
            .store
            .update(code, |r| r.handle = Some(Arc::clone(&handle)))
            .await;
        if attached.is_none() {
            tracing::debug!(code = %code, "Session evicted while connecting, terminating link");
            handle.terminate();
            return;
        }

        while let Some(event) = events.recv().await {
            if self.apply_event(code, &handle, event).await == Flow::Stop {
                handle.terminate();
                break;
            }
        }

        tracing::debug!(code = %code, "Pairing event stream ended");
    }

    /// Apply one protocol event to the session's record.
    pub async fn apply_event(
        &self,
        code: &str,
        handle: &Arc<dyn LinkHandle>,
        event: LinkEvent,
    ) -> Flow {
        match event {
            LinkEvent::ConnectionUpdate { qr, connection } => {
                if let Some(payload) = qr
                    && self.on_scannable_payload(code, payload).await == Flow::Stop
                {
                    return Flow::Stop;
                }
                match connection {
                    Some(ConnectionState::Open) => self.on_open(code, handle).await,
                    Some(ConnectionState::Close) => self.on_close(code).await,
                    Some(ConnectionState::Connecting) => self.on_connecting(code).await,
                    None => Flow::Continue,
                }
            }
            LinkEvent::PairingCode(pairing_code) => self.on_pairing_code(code, pairing_code).await,
            LinkEvent::CredentialsUpdated => self.on_credentials_updated(code, handle).await,
        }
    }

    async fn on_scannable_payload(&self, code: &str, payload: String) -> Flow {
        self.store
            .update(code, |r| {
                r.scannable_payload = Some(payload);
                // A late payload after open, or once a numeric code is
                // shown, must not pull the session back to qr.
                if !matches!(r.status, SessionStatus::Code | SessionStatus::Open) {
                    r.status = SessionStatus::Qr;
                }
                tracing::debug!(code = %code, status = %r.status, "Scannable payload updated");
            })
            .await
            .map_or(Flow::Stop, |_| Flow::Continue)
    }

    async fn on_pairing_code(&self, code: &str, pairing_code: String) -> Flow {
        self.store
            .update(code, |r| {
                r.pairing_code = Some(pairing_code);
                if r.status != SessionStatus::Open {
                    r.status = SessionStatus::Code;
                }
                tracing::debug!(code = %code, status = %r.status, "Numeric pairing code received");
            })
            .await
            .map_or(Flow::Stop, |_| Flow::Continue)
    }

    async fn on_connecting(&self, code: &str) -> Flow {
        self.store
            .update(code, |r| {
                if r.status == SessionStatus::Created {
                    r.status = SessionStatus::Connecting;
                }
            })
            .await
            .map_or(Flow::Stop, |_| Flow::Continue)
    }

    async fn on_close(&self, code: &str) -> Flow {
        self.store
            .update(code, |r| {
                r.status = SessionStatus::Closed;
                tracing::info!(code = %code, paired = r.is_paired(), "Link connection closed");
            })
            .await
            .map_or(Flow::Stop, |_| Flow::Continue)
    }

    async fn on_credentials_updated(&self, code: &str, handle: &Arc<dyn LinkHandle>) -> Flow {
        // Flushing for an evicted session would recreate its directory.
        if !self.store.contains(code).await {
            return Flow::Stop;
        }
        if let Err(e) = handle.save_credentials().await {
            tracing::warn!(code = %code, error = %e, "Failed to flush credentials");
        }
        Flow::Continue
    }

    async fn on_open(&self, code: &str, handle: &Arc<dyn LinkHandle>) -> Flow {
        let now = Utc::now();
        let opened = self
            .store
            .update(code, |r| {
                r.status = SessionStatus::Open;
                r.error = None;
                r.paired_at.get_or_insert(now);
            })
            .await;
        if opened.is_none() {
            return Flow::Stop;
        }

        tracing::info!(code = %code, "Link connection open, session paired");

        if let Err(e) = handle.save_credentials().await {
            tracing::warn!(code = %code, error = %e, "Failed to flush credentials on open");
        }

        // Re-read after the flush: the session may have been revoked.
        let Some(working_dir) = self
            .store
            .inspect(code, |r| r.working_dir.clone())
            .await
        else {
            return Flow::Stop;
        };

        match artifact::materialize(&working_dir).await {
            Ok(path) => {
                tracing::info!(code = %code, path = %path.display(), "Credential artifact written");
            }
            Err(e) => {
                // Pairing itself succeeded; the artifact is a convenience.
                tracing::warn!(code = %code, error = %e, "Failed to write credential artifact");
            }
        }

        Flow::Continue
    }
}

impl std::fmt::Debug for PairingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingController")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
