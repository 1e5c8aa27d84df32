//! Session facade used by the HTTP gateway.
//!
//! Owns the store, the lifecycle controller and the sweeper task, and
//! exposes the small query/command surface the transport layer needs.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::artifact;
use super::code::CodeAllocator;
use super::lifecycle::PairingController;
use super::session::{SessionSnapshot, SessionStatus};
use super::store::SessionStore;
use super::sweeper::{self, ExpirySweeper, SweepResult, SweeperConfig};
use crate::config::Config;
use crate::error::SessionError;
use crate::link::LinkClient;

/// Returned to a caller that created a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTicket {
    pub code: String,
    /// Relative locator of the session's status resource.
    pub status_url: String,
}

/// Status of a session as reported to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatusView {
    pub code: String,
    pub status: SessionStatus,
    pub has_qr: bool,
    pub qr: Option<String>,
    pub pairing_code: Option<String>,
    /// Seconds until eviction; absent while the session is `open`.
    pub remaining_ttl_secs: Option<u64>,
    pub artifact_ready: bool,
    pub error: Option<String>,
}

/// Facade over the pairing core.
pub struct PairingService {
    store: SessionStore,
    controller: PairingController,
    sweeper: ExpirySweeper,
    sweeper_task: Mutex<Option<JoinHandle<()>>>,
}

impl PairingService {
    /// Build a service with an empty store.
    pub fn new(
        store: SessionStore,
        client: Arc<dyn LinkClient>,
        sweeper_config: SweeperConfig,
    ) -> Self {
        let controller = PairingController::new(store.clone(), client);
        let sweeper = ExpirySweeper::new(sweeper_config, store.clone());
        Self {
            store,
            controller,
            sweeper,
            sweeper_task: Mutex::new(None),
        }
    }

    /// Build a service from gateway configuration.
    pub fn from_config(config: &Config, client: Arc<dyn LinkClient>) -> Self {
        let store = SessionStore::new(
            config.sessions_dir.clone(),
            CodeAllocator::new(config.code_digits),
        );
        let sweeper_config = SweeperConfig {
            ttl: config.session_ttl,
            interval: config.sweep_interval,
            enabled: true,
        };
        Self::new(store, client, sweeper_config)
    }

    /// Start the periodic expiry sweep. Calling it twice is a no-op.
    pub fn start_sweeper(&self) {
        let mut slot = self.sweeper_task.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(self.sweeper.clone().spawn());
        }
    }

    /// Create a session and start its pairing attempt in the background.
    pub async fn create_session(&self) -> Result<SessionTicket, SessionError> {
        let snapshot = self.store.create(Utc::now()).await?;
        let code = snapshot.code;

        if let Err(e) = prepare_working_dir(&snapshot.working_dir).await {
            self.store.remove(&code).await;
            return Err(SessionError::Storage {
                code,
                reason: e.to_string(),
            });
        }

        tracing::info!(code = %code, "Pairing session created");
        self.controller.start(code.clone());

        Ok(SessionTicket {
            status_url: format!("/sessions/{}", code),
            code,
        })
    }

    /// Look up a session.
    pub async fn get_session(&self, code: &str) -> Option<SessionSnapshot> {
        self.store.get(code).await
    }

    /// Poll-friendly status of a session.
    pub async fn session_status(&self, code: &str) -> Option<SessionStatusView> {
        let snapshot = self.store.get(code).await?;
        let artifact_ready = artifact_exists(&snapshot.working_dir).await;

        let remaining_ttl_secs = if snapshot.status == SessionStatus::Open {
            None
        } else {
            let age = (Utc::now() - snapshot.created_at).to_std().unwrap_or_default();
            Some(self.sweeper.config().ttl.saturating_sub(age).as_secs())
        };

        Some(SessionStatusView {
            has_qr: snapshot.scannable_payload.is_some(),
            code: snapshot.code,
            status: snapshot.status,
            qr: snapshot.scannable_payload,
            pairing_code: snapshot.pairing_code,
            remaining_ttl_secs,
            artifact_ready,
            error: snapshot.error,
        })
    }

    /// Path of the consolidated artifact, once it exists on disk.
    pub async fn artifact_path(&self, code: &str) -> Option<PathBuf> {
        let working_dir = self.store.inspect(code, |r| r.working_dir.clone()).await?;
        let path = artifact::artifact_path(&working_dir);
        artifact_exists(&working_dir).await.then_some(path)
    }

    /// Load the consolidated artifact.
    ///
    /// Distinguishes an unknown session from one whose artifact is not
    /// written yet.
    pub async fn fetch_artifact(
        &self,
        code: &str,
    ) -> Result<BTreeMap<String, String>, SessionError> {
        if !self.store.contains(code).await {
            return Err(SessionError::NotFound {
                code: code.to_string(),
            });
        }
        let Some(path) = self.artifact_path(code).await else {
            return Err(SessionError::ArtifactNotReady {
                code: code.to_string(),
            });
        };

        artifact::load(&path).await.map_err(|e| SessionError::Storage {
            code: code.to_string(),
            reason: e.to_string(),
        })
    }

    /// Evict a session immediately, whatever its status.
    pub async fn revoke(&self, code: &str) -> Result<bool, SessionError> {
        let evicted = sweeper::evict(&self.store, code).await?;
        if evicted {
            tracing::info!(code = %code, "Pairing session revoked");
        }
        Ok(evicted)
    }

    /// Run one sweep pass now.
    pub async fn sweep_now(&self) -> SweepResult {
        self.sweeper.sweep().await
    }

    /// The expiry sweeper, for callers that need clock control.
    pub fn sweeper(&self) -> &ExpirySweeper {
        &self.sweeper
    }

    /// Stop the sweeper and terminate every live protocol connection.
    ///
    /// Working directories are left in place.
    pub async fn shutdown(&self) {
        let task = self
            .sweeper_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(task) = task {
            task.abort();
        }

        let records = self.store.drain().await;
        let count = records.len();
        for record in records {
            if let Some(handle) = record.handle {
                handle.terminate();
            }
        }
        tracing::info!(sessions = count, "Pairing service shut down");
    }
}

impl std::fmt::Debug for PairingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingService")
            .field("store", &self.store)
            .field("sweeper", &self.sweeper)
            .finish_non_exhaustive()
    }
}

/// Give a new session an empty working directory, clearing any leftover
/// from a previous process that used the same code.
async fn prepare_working_dir(path: &std::path::Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed stale working directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(path).await
}

async fn artifact_exists(working_dir: &std::path::Path) -> bool {
    tokio::fs::try_exists(artifact::artifact_path(working_dir))
        .await
        .unwrap_or(false)
}
