//! In-process protocol client.
//!
//! Stands in for a real device-linking client: it writes a `creds.json` on
//! every flush, can emit refreshed scannable payloads on a timer, and lets
//! callers push arbitrary events into a session's stream. The binary uses it
//! for local runs; tests use it to script event sequences.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{ConnectionState, LinkClient, LinkConnection, LinkEvent, LinkHandle, LinkRequest};
use crate::error::LinkError;

/// Buffered events per session before the emitter waits on the consumer.
const EVENT_BUFFER: usize = 32;

/// Name of the raw credential file the simulated client persists.
pub const CREDS_FILE_NAME: &str = "creds.json";

type SenderMap = Arc<Mutex<HashMap<String, mpsc::Sender<LinkEvent>>>>;

/// Simulated protocol client.
#[derive(Debug, Clone, Default)]
pub struct SimulatedLinkClient {
    senders: SenderMap,
    terminated: Arc<Mutex<HashSet<String>>>,
    qr_refresh: Option<Duration>,
    startup_failure: Option<String>,
}

impl SimulatedLinkClient {
    /// Create a client that only emits injected events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a fresh scannable payload immediately and then on every interval.
    pub fn with_qr_refresh(mut self, interval: Duration) -> Self {
        self.qr_refresh = Some(interval);
        self
    }

    /// Make every `connect` fail during version negotiation.
    pub fn with_startup_failure(mut self, reason: impl Into<String>) -> Self {
        self.startup_failure = Some(reason.into());
        self
    }

    /// Push an event into the stream of the session bound to `code`.
    ///
    /// Returns `false` if no live connection exists for that code.
    pub async fn inject(&self, code: &str, event: LinkEvent) -> bool {
        let sender = self.lock_senders().get(code).cloned();
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Whether a live connection exists for `code`.
    pub fn is_connected(&self, code: &str) -> bool {
        self.lock_senders().contains_key(code)
    }

    /// Whether `terminate` was requested for the connection bound to `code`.
    pub fn was_terminated(&self, code: &str) -> bool {
        self.terminated
            .lock()
            .map(|set| set.contains(code))
            .unwrap_or(false)
    }

    fn lock_senders(&self) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::Sender<LinkEvent>>> {
        // A poisoned map only means a panicking test; the data is still usable.
        self.senders.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LinkClient for SimulatedLinkClient {
    async fn connect(&self, request: LinkRequest) -> Result<LinkConnection, LinkError> {
        if let Some(reason) = &self.startup_failure {
            return Err(LinkError::VersionFetch {
                reason: reason.clone(),
            });
        }

        if !request.working_dir.is_dir() {
            return Err(LinkError::AuthState {
                reason: format!(
                    "working directory {} does not exist",
                    request.working_dir.display()
                ),
            });
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        self.lock_senders().insert(request.code.clone(), tx.clone());

        let refresh_task = self
            .qr_refresh
            .map(|interval| tokio::spawn(refresh_loop(tx, interval)));

        let handle = SimulatedHandle {
            code: request.code,
            working_dir: request.working_dir,
            noise_key: random_token(32),
            registration_id: rand::thread_rng().gen_range(1..16_384),
            senders: Arc::clone(&self.senders),
            terminated_codes: Arc::clone(&self.terminated),
            terminated: AtomicBool::new(false),
            refresh_task: Mutex::new(refresh_task),
        };

        tracing::debug!(code = %handle.code, "Simulated link connection established");

        Ok(LinkConnection {
            handle: Arc::new(handle),
            events: rx,
        })
    }
}

async fn refresh_loop(tx: mpsc::Sender<LinkEvent>, interval: Duration) {
    if tx
        .send(LinkEvent::connection(ConnectionState::Connecting))
        .await
        .is_err()
    {
        return;
    }

    let mut timer = tokio::time::interval(interval);
    loop {
        timer.tick().await;
        let payload = scannable_payload();
        if tx.send(LinkEvent::qr(payload)).await.is_err() {
            return;
        }
    }
}

/// Handle for one simulated connection.
#[derive(Debug)]
struct SimulatedHandle {
    code: String,
    working_dir: PathBuf,
    noise_key: String,
    registration_id: u32,
    senders: SenderMap,
    terminated_codes: Arc<Mutex<HashSet<String>>>,
    terminated: AtomicBool,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl LinkHandle for SimulatedHandle {
    async fn save_credentials(&self) -> Result<(), LinkError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(LinkError::CredentialFlush {
                reason: "connection terminated".to_string(),
            });
        }

        let creds = serde_json::json!({
            "noiseKey": self.noise_key,
            "registrationId": self.registration_id,
            "code": self.code,
        });
        let bytes = serde_json::to_vec_pretty(&creds).map_err(|e| LinkError::CredentialFlush {
            reason: e.to_string(),
        })?;

        tokio::fs::write(self.working_dir.join(CREDS_FILE_NAME), bytes)
            .await
            .map_err(|e| LinkError::CredentialFlush {
                reason: e.to_string(),
            })
    }

    fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Ok(mut slot) = self.refresh_task.lock()
            && let Some(task) = slot.take()
        {
            task.abort();
        }

        // Dropping the last sender closes the session's event stream.
        if let Ok(mut senders) = self.senders.lock() {
            senders.remove(&self.code);
        }
        if let Ok(mut codes) = self.terminated_codes.lock() {
            codes.insert(self.code.clone());
        }

        tracing::debug!(code = %self.code, "Simulated link connection terminated");
    }
}

fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill(bytes.as_mut_slice());
    STANDARD.encode(bytes)
}

fn scannable_payload() -> String {
    format!(
        "2@{},{},{}",
        random_token(24),
        random_token(32),
        random_token(32)
    )
}
