//! Expiry sweeper: periodic eviction of abandoned pairing sessions.
//!
//! On a fixed interval, scans every session and evicts those that are not
//! `open` and are older than the configured time-to-live. An `open` session
//! is never evicted, so its artifact stays retrievable.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::store::SessionStore;
use crate::error::SessionError;

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Maximum age of a session that is not `open`.
    pub ttl: Duration,
    /// How often to scan for expired sessions.
    pub interval: Duration,
    /// Whether sweeping is enabled.
    pub enabled: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),     // 5 minutes
            interval: Duration::from_secs(60), // 1 minute
            enabled: true,
        }
    }
}

/// Result of a sweep pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepResult {
    /// Number of sessions checked.
    pub checked: usize,
    /// Number of sessions evicted.
    pub evicted: usize,
    /// Evictions that hit a storage error (the record is still removed).
    pub failed: usize,
    /// When the sweep ran.
    pub timestamp: DateTime<Utc>,
}

/// Periodically evicts expired sessions from a [`SessionStore`].
#[derive(Debug, Clone)]
pub struct ExpirySweeper {
    config: SweeperConfig,
    store: SessionStore,
    last_sweep: Arc<RwLock<Option<SweepResult>>>,
}

impl ExpirySweeper {
    /// Create a new sweeper over `store`.
    pub fn new(config: SweeperConfig, store: SessionStore) -> Self {
        Self {
            config,
            store,
            last_sweep: Arc::new(RwLock::new(None)),
        }
    }

    /// Start the sweep background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled {
                tracing::info!("Session expiry sweeper is disabled");
                return;
            }

            tracing::info!(
                interval_secs = self.config.interval.as_secs(),
                ttl_secs = self.config.ttl.as_secs(),
                "Session expiry sweeper started"
            );

            let mut timer = tokio::time::interval(self.config.interval);
            // The first tick completes immediately; skip it so a fresh
            // process does not sweep before any session could expire.
            timer.tick().await;
            loop {
                timer.tick().await;
                let result = self.sweep().await;
                if result.evicted > 0 {
                    tracing::info!(
                        evicted = result.evicted,
                        failed = result.failed,
                        checked = result.checked,
                        "Evicted expired pairing sessions"
                    );
                }
            }
        })
    }

    /// Perform a single sweep pass at the current time.
    pub async fn sweep(&self) -> SweepResult {
        self.sweep_at(Utc::now()).await
    }

    /// Perform a single sweep pass as if the clock read `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> SweepResult {
        let ttl = ttl_as_chrono(self.config.ttl);
        let sessions = self.store.list().await;
        let mut result = SweepResult {
            checked: sessions.len(),
            evicted: 0,
            failed: 0,
            timestamp: now,
        };

        for session in sessions {
            // Re-check against the live record: the snapshot may be stale.
            let expired = self
                .store
                .inspect(&session.code, |r| r.is_expired(now, ttl))
                .await
                .unwrap_or(false);
            if !expired {
                continue;
            }

            match evict(&self.store, &session.code).await {
                Ok(true) => result.evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(code = %session.code, error = %e, "Eviction hit a storage error");
                    result.evicted += 1;
                    result.failed += 1;
                }
            }
        }

        *self.last_sweep.write().await = Some(result.clone());
        result
    }

    /// Get the result of the last sweep.
    pub async fn last_result(&self) -> Option<SweepResult> {
        self.last_sweep.read().await.clone()
    }

    /// Get the sweeper configuration.
    pub fn config(&self) -> &SweeperConfig {
        &self.config
    }
}

fn ttl_as_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}

/// Evict one session: terminate its link, delete its working directory,
/// then drop the record and terminate whatever handle it holds by then.
///
/// The record is removed last so its code cannot be reallocated while the
/// old directory still exists. It is removed even when deletion fails, so a
/// broken directory never leaves a stuck entry; the error is returned for
/// logging. Returns `Ok(false)` if the code was not live.
pub async fn evict(store: &SessionStore, code: &str) -> Result<bool, SessionError> {
    let Some((handle, working_dir)) = store
        .inspect(code, |r| (r.handle.clone(), r.working_dir.clone()))
        .await
    else {
        return Ok(false);
    };

    if let Some(handle) = handle {
        handle.terminate();
    }

    let removal = match tokio::fs::remove_dir_all(&working_dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SessionError::Storage {
            code: code.to_string(),
            reason: format!("failed to remove {}: {}", working_dir.display(), e),
        }),
    };

    // A handle may have attached while the directory was being removed.
    if let Some(record) = store.remove(code).await
        && let Some(handle) = record.handle
    {
        handle.terminate();
    }
    tracing::info!(code = %code, "Evicted pairing session");

    removal.map(|()| true)
}
