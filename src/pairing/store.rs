//! In-memory session registry.
//!
//! Single source of truth for session state. The store is a keyed map and
//! nothing more: it does not interpret statuses. Mutation happens field by
//! field through [`SessionStore::update`], under the write lock, so a
//! check-then-act closure sees and changes the same state atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::code::CodeAllocator;
use super::session::{SessionRecord, SessionSnapshot};
use crate::error::SessionError;
use crate::link::LinkHandle;

/// Shared registry of live pairing sessions, keyed by code.
///
/// Cloning is cheap; clones share the same map.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    allocator: CodeAllocator,
    root: PathBuf,
}

impl SessionStore {
    /// Create an empty store whose working directories live under `root`.
    pub fn new(root: impl Into<PathBuf>, allocator: CodeAllocator) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            allocator,
            root: root.into(),
        }
    }

    /// Root directory holding per-session working directories.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh code and insert a `created` record for it.
    ///
    /// Allocation and insertion happen under one write lock, so two
    /// concurrent creates can never receive the same code.
    pub async fn create(&self, now: DateTime<Utc>) -> Result<SessionSnapshot, SessionError> {
        let mut sessions = self.sessions.write().await;
        let code = self
            .allocator
            .allocate(|c| sessions.contains_key(c), sessions.len())?;

        let record = SessionRecord::new(code.clone(), self.root.join(&code), now);
        let snapshot = record.snapshot();
        sessions.insert(code, record);
        Ok(snapshot)
    }

    /// Look up a session by code.
    pub async fn get(&self, code: &str) -> Option<SessionSnapshot> {
        self.sessions.read().await.get(code).map(|r| r.snapshot())
    }

    /// Whether a session with this code is live.
    pub async fn contains(&self, code: &str) -> bool {
        self.sessions.read().await.contains_key(code)
    }

    /// Evaluate `f` against the current record without mutating it.
    pub async fn inspect<R>(&self, code: &str, f: impl FnOnce(&SessionRecord) -> R) -> Option<R> {
        self.sessions.read().await.get(code).map(f)
    }

    /// Mutate a record in place. Returns `None` if the code is not live.
    pub async fn update<R>(
        &self,
        code: &str,
        f: impl FnOnce(&mut SessionRecord) -> R,
    ) -> Option<R> {
        self.sessions.write().await.get_mut(code).map(f)
    }

    /// The protocol handle attached to a session, if any.
    pub async fn handle(&self, code: &str) -> Option<Arc<dyn LinkHandle>> {
        self.sessions
            .read()
            .await
            .get(code)
            .and_then(|r| r.handle.clone())
    }

    /// Remove a record and hand it back.
    pub async fn remove(&self, code: &str) -> Option<SessionRecord> {
        self.sessions.write().await.remove(code)
    }

    /// Snapshot every live record.
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<SessionSnapshot> = sessions.values().map(|r| r.snapshot()).collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Remove every record, returning them for teardown.
    pub async fn drain(&self) -> Vec<SessionRecord> {
        self.sessions.write().await.drain().map(|(_, r)| r).collect()
    }
}
