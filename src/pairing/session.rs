//! Pairing session record and status model.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::link::LinkHandle;

/// Status of a pairing session.
///
/// ```text
/// created ──► connecting ──► qr ──► open
///                 │           │      ▲
///                 │           ▼      │
///                 │          code ───┘
///                 ▼
///               error          (any non-open) ──► closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    Connecting,
    Qr,
    Code,
    Open,
    Closed,
    Error,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Created => write!(f, "created"),
            SessionStatus::Connecting => write!(f, "connecting"),
            SessionStatus::Qr => write!(f, "qr"),
            SessionStatus::Code => write!(f, "code"),
            SessionStatus::Open => write!(f, "open"),
            SessionStatus::Closed => write!(f, "closed"),
            SessionStatus::Error => write!(f, "error"),
        }
    }
}

/// A live pairing session as held by the store.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// Unique short code; the lookup key.
    pub code: String,
    pub status: SessionStatus,
    /// Latest scannable payload emitted by the protocol client.
    pub scannable_payload: Option<String>,
    /// Numeric pairing code, once the client delivers one.
    pub pairing_code: Option<String>,
    /// Directory holding this session's raw credential material.
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    /// When the session first reached `open`.
    pub paired_at: Option<DateTime<Utc>>,
    /// Last error, set only in `error` status.
    pub error: Option<String>,
    /// Live protocol connection, used for forced termination on eviction.
    pub handle: Option<Arc<dyn LinkHandle>>,
}

impl SessionRecord {
    /// Create a fresh record in `created` status.
    pub fn new(code: String, working_dir: PathBuf, created_at: DateTime<Utc>) -> Self {
        Self {
            code,
            status: SessionStatus::Created,
            scannable_payload: None,
            pairing_code: None,
            working_dir,
            created_at,
            paired_at: None,
            error: None,
            handle: None,
        }
    }

    /// Whether this session ever reached `open`. Informational only.
    pub fn is_paired(&self) -> bool {
        self.paired_at.is_some()
    }

    /// Whether the session is older than `ttl` at `now` and not `open`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.status != SessionStatus::Open && now - self.created_at > ttl
    }

    /// Owned, serializable view without the protocol handle.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            code: self.code.clone(),
            status: self.status,
            scannable_payload: self.scannable_payload.clone(),
            pairing_code: self.pairing_code.clone(),
            working_dir: self.working_dir.clone(),
            created_at: self.created_at,
            paired_at: self.paired_at,
            error: self.error.clone(),
        }
    }
}

/// Read-only copy of a [`SessionRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub code: String,
    pub status: SessionStatus,
    pub scannable_payload: Option<String>,
    pub pairing_code: Option<String>,
    pub working_dir: PathBuf,
    pub created_at: DateTime<Utc>,
    pub paired_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}
