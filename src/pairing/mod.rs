//! Pairing-session lifecycle.
//!
//! Issues short-lived pairing sessions, drives each one through the
//! protocol client's events, and exports a consolidated credential bundle
//! once a device links successfully. Abandoned sessions are swept after
//! their time-to-live.

pub mod artifact;
pub mod code;
pub mod lifecycle;
pub mod service;
pub mod session;
pub mod store;
pub mod sweeper;

pub use artifact::{ARTIFACT_FILE_NAME, artifact_path};
pub use code::CodeAllocator;
pub use lifecycle::{Flow, PairingController};
pub use service::{PairingService, SessionStatusView, SessionTicket};
pub use session::{SessionRecord, SessionSnapshot, SessionStatus};
pub use store::SessionStore;
pub use sweeper::{ExpirySweeper, SweepResult, SweeperConfig, evict};
