//! pairgate: pairing-session gateway for device-linking clients.
//!
//! Issues short numeric codes, follows each pairing attempt through the
//! protocol client's event stream, and exports a consolidated credential
//! bundle once a device links.

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod link;
pub mod pairing;

pub use config::Config;
pub use error::{Error, Result};
pub use pairing::PairingService;
