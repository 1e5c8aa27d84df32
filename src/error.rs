//! Error types for pairgate.

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session registry errors.
///
/// `NotFound` and `ArtifactNotReady` are both "not found" to a caller, but
/// only the latter means polling again can succeed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {code}")]
    NotFound { code: String },

    #[error("Artifact not ready for session: {code}")]
    ArtifactNotReady { code: String },

    #[error("No free pairing codes left ({capacity} in use)")]
    CodeSpaceExhausted { capacity: usize },

    #[error("Storage failure for session {code}: {reason}")]
    Storage { code: String, reason: String },
}

impl SessionError {
    /// Whether the caller should keep polling for this condition to clear.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::ArtifactNotReady { .. })
    }
}

/// Errors raised by the device-linking protocol client.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to fetch protocol version: {reason}")]
    VersionFetch { reason: String },

    #[error("Failed to initialise auth state: {reason}")]
    AuthState { reason: String },

    #[error("Failed to connect: {reason}")]
    Connect { reason: String },

    #[error("Failed to flush credentials: {reason}")]
    CredentialFlush { reason: String },
}

/// Errors while materializing the consolidated credential artifact.
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// HTTP gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
