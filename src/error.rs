//! Error taxonomy for the proctoring core.
//!
//! None of these are fatal. Each is recovered where it occurs, reported to the
//! diagnostic sink and degrades the affected monitor instead of the host.

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ProctorError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProctorError {
    /// Vision backend failed to load; the capability stays not-ready.
    #[error("vision backend initialization failed: {0}")]
    Initialization(String),

    /// Camera permission denied or device unavailable; sampling stays idle.
    #[error("media access failed: {0}")]
    MediaAccess(String),

    /// Fullscreen request rejected by the environment; status unchanged.
    #[error("fullscreen request rejected: {0}")]
    Trigger(String),

    /// Unreadable or invalid configuration file.
    #[error("config error: {0}")]
    Config(String),

    /// A background task could not be joined during teardown.
    #[error("shutdown error: {0}")]
    Shutdown(String),
}

impl ProctorError {
    pub fn initialization(err: impl std::fmt::Display) -> Self {
        Self::Initialization(err.to_string())
    }

    pub fn media_access(err: impl std::fmt::Display) -> Self {
        Self::MediaAccess(err.to_string())
    }

    pub fn trigger(err: impl std::fmt::Display) -> Self {
        Self::Trigger(err.to_string())
    }

    /// Short machine-readable tag, used in diagnostic events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Initialization(_) => "initialization",
            Self::MediaAccess(_) => "media_access",
            Self::Trigger(_) => "trigger",
            Self::Config(_) => "config",
            Self::Shutdown(_) => "shutdown",
        }
    }
}

impl From<serde_json::Error> for ProctorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for ProctorError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}
