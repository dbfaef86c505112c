// src/infra/errors.rs — Error types for pagepulse

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    // Degraded, never surfaced past the tracker
    #[error("Cookie storage unavailable: {0}")]
    CookieStorage(String),

    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrackerError {
    /// Errors that mean "keep going with in-memory state" rather than
    /// "something is misconfigured".
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            TrackerError::CookieStorage(_) | TrackerError::Transport(_)
        )
    }
}
