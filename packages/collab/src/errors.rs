//! Error types for the collaboration session

use crate::session::SessionStatus;
use routevn_protocol::{CommandError, TransportError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollabError {
    #[error("Session is not active ({0:?})")]
    NotActive(SessionStatus),

    #[error("Authentication failed: {code}: {message}")]
    Auth { code: String, message: String },

    #[error("Server error: {code}: {message}")]
    Server { code: String, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    #[error("Cursor store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session stopped while waiting for the server")]
    Disconnected,
}

impl CollabError {
    /// Stable error code, matching the codes the server uses
    pub fn code(&self) -> &str {
        match self {
            CollabError::NotActive(_) => "session_not_active",
            CollabError::Auth { code, .. } | CollabError::Server { code, .. } => code.as_str(),
            CollabError::Transport(e) => e.code(),
            CollabError::Timeout(_) => "timeout",
            CollabError::Command(_) => "invalid_command",
            CollabError::Store(_) => "cursor_store_failed",
            CollabError::Disconnected => "transport_disconnected",
        }
    }

    /// The server refused the session; retrying the same credentials and
    /// partitions cannot succeed
    pub fn is_refusal(&self) -> bool {
        matches!(self, CollabError::Auth { .. } | CollabError::Server { .. })
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cursor file: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Config is missing `{0}`")]
    Missing(&'static str),
}
