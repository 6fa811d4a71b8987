//! Error types for sync sessions.

use palm_sync_link::LinkError;
use thiserror::Error;

/// Errors that end a sync session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The link or a protocol layer failed.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// The sync handler returned an error.
    #[error("sync handler failed: {0:#}")]
    Handler(anyhow::Error),

    /// The device connector could not produce a link.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Device status code, if the session died on a failed DLP command.
    pub fn command_code(&self) -> Option<palm_sync_core::DlpErrorCode> {
        match self {
            Self::Link(err) => err.command_code(),
            Self::Handler(err) => err
                .downcast_ref::<LinkError>()
                .and_then(LinkError::command_code),
            Self::Io(_) => None,
        }
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
