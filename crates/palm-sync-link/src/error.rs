//! Error types for the link layers.

use palm_sync_core::dlp::DlpErrorCode;
use palm_sync_core::error::{CodecError, FramingError, ProtocolError};
use palm_sync_core::TransactionId;
use thiserror::Error;

/// Errors raised by links, handshakes and DLP connections.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The byte stream could not be framed. Fatal to the link.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    /// A protocol state machine was violated. Fatal to the link.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The handheld answered a DLP command with a non-success code.
    #[error("{command} failed on device: {code}")]
    Command {
        command: &'static str,
        code: DlpErrorCode,
    },

    /// No acknowledgment arrived for a PADP fragment.
    #[error("no PADP ack for xid {xid} at offset {offset} after {attempts} attempt(s)")]
    AckTimeout {
        xid: TransactionId,
        offset: u32,
        attempts: u32,
    },

    /// The handheld acknowledged a fragment with the memory error flag.
    #[error("handheld reported a memory error")]
    DeviceMemoryError,

    #[error("operation cancelled")]
    Cancelled,

    #[error("link closed")]
    Closed,

    #[error("link task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Device error code, if this is a command error.
    pub fn command_code(&self) -> Option<DlpErrorCode> {
        match self {
            Self::Command { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the error leaves the link unusable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Command { .. })
    }

    /// Whether the error only reports that the link went away.
    pub fn is_closure(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Closed)
    }
}

impl From<CodecError> for LinkError {
    fn from(err: CodecError) -> Self {
        Self::Protocol(ProtocolError::Malformed(err))
    }
}

/// Result type for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_code() {
        let err = LinkError::Command {
            command: "ReadDBList",
            code: DlpErrorCode::NOT_FOUND,
        };
        assert_eq!(err.command_code(), Some(DlpErrorCode::NOT_FOUND));
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("NotFound"));

        assert_eq!(LinkError::Closed.command_code(), None);
        assert!(LinkError::Closed.is_fatal());
    }

    #[test]
    fn test_codec_error_is_protocol_error() {
        let err: LinkError = CodecError::UnterminatedString.into();
        assert!(matches!(err, LinkError::Protocol(ProtocolError::Malformed(_))));
    }
}
