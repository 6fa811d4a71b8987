//! Error types for the HotSync wire primitives.

use thiserror::Error;

/// Errors raised while turning a byte stream into frames.
///
/// Every variant except `Io` means the stream can no longer be trusted;
/// callers treat them as fatal to the link.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("lost SLP frame alignment: expected magic, got {0}")]
    BadMagic(String),

    #[error("SLP header checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    HeaderChecksum { expected: u8, actual: u8 },

    #[error("SLP CRC16 mismatch: expected {expected:#06x}, got {actual:#06x}")]
    Crc { expected: u16, actual: u16 },

    #[error("unexpected NetSync packet type {0:#04x}")]
    NetSyncType(u8),

    #[error("payload of {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the fixed-layout binary codec used for DLP arguments and
/// protocol headers.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("string is not NUL-terminated")]
    UnterminatedString,

    #[error("{field} is {len} bytes, over its wire limit of {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
}

/// Violations of the protocol state machines that pure code can detect.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("DLP response opcode {actual:#04x} does not match request {expected:#04x}")]
    OpcodeMismatch { expected: u8, actual: u8 },

    #[error("unknown DLP opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("DLP argument {id:#04x} is not declared by {command}")]
    UnknownArgument { command: &'static str, id: u8 },

    #[error("required DLP argument {name} missing from {command}")]
    MissingArgument {
        command: &'static str,
        name: &'static str,
    },

    #[error("DLP argument {name} is {size} bytes, larger than the small form allows")]
    ArgumentTooLarge { name: &'static str, size: usize },

    #[error("DLP argument {name} has type {actual}, expected {expected}")]
    ArgumentType {
        name: &'static str,
        expected: &'static str,
        actual: String,
    },

    #[error("unexpected transaction id: expected {expected:#04x}, got {actual:#04x}")]
    TransactionId { expected: u8, actual: u8 },

    #[error("PADP fragment out of sequence: {0}")]
    FragmentSequence(String),

    #[error("PADP abort received")]
    Aborted,

    #[error("unexpected {what}: expected {expected} bytes, got {actual}")]
    HandshakeLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unexpected CMP packet: {0}")]
    Cmp(String),

    #[error("DLP argument {name} cannot be encoded: {source}")]
    ArgumentOverflow {
        name: &'static str,
        #[source]
        source: CodecError,
    },

    #[error("malformed packet: {0}")]
    Malformed(#[from] CodecError),
}

/// Result type for framing operations.
pub type FramingResult<T> = std::result::Result<T, FramingError>;

/// Result type for codec operations.
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Result type for protocol checks.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
