//! Device-reported DLP status codes and sync termination codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error code carried in every DLP response.
///
/// Unknown values are preserved as-is.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DlpErrorCode(pub u16);

impl DlpErrorCode {
    pub const NONE: Self = Self(0x00);
    pub const SYSTEM: Self = Self(0x01);
    pub const ILLEGAL_REQUEST: Self = Self(0x02);
    pub const NOT_ENOUGH_MEMORY: Self = Self(0x03);
    pub const PARAM_ERROR: Self = Self(0x04);
    pub const NOT_FOUND: Self = Self(0x05);
    pub const NONE_OPEN: Self = Self(0x06);
    pub const DATABASE_OPEN: Self = Self(0x07);
    pub const TOO_MANY_OPEN_DBS: Self = Self(0x08);
    pub const ALREADY_EXISTS: Self = Self(0x09);
    pub const CANT_OPEN: Self = Self(0x0a);
    pub const RECORD_DELETED: Self = Self(0x0b);
    pub const RECORD_BUSY: Self = Self(0x0c);
    pub const NOT_SUPPORTED: Self = Self(0x0d);
    pub const UNUSED: Self = Self(0x0e);
    pub const READ_ONLY: Self = Self(0x0f);
    pub const NOT_ENOUGH_SPACE: Self = Self(0x10);
    pub const LIMIT_EXCEEDED: Self = Self(0x11);
    pub const CANCEL_SYNC: Self = Self(0x12);
    pub const BAD_WRAPPER: Self = Self(0x13);
    pub const ARG_MISSING: Self = Self(0x14);
    pub const ARG_SIZE: Self = Self(0x15);

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Symbolic name, if the code is one the protocol defines.
    pub const fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0x00 => "None",
            0x01 => "SystemError",
            0x02 => "IllegalRequest",
            0x03 => "NotEnoughMemory",
            0x04 => "ParamError",
            0x05 => "NotFound",
            0x06 => "NoneOpen",
            0x07 => "DatabaseOpen",
            0x08 => "TooManyOpenDatabases",
            0x09 => "AlreadyExists",
            0x0a => "CantOpen",
            0x0b => "RecordDeleted",
            0x0c => "RecordBusy",
            0x0d => "NotSupported",
            0x0e => "Unused",
            0x0f => "ReadOnly",
            0x10 => "NotEnoughSpace",
            0x11 => "LimitExceeded",
            0x12 => "CancelSync",
            0x13 => "BadWrapper",
            0x14 => "ArgMissing",
            0x15 => "ArgSize",
            _ => return None,
        })
    }
}

impl fmt::Debug for DlpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DlpErrorCode({self})")
    }
}

impl fmt::Display for DlpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#06x})", self.0),
            None => write!(f, "unknown ({:#06x})", self.0),
        }
    }
}

/// Status sent with EndOfSync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum SyncTermCode {
    Okay = 0,
    OutOfMemory = 1,
    UserCancelled = 2,
    UnknownError = 3,
    Incompatible = 4,
}

impl SyncTermCode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Okay),
            1 => Some(Self::OutOfMemory),
            2 => Some(Self::UserCancelled),
            3 => Some(Self::UnknownError),
            4 => Some(Self::Incompatible),
            _ => None,
        }
    }
}
