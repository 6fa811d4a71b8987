//! CMP (Connection Management Protocol) packets.
//!
//! CMP runs over PADP before any DLP traffic. The handheld announces itself
//! with a Wakeup; the desktop answers with Init (or Abort when the versions
//! are incompatible).

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::CodecError;
use crate::wire::WireRead;

/// Encoded size of every CMP packet.
pub const CMP_PACKET_SIZE: usize = 10;

/// Highest CMP major version this implementation speaks.
pub const CMP_VERSION_MAJOR: u8 = 1;

/// CMP minor version advertised in Init.
pub const CMP_VERSION_MINOR: u8 = 1;

/// CMP packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CmpKind {
    Wakeup = 1,
    Init = 2,
    Abort = 3,
    Extended = 4,
}

impl CmpKind {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            1 => Ok(Self::Wakeup),
            2 => Ok(Self::Init),
            3 => Ok(Self::Abort),
            4 => Ok(Self::Extended),
            other => Err(CodecError::InvalidValue {
                field: "CMP packet type",
                value: format!("{other:#04x}"),
            }),
        }
    }
}

bitflags! {
    /// Flags carried by Init packets.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CmpFlags: u8 {
        const CHANGE_BAUD_RATE = 0x80;
        const ONE_MINUTE_TIMEOUT = 0x40;
        const TWO_MINUTE_TIMEOUT = 0x20;
        const LONG_PACKET_SUPPORT = 0x10;
    }
}

/// A CMP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmpPacket {
    pub kind: CmpKind,
    pub flags: CmpFlags,
    pub version_major: u8,
    pub version_minor: u8,
    pub baud_rate: u32,
}

impl CmpPacket {
    /// Wakeup as sent by a handheld.
    pub fn wakeup(baud_rate: u32) -> Self {
        Self {
            kind: CmpKind::Wakeup,
            flags: CmpFlags::empty(),
            version_major: CMP_VERSION_MAJOR,
            version_minor: CMP_VERSION_MINOR,
            baud_rate,
        }
    }

    /// Desktop Init reply. A baud rate requests a speed change.
    pub fn init(baud_rate: Option<u32>) -> Self {
        Self {
            kind: CmpKind::Init,
            flags: if baud_rate.is_some() {
                CmpFlags::CHANGE_BAUD_RATE
            } else {
                CmpFlags::empty()
            },
            version_major: CMP_VERSION_MAJOR,
            version_minor: CMP_VERSION_MINOR,
            baud_rate: baud_rate.unwrap_or(0),
        }
    }

    /// Desktop Abort reply.
    pub fn abort() -> Self {
        Self {
            kind: CmpKind::Abort,
            flags: CmpFlags::empty(),
            version_major: CMP_VERSION_MAJOR,
            version_minor: CMP_VERSION_MINOR,
            baud_rate: 0,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(CMP_PACKET_SIZE);
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.version_major);
        buf.put_u8(self.version_minor);
        buf.put_u16(0);
        buf.put_u32(self.baud_rate);
        buf.freeze()
    }

    pub fn decode(mut data: Bytes) -> Result<Self, CodecError> {
        let kind = CmpKind::from_u8(data.take_u8()?)?;
        let flags = CmpFlags::from_bits_retain(data.take_u8()?);
        let version_major = data.take_u8()?;
        let version_minor = data.take_u8()?;
        data.skip(2)?;
        let baud_rate = data.take_u32()?;
        Ok(Self {
            kind,
            flags,
            version_major,
            version_minor,
            baud_rate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_layout() {
        let init = CmpPacket::init(Some(57_600));
        assert_eq!(
            &init.encode()[..],
            &[0x02, 0x80, 0x01, 0x01, 0x00, 0x00, 0x00, 0x00, 0xe1, 0x00]
        );
    }

    #[test]
    fn test_init_without_baud_change() {
        let init = CmpPacket::init(None);
        assert!(init.flags.is_empty());
        assert_eq!(init.encode().len(), CMP_PACKET_SIZE);
    }

    #[test]
    fn test_wakeup_decode() {
        let wakeup = CmpPacket::wakeup(9600);
        assert_eq!(CmpPacket::decode(wakeup.encode()).unwrap(), wakeup);
    }

    #[test]
    fn test_truncated_packet() {
        assert!(CmpPacket::decode(Bytes::from_static(&[0x01, 0x00, 0x01])).is_err());
    }
}
