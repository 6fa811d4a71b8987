//! PADP (Packet Assembly/Disassembly Protocol) fragment format and the pure
//! halves of fragmentation: splitting a payload and validating reassembly.
//!
//! ```text
//! +------+-------+---------------------------+------+
//! | type | flags | size_or_offset:16 (or :32) | body |
//! +------+-------+---------------------------+------+
//! ```
//!
//! The 32-bit form is used when `flags` has `LONG_FORM` set.

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{CodecError, ProtocolError};
use crate::wire::WireRead;

/// Largest body carried by one fragment.
pub const PADP_MTU: usize = 1024;

/// Header size in the 16-bit form.
pub const PADP_HEADER_SIZE: usize = 4;

/// Header size in the 32-bit form.
pub const PADP_LONG_HEADER_SIZE: usize = 6;

/// Fragment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FragmentKind {
    Data = 1,
    Ack = 2,
    Tickle = 4,
    Abort = 8,
}

impl FragmentKind {
    pub fn from_u8(value: u8) -> Result<Self, CodecError> {
        match value {
            1 => Ok(Self::Data),
            2 => Ok(Self::Ack),
            4 => Ok(Self::Tickle),
            8 => Ok(Self::Abort),
            other => Err(CodecError::InvalidValue {
                field: "PADP fragment type",
                value: format!("{other:#04x}"),
            }),
        }
    }
}

bitflags! {
    /// PADP fragment flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FragmentFlags: u8 {
        const FIRST = 0x80;
        const LAST = 0x40;
        const MEMORY_ERROR = 0x20;
        const LONG_FORM = 0x10;
    }
}

/// One PADP fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadpFragment {
    pub kind: FragmentKind,
    pub flags: FragmentFlags,
    /// Total payload length on a First fragment, otherwise the byte offset
    /// of this fragment's body within the payload.
    pub size_or_offset: u32,
    pub body: Bytes,
}

impl PadpFragment {
    /// Acknowledgment echoing a received data fragment.
    pub fn ack_for(data: &PadpFragment) -> Self {
        Self {
            kind: FragmentKind::Ack,
            flags: data.flags,
            size_or_offset: data.size_or_offset,
            body: Bytes::new(),
        }
    }

    pub fn encode(&self) -> Bytes {
        let long = self.flags.contains(FragmentFlags::LONG_FORM);
        let header = if long {
            PADP_LONG_HEADER_SIZE
        } else {
            PADP_HEADER_SIZE
        };
        let mut buf = BytesMut::with_capacity(header + self.body.len());
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.flags.bits());
        if long {
            buf.put_u32(self.size_or_offset);
        } else {
            buf.put_u16(self.size_or_offset as u16);
        }
        buf.put_slice(&self.body);
        buf.freeze()
    }

    pub fn decode(mut data: Bytes) -> Result<Self, CodecError> {
        let kind = FragmentKind::from_u8(data.take_u8()?)?;
        let flags = FragmentFlags::from_bits_retain(data.take_u8()?);
        let size_or_offset = if flags.contains(FragmentFlags::LONG_FORM) {
            data.take_u32()?
        } else {
            u32::from(data.take_u16()?)
        };
        Ok(Self {
            kind,
            flags,
            size_or_offset,
            body: data,
        })
    }
}

/// Split a payload into data fragments of at most [`PADP_MTU`] bytes.
///
/// An empty payload still produces a single First|Last fragment.
pub fn split_payload(payload: &Bytes) -> Vec<PadpFragment> {
    let total = payload.len();
    let long = FragmentFlags::LONG_FORM;
    let base = if total > u16::MAX as usize {
        long
    } else {
        FragmentFlags::empty()
    };

    if total == 0 {
        return vec![PadpFragment {
            kind: FragmentKind::Data,
            flags: base | FragmentFlags::FIRST | FragmentFlags::LAST,
            size_or_offset: 0,
            body: Bytes::new(),
        }];
    }

    let mut fragments = Vec::with_capacity(total.div_ceil(PADP_MTU));
    let mut offset = 0;
    while offset < total {
        let end = (offset + PADP_MTU).min(total);
        let mut flags = base;
        if offset == 0 {
            flags |= FragmentFlags::FIRST;
        }
        if end == total {
            flags |= FragmentFlags::LAST;
        }
        fragments.push(PadpFragment {
            kind: FragmentKind::Data,
            flags,
            size_or_offset: if offset == 0 { total as u32 } else { offset as u32 },
            body: payload.slice(offset..end),
        });
        offset = end;
    }
    fragments
}

/// Reassembly state for one connection.
///
/// Holds a buffer only between a First fragment and its matching Last.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: Option<BytesMut>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a payload is partially assembled.
    pub fn in_progress(&self) -> bool {
        self.buffer.is_some()
    }

    /// Feed a data fragment. Returns the full payload once the Last
    /// fragment arrives.
    pub fn push(&mut self, fragment: &PadpFragment) -> Result<Option<Bytes>, ProtocolError> {
        if fragment.flags.contains(FragmentFlags::FIRST) {
            if let Some(buffer) = &self.buffer {
                return Err(ProtocolError::FragmentSequence(format!(
                    "First fragment while {} bytes are still being assembled",
                    buffer.len()
                )));
            }
            let capacity = (fragment.size_or_offset as usize).min(1 << 20);
            let mut buffer = BytesMut::with_capacity(capacity);
            buffer.extend_from_slice(&fragment.body);
            self.buffer = Some(buffer);
        } else {
            let Some(buffer) = self.buffer.as_mut() else {
                return Err(ProtocolError::FragmentSequence(format!(
                    "continuation fragment at offset {} with no First fragment",
                    fragment.size_or_offset
                )));
            };
            if buffer.len() != fragment.size_or_offset as usize {
                return Err(ProtocolError::FragmentSequence(format!(
                    "offset {} does not match {} bytes received",
                    fragment.size_or_offset,
                    buffer.len()
                )));
            }
            buffer.extend_from_slice(&fragment.body);
        }

        if fragment.flags.contains(FragmentFlags::LAST) {
            Ok(self.buffer.take().map(BytesMut::freeze))
        } else {
            Ok(None)
        }
    }

    /// Drop any partial payload.
    pub fn reset(&mut self) {
        self.buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_short_form_header() {
        let fragment = PadpFragment {
            kind: FragmentKind::Data,
            flags: FragmentFlags::FIRST | FragmentFlags::LAST,
            size_or_offset: 3,
            body: Bytes::from_static(b"abc"),
        };
        let encoded = fragment.encode();
        assert_eq!(&encoded[..], b"\x01\xc0\x00\x03abc");
        assert_eq!(PadpFragment::decode(encoded).unwrap(), fragment);
    }

    #[test]
    fn test_long_form_header() {
        let payload = Bytes::from(vec![7u8; 70_000]);
        let fragments = split_payload(&payload);
        assert!(fragments
            .iter()
            .all(|f| f.flags.contains(FragmentFlags::LONG_FORM)));
        let encoded = fragments[0].encode();
        assert_eq!(&encoded[..6], &[0x01, 0x90, 0x00, 0x01, 0x11, 0x70]);
        assert_eq!(PadpFragment::decode(encoded).unwrap().size_or_offset, 70_000);
    }

    #[test]
    fn test_ack_echoes_fragment() {
        let data = PadpFragment {
            kind: FragmentKind::Data,
            flags: FragmentFlags::LAST,
            size_or_offset: 1024,
            body: Bytes::from_static(b"x"),
        };
        let ack = PadpFragment::ack_for(&data);
        assert_eq!(ack.kind, FragmentKind::Ack);
        assert_eq!(ack.flags, FragmentFlags::LAST);
        assert_eq!(ack.size_or_offset, 1024);
        assert!(ack.body.is_empty());
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(PadpFragment::decode(Bytes::from_static(b"\x03\x00\x00\x00")).is_err());
    }

    #[test]
    fn test_split_three_fragments() {
        let payload = Bytes::from((0..2500u32).map(|i| i as u8).collect::<Vec<_>>());
        let fragments = split_payload(&payload);
        assert_eq!(fragments.len(), 3);
        assert_eq!(fragments[0].size_or_offset, 2500);
        assert_eq!(fragments[0].flags, FragmentFlags::FIRST);
        assert_eq!(fragments[1].size_or_offset, 1024);
        assert_eq!(fragments[1].flags, FragmentFlags::empty());
        assert_eq!(fragments[2].size_or_offset, 2048);
        assert_eq!(fragments[2].flags, FragmentFlags::LAST);
        assert_eq!(fragments[2].body.len(), 452);
    }

    #[test]
    fn test_empty_payload_single_fragment() {
        let fragments = split_payload(&Bytes::new());
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].flags, FragmentFlags::FIRST | FragmentFlags::LAST);

        let mut reassembler = Reassembler::new();
        assert_eq!(reassembler.push(&fragments[0]).unwrap(), Some(Bytes::new()));
    }

    #[test]
    fn test_offset_mismatch_is_protocol_error() {
        let payload = Bytes::from(vec![1u8; 3000]);
        let mut fragments = split_payload(&payload);
        fragments[1].size_or_offset = 1000;

        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&fragments[0]).unwrap().is_none());
        assert!(matches!(
            reassembler.push(&fragments[1]),
            Err(ProtocolError::FragmentSequence(_))
        ));
    }

    #[test]
    fn test_second_first_fragment_rejected() {
        let fragments = split_payload(&Bytes::from(vec![0u8; 2000]));
        let mut reassembler = Reassembler::new();
        reassembler.push(&fragments[0]).unwrap();
        assert!(reassembler.push(&fragments[0]).is_err());
    }

    #[test]
    fn test_continuation_without_first_rejected() {
        let fragments = split_payload(&Bytes::from(vec![0u8; 2000]));
        let mut reassembler = Reassembler::new();
        assert!(reassembler.push(&fragments[1]).is_err());
        assert!(!reassembler.in_progress());
    }

    proptest! {
        #[test]
        fn split_and_reassemble(payload in prop::collection::vec(any::<u8>(), 1025..6000)) {
            let payload = Bytes::from(payload);
            let fragments = split_payload(&payload);
            prop_assert_eq!(fragments.len(), payload.len().div_ceil(PADP_MTU));
            prop_assert_eq!(fragments[0].size_or_offset as usize, payload.len());
            for (i, fragment) in fragments.iter().enumerate().skip(1) {
                prop_assert_eq!(fragment.size_or_offset as usize, i * PADP_MTU);
            }

            let mut reassembler = Reassembler::new();
            let mut result = None;
            for fragment in &fragments {
                let decoded = PadpFragment::decode(fragment.encode()).unwrap();
                result = reassembler.push(&decoded).unwrap();
            }
            prop_assert_eq!(result, Some(payload));
            prop_assert!(!reassembler.in_progress());
        }
    }
}
