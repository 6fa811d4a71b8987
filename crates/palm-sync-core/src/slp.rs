//! SLP (Serial Link Protocol) framing.
//!
//! ```text
//! +------+------+------+------+-----+------+--------+-----+-----+---------+--------+
//! | 0xBE | 0xEF | 0xED | dest | src | type | len:16 | xid | sum | payload | crc:16 |
//! +------+------+------+------+-----+------+--------+-----+-----+---------+--------+
//! ```
//!
//! `sum` is the 8-bit sum of the nine bytes before it. `crc` is CRC16 over
//! header and payload. All multi-byte fields are big-endian.
//!
//! The decoder starts unsynchronized: it scans for the magic and accepts a
//! candidate only when its header checksum verifies. After that any bad
//! magic, header checksum or CRC means the stream is corrupt and decoding
//! fails for good.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::checksum::{crc16, sum8};
use crate::error::FramingError;
use crate::types::TransactionId;

/// Frame start marker.
pub const SLP_MAGIC: [u8; 3] = [0xBE, 0xEF, 0xED];

/// Header size including the checksum byte.
pub const SLP_HEADER_SIZE: usize = 10;

/// CRC footer size.
pub const SLP_FOOTER_SIZE: usize = 2;

/// Maximum payload carried by one SLP packet.
pub const SLP_MAX_PAYLOAD: usize = u16::MAX as usize;

/// Well-known SLP socket ids.
pub mod socket {
    pub const DEBUGGER: u8 = 0;
    pub const CONSOLE: u8 = 1;
    pub const REMOTE_UI: u8 = 2;
    pub const DLP: u8 = 3;
}

/// SLP packet types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlpPacketType {
    System = 0,
    Padp = 2,
    Loopback = 3,
}

impl SlpPacketType {
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::System),
            2 => Some(Self::Padp),
            3 => Some(Self::Loopback),
            _ => None,
        }
    }
}

/// A decoded SLP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlpPacket {
    pub dest: u8,
    pub src: u8,
    pub packet_type: u8,
    pub xid: TransactionId,
    pub payload: Bytes,
}

impl SlpPacket {
    /// PADP packet between the two DLP sockets.
    pub fn padp(xid: TransactionId, payload: Bytes) -> Self {
        Self {
            dest: socket::DLP,
            src: socket::DLP,
            packet_type: SlpPacketType::Padp as u8,
            xid,
            payload,
        }
    }

    /// Total encoded size.
    pub fn encoded_len(&self) -> usize {
        SLP_HEADER_SIZE + self.payload.len() + SLP_FOOTER_SIZE
    }

    /// Serialize header, payload and footer.
    pub fn encode(&self) -> Result<Bytes, FramingError> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<(), FramingError> {
        if self.payload.len() > SLP_MAX_PAYLOAD {
            return Err(FramingError::PayloadTooLarge {
                size: self.payload.len(),
                max: SLP_MAX_PAYLOAD,
            });
        }
        let start = buf.len();
        buf.reserve(self.encoded_len());
        buf.put_slice(&SLP_MAGIC);
        buf.put_u8(self.dest);
        buf.put_u8(self.src);
        buf.put_u8(self.packet_type);
        buf.put_u16(self.payload.len() as u16);
        buf.put_u8(self.xid.as_u8());
        let checksum = sum8(&buf[start..start + SLP_HEADER_SIZE - 1]);
        buf.put_u8(checksum);
        buf.put_slice(&self.payload);
        let crc = crc16(&buf[start..]);
        buf.put_u16(crc);
        Ok(())
    }
}

/// Header checksum for the first nine bytes of `header`, and the stored one.
fn header_checksums(header: &[u8]) -> (u8, u8) {
    (sum8(&header[..SLP_HEADER_SIZE - 1]), header[SLP_HEADER_SIZE - 1])
}

/// Streaming SLP decoder/encoder.
#[derive(Debug, Default)]
pub struct SlpCodec {
    synchronized: bool,
}

impl SlpCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a valid header has been seen yet.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Drop bytes until `src` starts with a header whose checksum verifies.
    /// Returns false when more input is needed.
    fn synchronize(&mut self, src: &mut BytesMut) -> bool {
        let mut pos = 0;
        while pos + SLP_MAGIC.len() <= src.len() {
            if src[pos..pos + SLP_MAGIC.len()] != SLP_MAGIC {
                pos += 1;
                continue;
            }
            if pos + SLP_HEADER_SIZE > src.len() {
                // Candidate header not fully buffered yet.
                src.advance(pos);
                return false;
            }
            let (expected, actual) = header_checksums(&src[pos..pos + SLP_HEADER_SIZE]);
            if expected == actual {
                if pos > 0 {
                    tracing::debug!(skipped = pos, "SLP stream synchronized");
                }
                src.advance(pos);
                self.synchronized = true;
                return true;
            }
            pos += 1;
        }
        // Keep a possible partial magic at the tail.
        let keep = src.len().min(SLP_MAGIC.len() - 1);
        let discard = src.len() - keep;
        src.advance(discard);
        false
    }
}

impl Decoder for SlpCodec {
    type Item = SlpPacket;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SlpPacket>, FramingError> {
        if !self.synchronized && !self.synchronize(src) {
            return Ok(None);
        }

        if src.len() < SLP_HEADER_SIZE {
            return Ok(None);
        }

        if src[..SLP_MAGIC.len()] != SLP_MAGIC {
            return Err(FramingError::BadMagic(hex::encode(&src[..SLP_MAGIC.len()])));
        }

        let (expected, actual) = header_checksums(&src[..SLP_HEADER_SIZE]);
        if expected != actual {
            return Err(FramingError::HeaderChecksum { expected, actual });
        }

        let payload_len = u16::from_be_bytes([src[6], src[7]]) as usize;
        let total_len = SLP_HEADER_SIZE + payload_len + SLP_FOOTER_SIZE;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total_len);
        let body_len = SLP_HEADER_SIZE + payload_len;
        let expected_crc = crc16(&frame[..body_len]);
        let actual_crc = u16::from_be_bytes([frame[body_len], frame[body_len + 1]]);
        if expected_crc != actual_crc {
            return Err(FramingError::Crc {
                expected: expected_crc,
                actual: actual_crc,
            });
        }

        let dest = frame[3];
        let src_socket = frame[4];
        let packet_type = frame[5];
        let xid = TransactionId(frame[8]);
        frame.advance(SLP_HEADER_SIZE);
        frame.truncate(payload_len);

        let packet = SlpPacket {
            dest,
            src: src_socket,
            packet_type,
            xid,
            payload: frame.freeze(),
        };
        tracing::trace!(
            dest,
            src = src_socket,
            packet_type,
            xid = %xid,
            len = payload_len,
            "SLP packet received"
        );
        Ok(Some(packet))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<SlpPacket>, FramingError> {
        // A truncated trailing frame is dropped rather than reported.
        self.decode(src)
    }
}

impl Encoder<SlpPacket> for SlpCodec {
    type Error = FramingError;

    fn encode(&mut self, item: SlpPacket, dst: &mut BytesMut) -> Result<(), FramingError> {
        item.encode_into(dst)
    }
}
