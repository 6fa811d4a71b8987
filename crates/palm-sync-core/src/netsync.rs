//! NetSync framing, used over USB and TCP links.
//!
//! ```text
//! +------+-----+------------+---------+
//! | 0x01 | xid | len:32 (BE)| payload |
//! +------+-----+------------+---------+
//! ```
//!
//! There is no checksum; the underlying link is assumed reliable.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FramingError;
use crate::types::TransactionId;

/// The only packet type NetSync defines.
pub const NETSYNC_DATA_TYPE: u8 = 0x01;

/// Header size.
pub const NETSYNC_HEADER_SIZE: usize = 6;

/// Default upper bound on a single payload.
pub const DEFAULT_MAX_PAYLOAD: usize = 1 << 20;

/// Handshake constants. These are replayed byte-for-byte; their inner
/// fields are not interpreted.
pub mod handshake {
    /// Length of the wake-up packet sent by the handheld.
    pub const WAKEUP_LEN: usize = 22;

    /// First desktop handshake request.
    pub const REQUEST_1: [u8; 50] = [
        0x12, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x24,
        0xff, 0xff, 0xff, 0xff, 0x3c, 0x00, 0x3c, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0xc0, 0xa8, 0xa5, 0x1f, 0x04, 0x27, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];

    /// Expected length of the handheld's reply to [`REQUEST_1`].
    pub const RESPONSE_1_LEN: usize = 50;

    /// Second desktop handshake request.
    pub const REQUEST_2: [u8; 46] = [
        0x13, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x00, 0x00, 0x00, 0x20,
        0xff, 0xff, 0xff, 0xff, 0x00, 0x3c, 0x00, 0x3c, 0x40, 0x00, 0x00, 0x00, 0x01, 0x00,
        0x00, 0x00, 0xc0, 0xa8, 0xa5, 0x1f, 0x04, 0x27, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
    ];

    /// Expected length of the handheld's reply to [`REQUEST_2`].
    pub const RESPONSE_2_LEN: usize = 8;
}

/// A decoded NetSync packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetSyncPacket {
    pub xid: TransactionId,
    pub payload: Bytes,
}

impl NetSyncPacket {
    pub fn new(xid: TransactionId, payload: Bytes) -> Self {
        Self { xid, payload }
    }

    /// Serialize header and payload.
    pub fn encode(&self) -> Result<Bytes, FramingError> {
        let mut buf = BytesMut::with_capacity(NETSYNC_HEADER_SIZE + self.payload.len());
        self.encode_into(&mut buf)?;
        Ok(buf.freeze())
    }

    fn encode_into(&self, buf: &mut BytesMut) -> Result<(), FramingError> {
        let len = u32::try_from(self.payload.len()).map_err(|_| FramingError::PayloadTooLarge {
            size: self.payload.len(),
            max: u32::MAX as usize,
        })?;
        buf.reserve(NETSYNC_HEADER_SIZE + self.payload.len());
        buf.put_u8(NETSYNC_DATA_TYPE);
        buf.put_u8(self.xid.as_u8());
        buf.put_u32(len);
        buf.put_slice(&self.payload);
        Ok(())
    }
}

/// Streaming NetSync decoder/encoder.
#[derive(Debug)]
pub struct NetSyncCodec {
    max_payload: usize,
}

impl NetSyncCodec {
    pub fn new() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Create a codec with a custom payload limit.
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for NetSyncCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NetSyncCodec {
    type Item = NetSyncPacket;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<NetSyncPacket>, FramingError> {
        if src.len() < NETSYNC_HEADER_SIZE {
            return Ok(None);
        }

        if src[0] != NETSYNC_DATA_TYPE {
            return Err(FramingError::NetSyncType(src[0]));
        }

        let payload_len = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if payload_len > self.max_payload {
            return Err(FramingError::PayloadTooLarge {
                size: payload_len,
                max: self.max_payload,
            });
        }

        let total_len = NETSYNC_HEADER_SIZE + payload_len;
        if src.len() < total_len {
            src.reserve(total_len - src.len());
            return Ok(None);
        }

        let xid = TransactionId(src[1]);
        src.advance(NETSYNC_HEADER_SIZE);
        let payload = src.split_to(payload_len).freeze();
        tracing::trace!(xid = %xid, len = payload_len, "NetSync packet received");
        Ok(Some(NetSyncPacket { xid, payload }))
    }
}

impl Encoder<NetSyncPacket> for NetSyncCodec {
    type Error = FramingError;

    fn encode(&mut self, item: NetSyncPacket, dst: &mut BytesMut) -> Result<(), FramingError> {
        if item.payload.len() > self.max_payload {
            return Err(FramingError::PayloadTooLarge {
                size: item.payload.len(),
                max: self.max_payload,
            });
        }
        item.encode_into(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = NetSyncPacket::new(TransactionId(0x07), Bytes::from_static(b"abc"));
        assert_eq!(&packet.encode().unwrap()[..], b"\x01\x07\x00\x00\x00\x03abc");
    }

    #[test]
    fn test_decode_split_input() {
        let encoded = NetSyncPacket::new(TransactionId(3), Bytes::from_static(b"hello"))
            .encode()
            .unwrap();
        let mut codec = NetSyncCodec::new();
        let mut buf = BytesMut::from(&encoded[..4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&encoded[4..8]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 8, "partial frame must stay buffered");
        buf.extend_from_slice(&encoded[8..]);
        let packet = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(packet.xid, TransactionId(3));
        assert_eq!(&packet.payload[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_back_to_back_packets() {
        let mut buf = BytesMut::new();
        let mut codec = NetSyncCodec::new();
        for xid in 2..5u8 {
            codec
                .encode(NetSyncPacket::new(TransactionId(xid), Bytes::from(vec![xid; xid as usize])), &mut buf)
                .unwrap();
        }
        for xid in 2..5u8 {
            let packet = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(packet.xid.as_u8(), xid);
            assert_eq!(packet.payload.len(), xid as usize);
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_wrong_type_is_fatal() {
        let mut buf = BytesMut::from(&b"\x02\x01\x00\x00\x00\x00"[..]);
        assert!(matches!(
            NetSyncCodec::new().decode(&mut buf),
            Err(FramingError::NetSyncType(0x02))
        ));
    }

    #[test]
    fn test_payload_limit() {
        let mut buf = BytesMut::from(&b"\x01\x01\x00\x00\x01\x00"[..]);
        assert!(matches!(
            NetSyncCodec::with_max_payload(16).decode(&mut buf),
            Err(FramingError::PayloadTooLarge { size: 256, max: 16 })
        ));
    }

    #[test]
    fn test_handshake_constant_lengths() {
        assert_eq!(handshake::REQUEST_1.len(), 50);
        assert_eq!(handshake::REQUEST_2.len(), 46);
    }
}
