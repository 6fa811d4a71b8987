//! Golden byte vectors.
//!
//! Frames captured from the wire format by hand. Every encoder in the
//! workspace must reproduce them exactly, and every decoder must accept
//! them.

use bytes::Bytes;
use palm_sync_core::cmp::CmpPacket;
use palm_sync_core::dlp::{encode_request, ArgMap, DlpOpcode, DlpRegistry};
use palm_sync_core::dlp::records::ReadDbListRequest;
use palm_sync_core::padp::PadpFragment;
use palm_sync_core::{crc16, ArgId, NetSyncPacket, SlpPacket, TransactionId};

/// A CRC16 input and its checksum.
#[derive(Debug, Clone)]
pub struct CrcVector {
    pub name: &'static str,
    pub input: &'static [u8],
    pub crc: u16,
}

pub fn crc_vectors() -> Vec<CrcVector> {
    vec![
        CrcVector {
            name: "check string",
            input: b"123456789",
            crc: 0x31C3,
        },
        CrcVector {
            name: "empty",
            input: b"",
            crc: 0x0000,
        },
        CrcVector {
            name: "single zero byte",
            input: &[0x00],
            crc: 0x0000,
        },
    ]
}

/// A complete SLP frame.
#[derive(Debug, Clone)]
pub struct SlpVector {
    pub name: &'static str,
    pub dest: u8,
    pub src: u8,
    pub packet_type: u8,
    pub xid: u8,
    pub payload_hex: &'static str,
    pub frame_hex: &'static str,
}

impl SlpVector {
    pub fn packet(&self) -> SlpPacket {
        SlpPacket {
            dest: self.dest,
            src: self.src,
            packet_type: self.packet_type,
            xid: TransactionId(self.xid),
            payload: from_hex(self.payload_hex),
        }
    }

    pub fn frame(&self) -> Bytes {
        from_hex(self.frame_hex)
    }
}

pub fn slp_vectors() -> Vec<SlpVector> {
    vec![
        SlpVector {
            name: "PADP data fragment",
            dest: 3,
            src: 3,
            packet_type: 2,
            xid: 0x02,
            payload_hex: "01c000021000",
            frame_hex: "beefed030302000602aa01c0000210001ec0",
        },
        SlpVector {
            name: "empty payload",
            dest: 3,
            src: 3,
            packet_type: 2,
            xid: 0x02,
            payload_hex: "",
            frame_hex: "beefed030302000002a44828",
        },
        SlpVector {
            name: "CMP wakeup at 9600 baud",
            dest: 3,
            src: 3,
            packet_type: 2,
            xid: 0xff,
            payload_hex: "01c0000a01000101000000002580",
            frame_hex: "beefed030302000effaf01c0000a0100010100000000258071ae",
        },
        SlpVector {
            name: "loopback",
            dest: 3,
            src: 3,
            packet_type: 3,
            xid: 0x05,
            payload_hex: "70696e67",
            frame_hex: "beefed030303000405ac70696e67575a",
        },
    ]
}

/// Encoded NetSync frame for `xid` and `payload`.
#[derive(Debug, Clone)]
pub struct NetSyncVector {
    pub name: &'static str,
    pub xid: u8,
    pub payload_hex: &'static str,
    pub frame_hex: &'static str,
}

impl NetSyncVector {
    pub fn packet(&self) -> NetSyncPacket {
        NetSyncPacket::new(TransactionId(self.xid), from_hex(self.payload_hex))
    }

    pub fn frame(&self) -> Bytes {
        from_hex(self.frame_hex)
    }
}

pub fn netsync_vectors() -> Vec<NetSyncVector> {
    vec![
        NetSyncVector {
            name: "short payload",
            xid: 0x02,
            payload_hex: "616263",
            frame_hex: "010200000003616263",
        },
        NetSyncVector {
            name: "ReadUserInfo request",
            xid: 0x03,
            payload_hex: "1000",
            frame_hex: "0103000000021000",
        },
    ]
}

/// DLP request bytes for one command.
#[derive(Debug, Clone)]
pub struct DlpVector {
    pub name: &'static str,
    pub request_hex: &'static str,
}

pub fn dlp_vectors() -> Vec<DlpVector> {
    vec![
        DlpVector {
            name: "ReadUserInfo",
            request_hex: "1000",
        },
        DlpVector {
            name: "ReadDBList RAM from 0",
            request_hex: "16012004a0000000",
        },
    ]
}

fn from_hex(text: &str) -> Bytes {
    Bytes::from(hex::decode(text).unwrap_or_else(|err| panic!("bad vector hex {text:?}: {err}")))
}

/// Re-encode every vector and compare. Returns a description of the first
/// mismatch.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in crc_vectors() {
        let actual = crc16(vector.input);
        if actual != vector.crc {
            return Err(format!(
                "crc {}: expected {:#06x}, got {actual:#06x}",
                vector.name, vector.crc
            ));
        }
    }

    for vector in slp_vectors() {
        let encoded = vector
            .packet()
            .encode()
            .map_err(|err| format!("slp {}: {err}", vector.name))?;
        if encoded != vector.frame() {
            return Err(format!(
                "slp {}: expected {}, got {}",
                vector.name,
                vector.frame_hex,
                hex::encode(&encoded)
            ));
        }
    }

    for vector in netsync_vectors() {
        let encoded = vector
            .packet()
            .encode()
            .map_err(|err| format!("netsync {}: {err}", vector.name))?;
        if encoded != vector.frame() {
            return Err(format!(
                "netsync {}: expected {}, got {}",
                vector.name,
                vector.frame_hex,
                hex::encode(&encoded)
            ));
        }
    }

    let registry = DlpRegistry::standard();
    for (vector, (opcode, args)) in dlp_vectors().into_iter().zip(dlp_vector_requests()) {
        let def = registry.lookup(opcode).map_err(|err| err.to_string())?;
        let encoded = encode_request(def, &args).map_err(|err| err.to_string())?;
        if hex::encode(&encoded) != vector.request_hex {
            return Err(format!(
                "dlp {}: expected {}, got {}",
                vector.name,
                vector.request_hex,
                hex::encode(&encoded)
            ));
        }
    }

    Ok(())
}

fn dlp_vector_requests() -> Vec<(DlpOpcode, ArgMap)> {
    vec![
        (DlpOpcode::READ_USER_INFO, ArgMap::new()),
        (
            DlpOpcode::READ_DB_LIST,
            ArgMap::new().with(ArgId::FIRST, ReadDbListRequest::ram(0)),
        ),
    ]
}

/// Body of the CMP wakeup carried by the "CMP wakeup at 9600 baud" vector.
pub fn cmp_wakeup_9600() -> CmpPacket {
    CmpPacket::wakeup(9600)
}

/// PADP fragments of the SLP vectors that carry PADP.
pub fn padp_fragments() -> Vec<PadpFragment> {
    slp_vectors()
        .iter()
        .filter(|vector| vector.packet_type == 2 && !vector.payload_hex.is_empty())
        .filter_map(|vector| PadpFragment::decode(from_hex(vector.payload_hex)).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use palm_sync_core::padp::{FragmentFlags, FragmentKind};
    use palm_sync_core::{NetSyncCodec, SlpCodec};
    use tokio_util::codec::Decoder;

    #[test]
    fn test_all_vectors_verify() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_slp_vectors_decode() {
        for vector in slp_vectors() {
            let mut buf = BytesMut::from(&vector.frame()[..]);
            let decoded = SlpCodec::new().decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, vector.packet(), "{}", vector.name);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_netsync_vectors_decode() {
        for vector in netsync_vectors() {
            let mut buf = BytesMut::from(&vector.frame()[..]);
            let decoded = NetSyncCodec::new().decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, vector.packet(), "{}", vector.name);
        }
    }

    #[test]
    fn test_cmp_wakeup_vector() {
        let fragments = padp_fragments();
        let wakeup = fragments
            .iter()
            .find(|fragment| fragment.size_or_offset == 10)
            .unwrap();
        assert_eq!(wakeup.kind, FragmentKind::Data);
        assert_eq!(wakeup.flags, FragmentFlags::FIRST | FragmentFlags::LAST);
        assert_eq!(wakeup.body, cmp_wakeup_9600().encode());
    }
}
