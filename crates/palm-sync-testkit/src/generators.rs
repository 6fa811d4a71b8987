//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use palm_sync_core::dlp::records::{DbInfo, DlpDateTime, FourCc, Record, UserInfo};
use palm_sync_core::padp::{FragmentFlags, FragmentKind, PadpFragment};
use palm_sync_core::{NetSyncPacket, SlpPacket, TransactionId};

/// Any transaction id, reserved ones included.
pub fn transaction_id() -> impl Strategy<Value = TransactionId> {
    any::<u8>().prop_map(TransactionId)
}

/// Payload bytes of at most `max_len`.
pub fn payload(max_len: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..=max_len).prop_map(Bytes::from)
}

pub fn slp_packet(max_payload: usize) -> impl Strategy<Value = SlpPacket> {
    (any::<u8>(), any::<u8>(), 0u8..=3, transaction_id(), payload(max_payload)).prop_map(
        |(dest, src, packet_type, xid, payload)| SlpPacket {
            dest,
            src,
            packet_type,
            xid,
            payload,
        },
    )
}

pub fn netsync_packet(max_payload: usize) -> impl Strategy<Value = NetSyncPacket> {
    (transaction_id(), payload(max_payload))
        .prop_map(|(xid, payload)| NetSyncPacket::new(xid, payload))
}

pub fn fragment_kind() -> impl Strategy<Value = FragmentKind> {
    prop_oneof![
        Just(FragmentKind::Data),
        Just(FragmentKind::Ack),
        Just(FragmentKind::Tickle),
        Just(FragmentKind::Abort),
    ]
}

/// Fragments with a consistent header form: `size_or_offset` fits in 16 bits
/// unless the long-form flag is set.
pub fn padp_fragment() -> impl Strategy<Value = PadpFragment> {
    (fragment_kind(), any::<u8>(), any::<u32>(), payload(64)).prop_map(
        |(kind, bits, size_or_offset, body)| {
            let flags = FragmentFlags::from_bits_retain(bits);
            let size_or_offset = if flags.contains(FragmentFlags::LONG_FORM) {
                size_or_offset
            } else {
                size_or_offset & 0xFFFF
            };
            PadpFragment {
                kind,
                flags,
                size_or_offset,
                body,
            }
        },
    )
}

pub fn date_time() -> impl Strategy<Value = DlpDateTime> {
    (1904u16..=2100, 1u8..=12, 1u8..=28, 0u8..24, 0u8..60, 0u8..60).prop_map(
        |(year, month, day, hour, minute, second)| DlpDateTime {
            year,
            month,
            day,
            hour,
            minute,
            second,
        },
    )
}

/// Database and user names: printable ASCII without NUL.
pub fn palm_name(max_len: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(0x20u8..0x7f, 0..=max_len)
        .prop_map(|bytes| bytes.into_iter().map(char::from).collect())
}

pub fn user_info() -> impl Strategy<Value = UserInfo> {
    (
        any::<u32>(),
        any::<u32>(),
        any::<u32>(),
        date_time(),
        date_time(),
        palm_name(40),
        prop::collection::vec(any::<u8>(), 0..=32),
    )
        .prop_map(
            |(user_id, viewer_id, last_sync_pc_id, successful_sync_date, last_sync_date, user_name, password)| {
                UserInfo {
                    user_id,
                    viewer_id,
                    last_sync_pc_id,
                    successful_sync_date,
                    last_sync_date,
                    user_name,
                    password,
                }
            },
        )
}

pub fn db_info() -> impl Strategy<Value = DbInfo> {
    (
        any::<u8>(),
        any::<u16>(),
        any::<u32>(),
        any::<u32>(),
        any::<u16>(),
        any::<u32>(),
        (date_time(), date_time(), date_time()),
        any::<u16>(),
        palm_name(31),
    )
        .prop_map(
            |(misc_flags, db_flags, db_type, creator, version, modification_number, dates, index, name)| {
                DbInfo {
                    misc_flags,
                    db_flags,
                    db_type: FourCc(db_type),
                    creator: FourCc(creator),
                    version,
                    modification_number,
                    creation_date: dates.0,
                    modification_date: dates.1,
                    backup_date: dates.2,
                    index,
                    name,
                }
            },
        )
}

pub fn record(max_data: usize) -> impl Strategy<Value = Record> {
    (any::<u32>(), any::<u16>(), any::<u8>(), 0u8..16, payload(max_data)).prop_map(
        |(id, index, attributes, category, data)| Record {
            id,
            index,
            attributes,
            category,
            data,
        },
    )
}
