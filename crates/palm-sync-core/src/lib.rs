//! # palm-sync core
//!
//! Wire primitives for the Palm HotSync protocol family.
//!
//! This crate contains no I/O and spawns no tasks. Everything here is pure
//! computation over byte buffers, so each layer can be tested in isolation.
//!
//! ## Layers
//!
//! - [`checksum`] - CRC16 (poly 0x1021) and the 8-bit additive header sum
//! - [`slp`] - SLP framing with its resynchronizing decoder
//! - [`netsync`] - NetSync length-prefixed framing and handshake constants
//! - [`padp`] - PADP fragment header, payload splitting and reassembly
//! - [`cmp`] - CMP wakeup/init packets
//! - [`dlp`] - DLP commands, argument codec and device status codes

pub mod checksum;
pub mod cmp;
pub mod dlp;
pub mod error;
pub mod netsync;
pub mod padp;
pub mod slp;
pub mod types;
pub mod wire;

pub use checksum::{crc16, sum8, Crc16};
pub use cmp::{CmpFlags, CmpKind, CmpPacket};
pub use dlp::{ArgId, ArgMap, CommandDef, DlpErrorCode, DlpOpcode, DlpRegistry, SyncTermCode};
pub use error::{CodecError, FramingError, ProtocolError};
pub use netsync::{NetSyncCodec, NetSyncPacket};
pub use padp::{FragmentFlags, FragmentKind, PadpFragment, Reassembler, PADP_MTU};
pub use slp::{SlpCodec, SlpPacket, SlpPacketType};
pub use types::{TransactionCounter, TransactionId};
