//! Argument value types for the standard DLP commands.
//!
//! Each type knows its own fixed big-endian layout. Dates are the 8-byte
//! DLP form: `year:16 month day hour minute second pad`.

use std::fmt;

use bitflags::bitflags;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::dlp::args::{DecodeArg, DlpArg};
use crate::dlp::status::SyncTermCode;
use crate::error::{CodecError, CodecResult};
use crate::wire::{check_len, cstring_len, latin1_decode, put_cstring, WireRead};

/// Encoded size of [`DlpDateTime`].
pub const DATE_TIME_SIZE: usize = 8;

/// Fixed portion of a [`DbInfo`] entry, excluding the name.
pub const DB_INFO_FIXED_SIZE: usize = 44;

/// Timestamp in the DLP wire form. A zero year means "never".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DlpDateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DlpDateTime {
    pub const NEVER: Self = Self {
        year: 0,
        month: 0,
        day: 0,
        hour: 0,
        minute: 0,
        second: 0,
    };

    pub fn is_never(&self) -> bool {
        self.year == 0
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u16(self.year);
        buf.put_u8(self.month);
        buf.put_u8(self.day);
        buf.put_u8(self.hour);
        buf.put_u8(self.minute);
        buf.put_u8(self.second);
        buf.put_u8(0);
    }

    fn take(data: &mut Bytes) -> CodecResult<Self> {
        let value = Self {
            year: data.take_u16()?,
            month: data.take_u8()?,
            day: data.take_u8()?,
            hour: data.take_u8()?,
            minute: data.take_u8()?,
            second: data.take_u8()?,
        };
        data.skip(1)?;
        Ok(value)
    }
}

impl fmt::Display for DlpDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_never() {
            return f.write_str("never");
        }
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

impl DlpArg for DlpDateTime {
    fn encoded_len(&self) -> usize {
        DATE_TIME_SIZE
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.put(buf);
    }

    fn describe(&self) -> String {
        format!("DlpDateTime({self})")
    }
}

impl DecodeArg for DlpDateTime {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Self::take(data)
    }
}

/// Four-character code used for database types and creators.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(u32::from_be_bytes(*code))
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&latin1_decode(&self.0.to_be_bytes()))
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({:?})", self.to_string())
    }
}

/// Handle returned by OpenDB and passed to every per-database command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbHandle(pub u8);

impl DlpArg for DbHandle {
    fn encoded_len(&self) -> usize {
        1
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.0);
    }

    fn describe(&self) -> String {
        format!("DbHandle({})", self.0)
    }
}

impl DecodeArg for DbHandle {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self(data.take_u8()?))
    }
}

/// ReadUserInfo response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: u32,
    pub viewer_id: u32,
    pub last_sync_pc_id: u32,
    pub successful_sync_date: DlpDateTime,
    pub last_sync_date: DlpDateTime,
    pub user_name: String,
    pub password: Vec<u8>,
}

impl UserInfo {
    fn name_len(&self) -> usize {
        if self.user_name.is_empty() {
            0
        } else {
            cstring_len(&self.user_name)
        }
    }
}

impl DlpArg for UserInfo {
    fn encoded_len(&self) -> usize {
        12 + 2 * DATE_TIME_SIZE + 2 + self.name_len() + self.password.len()
    }

    fn check(&self) -> CodecResult<()> {
        check_len("user name", self.name_len(), u8::MAX as usize)?;
        check_len("password", self.password.len(), u8::MAX as usize)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.user_id);
        buf.put_u32(self.viewer_id);
        buf.put_u32(self.last_sync_pc_id);
        self.successful_sync_date.put(buf);
        self.last_sync_date.put(buf);
        buf.put_u8(self.name_len() as u8);
        buf.put_u8(self.password.len() as u8);
        if !self.user_name.is_empty() {
            put_cstring(buf, &self.user_name);
        }
        buf.put_slice(&self.password);
    }

    fn describe(&self) -> String {
        format!(
            "UserInfo {{ user_id: {}, name: {:?}, last_sync_pc_id: {:#010x}, last_sync: {} }}",
            self.user_id, self.user_name, self.last_sync_pc_id, self.last_sync_date
        )
    }
}

impl DecodeArg for UserInfo {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let user_id = data.take_u32()?;
        let viewer_id = data.take_u32()?;
        let last_sync_pc_id = data.take_u32()?;
        let successful_sync_date = DlpDateTime::take(data)?;
        let last_sync_date = DlpDateTime::take(data)?;
        let name_len = usize::from(data.take_u8()?);
        let password_len = usize::from(data.take_u8()?);
        let user_name = data.take_fixed_cstring(name_len)?;
        let password = data.take_bytes(password_len)?.to_vec();
        Ok(Self {
            user_id,
            viewer_id,
            last_sync_pc_id,
            successful_sync_date,
            last_sync_date,
            user_name,
            password,
        })
    }
}

bitflags! {
    /// Fields a WriteUserInfo request updates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct UserInfoModFlags: u8 {
        const USER_ID = 0x80;
        const SYNC_PC_ID = 0x40;
        const SYNC_DATE = 0x20;
        const USER_NAME = 0x10;
        const VIEWER_ID = 0x08;
    }
}

/// WriteUserInfo request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteUserInfoRequest {
    pub user_id: u32,
    pub viewer_id: u32,
    pub last_sync_pc_id: u32,
    pub last_sync_date: DlpDateTime,
    pub modify: UserInfoModFlags,
    pub user_name: String,
}

impl DlpArg for WriteUserInfoRequest {
    fn encoded_len(&self) -> usize {
        12 + DATE_TIME_SIZE + 2 + cstring_len(&self.user_name)
    }

    fn check(&self) -> CodecResult<()> {
        check_len("user name", cstring_len(&self.user_name), u8::MAX as usize)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.user_id);
        buf.put_u32(self.viewer_id);
        buf.put_u32(self.last_sync_pc_id);
        self.last_sync_date.put(buf);
        buf.put_u8(self.modify.bits());
        buf.put_u8(cstring_len(&self.user_name) as u8);
        put_cstring(buf, &self.user_name);
    }

    fn describe(&self) -> String {
        format!(
            "WriteUserInfoRequest {{ modify: {:?}, name: {:?}, last_sync: {} }}",
            self.modify, self.user_name, self.last_sync_date
        )
    }
}

impl DecodeArg for WriteUserInfoRequest {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let user_id = data.take_u32()?;
        let viewer_id = data.take_u32()?;
        let last_sync_pc_id = data.take_u32()?;
        let last_sync_date = DlpDateTime::take(data)?;
        let modify = UserInfoModFlags::from_bits_retain(data.take_u8()?);
        let name_len = usize::from(data.take_u8()?);
        let user_name = data.take_fixed_cstring(name_len)?;
        Ok(Self {
            user_id,
            viewer_id,
            last_sync_pc_id,
            last_sync_date,
            modify,
            user_name,
        })
    }
}

/// Desktop DLP version sent with ReadSysInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysInfoRequest {
    pub host_version_major: u16,
    pub host_version_minor: u16,
}

impl Default for SysInfoRequest {
    fn default() -> Self {
        Self {
            host_version_major: 1,
            host_version_minor: 4,
        }
    }
}

impl DlpArg for SysInfoRequest {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.host_version_major);
        buf.put_u16(self.host_version_minor);
    }

    fn describe(&self) -> String {
        format!(
            "SysInfoRequest(host {}.{})",
            self.host_version_major, self.host_version_minor
        )
    }
}

impl DecodeArg for SysInfoRequest {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            host_version_major: data.take_u16()?,
            host_version_minor: data.take_u16()?,
        })
    }
}

/// ReadSysInfo response, first argument.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SysInfo {
    pub rom_version: u32,
    pub locale: u32,
    pub product_id: Vec<u8>,
}

impl DlpArg for SysInfo {
    fn encoded_len(&self) -> usize {
        10 + self.product_id.len()
    }

    fn check(&self) -> CodecResult<()> {
        check_len("product id", self.product_id.len(), u8::MAX as usize)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.rom_version);
        buf.put_u32(self.locale);
        buf.put_u8(0);
        buf.put_u8(self.product_id.len() as u8);
        buf.put_slice(&self.product_id);
    }

    fn describe(&self) -> String {
        format!(
            "SysInfo {{ rom_version: {:#010x}, locale: {:#010x}, product_id: {} }}",
            self.rom_version,
            self.locale,
            hex::encode(&self.product_id)
        )
    }
}

impl DecodeArg for SysInfo {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let rom_version = data.take_u32()?;
        let locale = data.take_u32()?;
        data.skip(1)?;
        let len = usize::from(data.take_u8()?);
        let product_id = data.take_bytes(len)?.to_vec();
        Ok(Self {
            rom_version,
            locale,
            product_id,
        })
    }
}

/// ReadSysInfo response, second argument. Only sent by DLP 1.2+ devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DlpVersions {
    pub dlp_major: u16,
    pub dlp_minor: u16,
    pub compat_major: u16,
    pub compat_minor: u16,
    pub max_record_size: u32,
}

impl DlpArg for DlpVersions {
    fn encoded_len(&self) -> usize {
        12
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.dlp_major);
        buf.put_u16(self.dlp_minor);
        buf.put_u16(self.compat_major);
        buf.put_u16(self.compat_minor);
        buf.put_u32(self.max_record_size);
    }

    fn describe(&self) -> String {
        format!(
            "DlpVersions(dlp {}.{}, compat {}.{}, max record {})",
            self.dlp_major, self.dlp_minor, self.compat_major, self.compat_minor, self.max_record_size
        )
    }
}

impl DecodeArg for DlpVersions {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            dlp_major: data.take_u16()?,
            dlp_minor: data.take_u16()?,
            compat_major: data.take_u16()?,
            compat_minor: data.take_u16()?,
            max_record_size: data.take_u32()?,
        })
    }
}

bitflags! {
    /// Which databases ReadDBList enumerates.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct DbListFlags: u8 {
        const RAM = 0x80;
        const ROM = 0x40;
        const MULTIPLE = 0x20;
    }
}

/// ReadDBList request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadDbListRequest {
    pub flags: DbListFlags,
    pub card_no: u8,
    pub start_index: u16,
}

impl ReadDbListRequest {
    pub fn ram(start_index: u16) -> Self {
        Self {
            flags: DbListFlags::RAM | DbListFlags::MULTIPLE,
            card_no: 0,
            start_index,
        }
    }
}

impl DlpArg for ReadDbListRequest {
    fn encoded_len(&self) -> usize {
        4
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.flags.bits());
        buf.put_u8(self.card_no);
        buf.put_u16(self.start_index);
    }

    fn describe(&self) -> String {
        format!(
            "ReadDbListRequest {{ flags: {:?}, card: {}, start: {} }}",
            self.flags, self.card_no, self.start_index
        )
    }
}

impl DecodeArg for ReadDbListRequest {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            flags: DbListFlags::from_bits_retain(data.take_u8()?),
            card_no: data.take_u8()?,
            start_index: data.take_u16()?,
        })
    }
}

/// Database metadata as reported by ReadDBList.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbInfo {
    pub misc_flags: u8,
    pub db_flags: u16,
    pub db_type: FourCc,
    pub creator: FourCc,
    pub version: u16,
    pub modification_number: u32,
    pub creation_date: DlpDateTime,
    pub modification_date: DlpDateTime,
    pub backup_date: DlpDateTime,
    pub index: u16,
    pub name: String,
}

impl DbInfo {
    /// Entry size including the leading size byte, padded to even length.
    fn entry_len(&self) -> usize {
        let len = DB_INFO_FIXED_SIZE + cstring_len(&self.name);
        len + (len & 1)
    }

    fn check(&self) -> CodecResult<()> {
        check_len("database entry", self.entry_len(), u8::MAX as usize)
    }

    fn put(&self, buf: &mut BytesMut) {
        let len = self.entry_len();
        buf.put_u8(len as u8);
        buf.put_u8(self.misc_flags);
        buf.put_u16(self.db_flags);
        buf.put_u32(self.db_type.0);
        buf.put_u32(self.creator.0);
        buf.put_u16(self.version);
        buf.put_u32(self.modification_number);
        self.creation_date.put(buf);
        self.modification_date.put(buf);
        self.backup_date.put(buf);
        buf.put_u16(self.index);
        put_cstring(buf, &self.name);
        if len > DB_INFO_FIXED_SIZE + cstring_len(&self.name) {
            buf.put_u8(0);
        }
    }

    fn take(data: &mut Bytes) -> CodecResult<Self> {
        let total = usize::from(data.take_u8()?);
        if total < DB_INFO_FIXED_SIZE {
            return Err(CodecError::InvalidValue {
                field: "DbInfo size",
                value: total.to_string(),
            });
        }
        let mut entry = data.take_bytes(total - 1)?;
        let misc_flags = entry.take_u8()?;
        let db_flags = entry.take_u16()?;
        let db_type = FourCc(entry.take_u32()?);
        let creator = FourCc(entry.take_u32()?);
        let version = entry.take_u16()?;
        let modification_number = entry.take_u32()?;
        let creation_date = DlpDateTime::take(&mut entry)?;
        let modification_date = DlpDateTime::take(&mut entry)?;
        let backup_date = DlpDateTime::take(&mut entry)?;
        let index = entry.take_u16()?;
        let remaining = entry.len();
        let name = entry.take_fixed_cstring(remaining)?;
        Ok(Self {
            misc_flags,
            db_flags,
            db_type,
            creator,
            version,
            modification_number,
            creation_date,
            modification_date,
            backup_date,
            index,
            name,
        })
    }
}

/// ReadDBList response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbList {
    pub last_index: u16,
    pub more: bool,
    pub entries: Vec<DbInfo>,
}

impl DlpArg for DbList {
    fn encoded_len(&self) -> usize {
        4 + self.entries.iter().map(DbInfo::entry_len).sum::<usize>()
    }

    fn check(&self) -> CodecResult<()> {
        check_len("database list", self.entries.len(), u8::MAX as usize)?;
        self.entries.iter().try_for_each(DbInfo::check)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.last_index);
        buf.put_u8(if self.more { 0x80 } else { 0 });
        buf.put_u8(self.entries.len() as u8);
        for entry in &self.entries {
            entry.put(buf);
        }
    }

    fn describe(&self) -> String {
        let names: Vec<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        format!(
            "DbList {{ last_index: {}, more: {}, names: {:?} }}",
            self.last_index, self.more, names
        )
    }
}

impl DecodeArg for DbList {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let last_index = data.take_u16()?;
        let more = data.take_u8()? & 0x80 != 0;
        let count = data.take_u8()?;
        let entries = (0..count)
            .map(|_| DbInfo::take(data))
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self {
            last_index,
            more,
            entries,
        })
    }
}

bitflags! {
    /// Access mode for OpenDB.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct OpenDbMode: u8 {
        const READ = 0x80;
        const WRITE = 0x40;
        const EXCLUSIVE = 0x20;
        const SECRET = 0x10;
    }
}

/// OpenDB request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDbRequest {
    pub card_no: u8,
    pub mode: OpenDbMode,
    pub name: String,
}

impl DlpArg for OpenDbRequest {
    fn encoded_len(&self) -> usize {
        2 + cstring_len(&self.name)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.card_no);
        buf.put_u8(self.mode.bits());
        put_cstring(buf, &self.name);
    }

    fn describe(&self) -> String {
        format!("OpenDbRequest({:?}, {:?})", self.name, self.mode)
    }
}

impl DecodeArg for OpenDbRequest {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            card_no: data.take_u8()?,
            mode: OpenDbMode::from_bits_retain(data.take_u8()?),
            name: data.take_cstring()?,
        })
    }
}

/// ReadOpenDBInfo response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDbInfo {
    pub num_records: u16,
}

impl DlpArg for OpenDbInfo {
    fn encoded_len(&self) -> usize {
        2
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.num_records);
    }

    fn describe(&self) -> String {
        format!("OpenDbInfo {{ num_records: {} }}", self.num_records)
    }
}

impl DecodeArg for OpenDbInfo {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            num_records: data.take_u16()?,
        })
    }
}

/// ReadRecordIDList request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRecordIdListRequest {
    pub handle: DbHandle,
    pub sort: bool,
    pub start_index: u16,
    pub max_entries: u16,
}

impl DlpArg for ReadRecordIdListRequest {
    fn encoded_len(&self) -> usize {
        6
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.handle.0);
        buf.put_u8(if self.sort { 0x80 } else { 0 });
        buf.put_u16(self.start_index);
        buf.put_u16(self.max_entries);
    }

    fn describe(&self) -> String {
        format!(
            "ReadRecordIdListRequest {{ handle: {}, start: {}, max: {} }}",
            self.handle.0, self.start_index, self.max_entries
        )
    }
}

impl DecodeArg for ReadRecordIdListRequest {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            handle: DbHandle(data.take_u8()?),
            sort: data.take_u8()? & 0x80 != 0,
            start_index: data.take_u16()?,
            max_entries: data.take_u16()?,
        })
    }
}

/// ReadRecordIDList response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordIdList {
    pub ids: Vec<u32>,
}

impl DlpArg for RecordIdList {
    fn encoded_len(&self) -> usize {
        2 + 4 * self.ids.len()
    }

    fn check(&self) -> CodecResult<()> {
        check_len("record id list", self.ids.len(), u16::MAX as usize)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.ids.len() as u16);
        for id in &self.ids {
            buf.put_u32(*id);
        }
    }

    fn describe(&self) -> String {
        format!("RecordIdList({} ids)", self.ids.len())
    }
}

impl DecodeArg for RecordIdList {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let count = data.take_u16()?;
        let ids = (0..count)
            .map(|_| data.take_u32())
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(Self { ids })
    }
}

/// ReadRecord (by id) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRecordRequest {
    pub handle: DbHandle,
    pub record_id: u32,
    pub offset: u16,
    /// Maximum bytes to return; 0xFFFF reads the whole record.
    pub max_len: u16,
}

impl ReadRecordRequest {
    pub fn whole(handle: DbHandle, record_id: u32) -> Self {
        Self {
            handle,
            record_id,
            offset: 0,
            max_len: u16::MAX,
        }
    }
}

impl DlpArg for ReadRecordRequest {
    fn encoded_len(&self) -> usize {
        10
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.handle.0);
        buf.put_u8(0);
        buf.put_u32(self.record_id);
        buf.put_u16(self.offset);
        buf.put_u16(self.max_len);
    }

    fn describe(&self) -> String {
        format!(
            "ReadRecordRequest {{ handle: {}, id: {:#010x} }}",
            self.handle.0, self.record_id
        )
    }
}

impl DecodeArg for ReadRecordRequest {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let handle = DbHandle(data.take_u8()?);
        data.skip(1)?;
        Ok(Self {
            handle,
            record_id: data.take_u32()?,
            offset: data.take_u16()?,
            max_len: data.take_u16()?,
        })
    }
}

/// A record with its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: u32,
    pub index: u16,
    pub attributes: u8,
    pub category: u8,
    pub data: Bytes,
}

impl DlpArg for Record {
    fn encoded_len(&self) -> usize {
        10 + self.data.len()
    }

    fn check(&self) -> CodecResult<()> {
        check_len("record data", self.data.len(), u16::MAX as usize)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.id);
        buf.put_u16(self.index);
        buf.put_u16(self.data.len() as u16);
        buf.put_u8(self.attributes);
        buf.put_u8(self.category);
        buf.put_slice(&self.data);
    }

    fn describe(&self) -> String {
        format!(
            "Record {{ id: {:#010x}, index: {}, attrs: {:#04x}, category: {}, {} bytes }}",
            self.id,
            self.index,
            self.attributes,
            self.category,
            self.data.len()
        )
    }
}

impl DecodeArg for Record {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let id = data.take_u32()?;
        let index = data.take_u16()?;
        let size = usize::from(data.take_u16()?);
        let attributes = data.take_u8()?;
        let category = data.take_u8()?;
        let data = data.take_bytes(size)?;
        Ok(Self {
            id,
            index,
            attributes,
            category,
            data,
        })
    }
}

/// DeleteRecord request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRecordRequest {
    pub handle: DbHandle,
    pub delete_all: bool,
    pub record_id: u32,
}

impl DlpArg for DeleteRecordRequest {
    fn encoded_len(&self) -> usize {
        6
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.handle.0);
        buf.put_u8(if self.delete_all { 0x80 } else { 0 });
        buf.put_u32(self.record_id);
    }

    fn describe(&self) -> String {
        if self.delete_all {
            format!("DeleteRecordRequest(handle {}, all)", self.handle.0)
        } else {
            format!(
                "DeleteRecordRequest(handle {}, id {:#010x})",
                self.handle.0, self.record_id
            )
        }
    }
}

impl DecodeArg for DeleteRecordRequest {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self {
            handle: DbHandle(data.take_u8()?),
            delete_all: data.take_u8()? & 0x80 != 0,
            record_id: data.take_u32()?,
        })
    }
}

/// ReadAppBlock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadAppBlockRequest {
    pub handle: DbHandle,
    pub offset: u16,
    /// Maximum bytes to return; 0xFFFF reads the whole block.
    pub max_len: u16,
}

impl DlpArg for ReadAppBlockRequest {
    fn encoded_len(&self) -> usize {
        6
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.handle.0);
        buf.put_u8(0);
        buf.put_u16(self.offset);
        buf.put_u16(self.max_len);
    }

    fn describe(&self) -> String {
        format!(
            "ReadAppBlockRequest {{ handle: {}, offset: {}, max_len: {} }}",
            self.handle.0, self.offset, self.max_len
        )
    }
}

impl DecodeArg for ReadAppBlockRequest {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let handle = DbHandle(data.take_u8()?);
        data.skip(1)?;
        Ok(Self {
            handle,
            offset: data.take_u16()?,
            max_len: data.take_u16()?,
        })
    }
}

/// ReadAppBlock response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppBlock {
    pub data: Bytes,
}

impl DlpArg for AppBlock {
    fn encoded_len(&self) -> usize {
        2 + self.data.len()
    }

    fn check(&self) -> CodecResult<()> {
        check_len("app block", self.data.len(), u16::MAX as usize)
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.data.len() as u16);
        buf.put_slice(&self.data);
    }

    fn describe(&self) -> String {
        format!("AppBlock({} bytes)", self.data.len())
    }
}

impl DecodeArg for AppBlock {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let size = usize::from(data.take_u16()?);
        Ok(Self {
            data: data.take_bytes(size)?,
        })
    }
}

/// AddSyncLogEntry request: text shown in the handheld's HotSync log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncLogEntry(pub String);

impl DlpArg for SyncLogEntry {
    fn encoded_len(&self) -> usize {
        cstring_len(&self.0)
    }

    fn encode(&self, buf: &mut BytesMut) {
        put_cstring(buf, &self.0);
    }

    fn describe(&self) -> String {
        format!("SyncLogEntry({:?})", self.0)
    }
}

impl DecodeArg for SyncLogEntry {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        Ok(Self(data.take_cstring()?))
    }
}

impl DlpArg for SyncTermCode {
    fn encoded_len(&self) -> usize {
        2
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(*self as u16);
    }

    fn describe(&self) -> String {
        format!("SyncTermCode::{self:?}")
    }
}

impl DecodeArg for SyncTermCode {
    fn decode(data: &mut Bytes) -> CodecResult<Self> {
        let raw = data.take_u16()?;
        Self::from_u16(raw).ok_or_else(|| CodecError::InvalidValue {
            field: "sync termination code",
            value: format!("{raw:#06x}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: DecodeArg + PartialEq + fmt::Debug>(value: &T) -> T {
        let mut buf = BytesMut::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), value.encoded_len(), "encoded_len disagrees");
        let mut data = buf.freeze();
        let decoded = T::decode(&mut data).unwrap();
        assert!(data.is_empty());
        decoded
    }

    fn sample_date() -> DlpDateTime {
        DlpDateTime {
            year: 2004,
            month: 7,
            day: 14,
            hour: 9,
            minute: 30,
            second: 5,
        }
    }

    #[test]
    fn test_user_info_layout() {
        let info = UserInfo {
            user_id: 1,
            viewer_id: 0,
            last_sync_pc_id: 0xc0a8_0001,
            successful_sync_date: sample_date(),
            last_sync_date: sample_date(),
            user_name: "Test User".into(),
            password: vec![0xAA; 10],
        };
        assert_eq!(info.encoded_len(), 50);
        assert_eq!(roundtrip(&info), info);
    }

    #[test]
    fn test_user_info_without_name() {
        let info = UserInfo::default();
        assert_eq!(info.encoded_len(), 30);
        assert_eq!(roundtrip(&info), info);
    }

    #[test]
    fn test_date_layout() {
        let mut buf = BytesMut::new();
        sample_date().encode(&mut buf);
        assert_eq!(&buf[..], &[0x07, 0xd4, 7, 14, 9, 30, 5, 0]);
        assert_eq!(sample_date().to_string(), "2004-07-14 09:30:05");
        assert_eq!(DlpDateTime::NEVER.to_string(), "never");
    }

    #[test]
    fn test_db_list_roundtrip() {
        let list = DbList {
            last_index: 1,
            more: true,
            entries: vec![
                DbInfo {
                    db_type: FourCc::new(b"DATA"),
                    creator: FourCc::new(b"memo"),
                    name: "MemoDB".into(),
                    index: 0,
                    ..DbInfo::default()
                },
                DbInfo {
                    db_type: FourCc::new(b"appl"),
                    creator: FourCc::new(b"addr"),
                    name: "AddressDB1".into(),
                    index: 1,
                    modification_date: sample_date(),
                    ..DbInfo::default()
                },
            ],
        };
        let decoded = roundtrip(&list);
        assert_eq!(decoded, list);
        assert_eq!(decoded.entries[0].creator.to_string(), "memo");
    }

    #[test]
    fn test_db_info_size_too_small() {
        let mut data = Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x10]);
        assert!(DbList::decode(&mut data).is_err());
    }

    #[test]
    fn test_record_roundtrip() {
        let record = Record {
            id: 0x0042_0001,
            index: 3,
            attributes: 0x40,
            category: 1,
            data: Bytes::from_static(b"hello palm"),
        };
        assert_eq!(roundtrip(&record), record);
    }

    #[test]
    fn test_length_fields_are_checked() {
        let info = UserInfo {
            password: vec![0; 256],
            ..UserInfo::default()
        };
        assert!(matches!(
            info.check(),
            Err(CodecError::FieldTooLong { field: "password", len: 256, max: 255 })
        ));

        let record = Record {
            data: Bytes::from(vec![0; 70_000]),
            ..Record::default()
        };
        assert!(matches!(
            record.check(),
            Err(CodecError::FieldTooLong { field: "record data", .. })
        ));

        let list = DbList {
            last_index: 0,
            more: false,
            entries: vec![DbInfo {
                name: "n".repeat(250),
                ..DbInfo::default()
            }],
        };
        assert!(matches!(
            list.check(),
            Err(CodecError::FieldTooLong { field: "database entry", .. })
        ));

        let fits = UserInfo {
            user_name: "x".repeat(254),
            password: vec![0; 255],
            ..UserInfo::default()
        };
        fits.check().unwrap();
        assert_eq!(roundtrip(&fits), fits);
    }

    #[test]
    fn test_term_code_rejects_unknown() {
        let mut data = Bytes::from_static(&[0x00, 0x09]);
        assert!(SyncTermCode::decode(&mut data).is_err());
    }

    #[test]
    fn test_request_layouts() {
        let mut buf = BytesMut::new();
        ReadDbListRequest::ram(5).encode(&mut buf);
        assert_eq!(&buf[..], &[0xa0, 0x00, 0x00, 0x05]);

        let mut buf = BytesMut::new();
        OpenDbRequest {
            card_no: 0,
            mode: OpenDbMode::READ | OpenDbMode::SECRET,
            name: "MemoDB".into(),
        }
        .encode(&mut buf);
        assert_eq!(&buf[..], b"\x00\x90MemoDB\0");

        let mut buf = BytesMut::new();
        ReadRecordRequest::whole(DbHandle(2), 7).encode(&mut buf);
        assert_eq!(&buf[..], &[2, 0, 0, 0, 0, 7, 0, 0, 0xff, 0xff]);
    }

    #[test]
    fn test_serde_json_user_info() {
        let info = UserInfo {
            user_name: "Ann".into(),
            ..UserInfo::default()
        };
        let json = serde_json::to_string(&info).unwrap();
        let back: UserInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, info);
    }
}
