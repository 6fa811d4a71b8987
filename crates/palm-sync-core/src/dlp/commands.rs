//! DLP command definitions and the registry that holds them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::dlp::args::{ArgId, ArgSlot, RawArg};
use crate::dlp::records::{
    AppBlock, DbHandle, DbList, DeleteRecordRequest, DlpDateTime, DlpVersions, OpenDbInfo,
    OpenDbRequest, ReadAppBlockRequest, ReadDbListRequest, ReadRecordIdListRequest,
    ReadRecordRequest, Record, RecordIdList, SyncLogEntry, SysInfo, SysInfoRequest, UserInfo,
    WriteUserInfoRequest,
};
use crate::dlp::status::SyncTermCode;
use crate::error::ProtocolError;

/// DLP command opcode. Responses carry the opcode with the high bit set.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DlpOpcode(pub u8);

impl DlpOpcode {
    pub const READ_USER_INFO: Self = Self(0x10);
    pub const WRITE_USER_INFO: Self = Self(0x11);
    pub const READ_SYS_INFO: Self = Self(0x12);
    pub const GET_SYS_DATE_TIME: Self = Self(0x13);
    pub const SET_SYS_DATE_TIME: Self = Self(0x14);
    pub const READ_DB_LIST: Self = Self(0x16);
    pub const OPEN_DB: Self = Self(0x17);
    pub const CLOSE_DB: Self = Self(0x19);
    pub const READ_APP_BLOCK: Self = Self(0x1B);
    pub const READ_RECORD: Self = Self(0x20);
    pub const DELETE_RECORD: Self = Self(0x22);
    pub const CLEAN_UP_DATABASE: Self = Self(0x26);
    pub const RESET_SYNC_FLAGS: Self = Self(0x27);
    pub const ADD_SYNC_LOG_ENTRY: Self = Self(0x2A);
    pub const READ_OPEN_DB_INFO: Self = Self(0x2B);
    pub const OPEN_CONDUIT: Self = Self(0x2E);
    pub const END_OF_SYNC: Self = Self(0x2F);
    pub const READ_RECORD_ID_LIST: Self = Self(0x31);
}

impl fmt::Debug for DlpOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DlpOpcode({:#04x})", self.0)
    }
}

impl fmt::Display for DlpOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Shape of one command: its opcode and the slots of its request and
/// response.
#[derive(Debug, Clone)]
pub struct CommandDef {
    pub opcode: DlpOpcode,
    pub name: &'static str,
    pub request: Vec<ArgSlot>,
    pub response: Vec<ArgSlot>,
}

impl CommandDef {
    pub fn new(opcode: DlpOpcode, name: &'static str) -> Self {
        Self {
            opcode,
            name,
            request: Vec::new(),
            response: Vec::new(),
        }
    }

    /// Append a request slot.
    pub fn request(mut self, slot: ArgSlot) -> Self {
        self.request.push(slot);
        self
    }

    /// Append a response slot.
    pub fn response(mut self, slot: ArgSlot) -> Self {
        self.response.push(slot);
        self
    }

    pub fn request_slot(&self, id: ArgId) -> Option<&ArgSlot> {
        self.request.iter().find(|slot| slot.id == id)
    }

    pub fn response_slot(&self, id: ArgId) -> Option<&ArgSlot> {
        self.response.iter().find(|slot| slot.id == id)
    }
}

/// All command definitions known to a connection.
///
/// Built once and shared behind an `Arc`; tests can construct registries
/// with alternate command sets.
#[derive(Debug, Clone, Default)]
pub struct DlpRegistry {
    commands: HashMap<DlpOpcode, CommandDef>,
}

impl DlpRegistry {
    /// A registry with no commands.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard HotSync command set.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for def in standard_commands() {
            registry.register(def);
        }
        registry
    }

    /// Shared handle to the standard set.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::standard())
    }

    /// Add or replace a definition.
    pub fn register(&mut self, def: CommandDef) {
        self.commands.insert(def.opcode, def);
    }

    pub fn get(&self, opcode: DlpOpcode) -> Option<&CommandDef> {
        self.commands.get(&opcode)
    }

    /// Like [`get`](Self::get) but reports an unknown opcode as an error.
    pub fn lookup(&self, opcode: DlpOpcode) -> Result<&CommandDef, ProtocolError> {
        self.get(opcode)
            .ok_or(ProtocolError::UnknownOpcode(opcode.0))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn standard_commands() -> Vec<CommandDef> {
    use DlpOpcode as Op;

    vec![
        CommandDef::new(Op::READ_USER_INFO, "ReadUserInfo")
            .response(ArgSlot::required::<UserInfo>(0, "userInfo")),
        CommandDef::new(Op::WRITE_USER_INFO, "WriteUserInfo")
            .request(ArgSlot::required::<WriteUserInfoRequest>(0, "userInfo")),
        CommandDef::new(Op::READ_SYS_INFO, "ReadSysInfo")
            .request(ArgSlot::optional::<SysInfoRequest>(0, "hostVersion"))
            .response(ArgSlot::required::<SysInfo>(0, "sysInfo"))
            .response(ArgSlot::optional::<DlpVersions>(1, "dlpVersions")),
        CommandDef::new(Op::GET_SYS_DATE_TIME, "GetSysDateTime")
            .response(ArgSlot::required::<DlpDateTime>(0, "dateTime")),
        CommandDef::new(Op::SET_SYS_DATE_TIME, "SetSysDateTime")
            .request(ArgSlot::required::<DlpDateTime>(0, "dateTime")),
        CommandDef::new(Op::READ_DB_LIST, "ReadDBList")
            .request(ArgSlot::required::<ReadDbListRequest>(0, "query"))
            .response(ArgSlot::required::<DbList>(0, "dbList")),
        CommandDef::new(Op::OPEN_DB, "OpenDB")
            .request(ArgSlot::required::<OpenDbRequest>(0, "db"))
            .response(ArgSlot::required::<DbHandle>(0, "handle")),
        CommandDef::new(Op::CLOSE_DB, "CloseDB")
            .request(ArgSlot::required::<DbHandle>(0, "handle")),
        CommandDef::new(Op::READ_APP_BLOCK, "ReadAppBlock")
            .request(ArgSlot::required::<ReadAppBlockRequest>(0, "query"))
            .response(ArgSlot::required::<AppBlock>(0, "appBlock")),
        CommandDef::new(Op::READ_RECORD, "ReadRecord")
            .request(ArgSlot::required::<ReadRecordRequest>(0, "query"))
            .response(ArgSlot::required::<Record>(0, "record")),
        CommandDef::new(Op::DELETE_RECORD, "DeleteRecord")
            .request(ArgSlot::required::<DeleteRecordRequest>(0, "target")),
        CommandDef::new(Op::CLEAN_UP_DATABASE, "CleanUpDatabase")
            .request(ArgSlot::required::<DbHandle>(0, "handle")),
        CommandDef::new(Op::RESET_SYNC_FLAGS, "ResetSyncFlags")
            .request(ArgSlot::required::<DbHandle>(0, "handle")),
        CommandDef::new(Op::ADD_SYNC_LOG_ENTRY, "AddSyncLogEntry")
            .request(ArgSlot::required::<SyncLogEntry>(0, "text")),
        CommandDef::new(Op::READ_OPEN_DB_INFO, "ReadOpenDBInfo")
            .request(ArgSlot::required::<DbHandle>(0, "handle"))
            .response(ArgSlot::required::<OpenDbInfo>(0, "info")),
        CommandDef::new(Op::OPEN_CONDUIT, "OpenConduit"),
        CommandDef::new(Op::END_OF_SYNC, "EndOfSync")
            .request(ArgSlot::required::<SyncTermCode>(0, "termCode")),
        CommandDef::new(Op::READ_RECORD_ID_LIST, "ReadRecordIDList")
            .request(ArgSlot::required::<ReadRecordIdListRequest>(0, "query"))
            .response(ArgSlot::required::<RecordIdList>(0, "ids")),
    ]
}

/// A command whose arguments are carried as raw bytes. Handy for vendor
/// extensions and tests.
pub fn raw_command(opcode: DlpOpcode, name: &'static str, request: u8, response: u8) -> CommandDef {
    let mut def = CommandDef::new(opcode, name);
    for index in 0..request {
        def = def.request(ArgSlot::optional::<RawArg>(index, "raw"));
    }
    for index in 0..response {
        def = def.response(ArgSlot::optional::<RawArg>(index, "raw"));
    }
    def
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry() {
        let registry = DlpRegistry::standard();
        assert_eq!(registry.len(), 18);

        let def = registry.lookup(DlpOpcode::READ_SYS_INFO).unwrap();
        assert_eq!(def.name, "ReadSysInfo");
        assert_eq!(def.response.len(), 2);
        assert!(def.response_slot(ArgId::SECOND).unwrap().optional);
    }

    #[test]
    fn test_unknown_opcode() {
        let registry = DlpRegistry::standard();
        assert!(matches!(
            registry.lookup(DlpOpcode(0x7f)),
            Err(ProtocolError::UnknownOpcode(0x7f))
        ));
    }

    #[test]
    fn test_alternate_command_set() {
        let mut registry = DlpRegistry::empty();
        assert!(registry.is_empty());
        registry.register(raw_command(DlpOpcode(0x50), "VendorPing", 1, 1));
        let def = registry.lookup(DlpOpcode(0x50)).unwrap();
        assert_eq!(def.request_slot(ArgId::FIRST).unwrap().name, "raw");
        assert!(registry.get(DlpOpcode::READ_USER_INFO).is_none());
    }
}
