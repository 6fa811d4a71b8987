//! DLP connections: typed commands over any [`TransactionTransport`].

use std::sync::Arc;

use bytes::Bytes;
use palm_sync_core::dlp::records::{
    AppBlock, DbHandle, DbInfo, DbList, DbListFlags, DeleteRecordRequest, DlpDateTime,
    DlpVersions, OpenDbInfo, OpenDbMode, OpenDbRequest, ReadAppBlockRequest, ReadDbListRequest,
    ReadRecordIdListRequest, ReadRecordRequest, Record, RecordIdList, SyncLogEntry, SysInfo,
    SysInfoRequest, UserInfo, WriteUserInfoRequest,
};
use palm_sync_core::dlp::{
    decode_response, encode_request, ArgId, ArgMap, DecodeArg, DlpArg, DlpErrorCode, DlpOpcode,
    DlpRegistry, SyncTermCode,
};
use palm_sync_core::error::ProtocolError;

use crate::error::{LinkError, Result};
use crate::transport::TransactionTransport;

/// A DLP session with one handheld.
///
/// Calls are issued one at a time; the transport serializes concurrent
/// callers.
pub struct DlpConnection<T> {
    transport: T,
    registry: Arc<DlpRegistry>,
}

impl<T: TransactionTransport> DlpConnection<T> {
    /// Connection using the standard command set.
    pub fn new(transport: T) -> Self {
        Self::with_registry(transport, DlpRegistry::shared())
    }

    pub fn with_registry(transport: T, registry: Arc<DlpRegistry>) -> Self {
        Self {
            transport,
            registry,
        }
    }

    pub fn registry(&self) -> &DlpRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run one command and return its response arguments.
    ///
    /// A non-success device status becomes [`LinkError::Command`].
    pub async fn execute(&self, opcode: DlpOpcode, args: &ArgMap) -> Result<ArgMap> {
        let def = self.registry.lookup(opcode)?;
        let request = encode_request(def, args)?;
        tracing::debug!(command = def.name, args = ?args, "DLP request");

        let raw = self.transport.execute(request).await?;
        let response = decode_response(def, raw)?;
        if !response.error_code.is_success() {
            tracing::debug!(command = def.name, code = %response.error_code, "DLP command failed");
            return Err(LinkError::Command {
                command: def.name,
                code: response.error_code,
            });
        }

        tracing::debug!(command = def.name, args = ?response.args, "DLP response");
        Ok(response.args)
    }

    async fn call(&self, opcode: DlpOpcode, arg: Option<&dyn RequestArg>) -> Result<ArgMap> {
        let mut args = ArgMap::new();
        if let Some(arg) = arg {
            arg.insert_into(&mut args);
        }
        self.execute(opcode, &args).await
    }

    async fn call_for<R: DecodeArg + 'static>(
        &self,
        opcode: DlpOpcode,
        arg: Option<&dyn RequestArg>,
        name: &'static str,
    ) -> Result<R> {
        let mut response = self.call(opcode, arg).await?;
        response.take::<R>(ArgId::FIRST).ok_or_else(|| {
            LinkError::Protocol(ProtocolError::MissingArgument {
                command: name,
                name: "result",
            })
        })
    }

    pub async fn read_user_info(&self) -> Result<UserInfo> {
        self.call_for(DlpOpcode::READ_USER_INFO, None, "ReadUserInfo")
            .await
    }

    pub async fn write_user_info(&self, request: WriteUserInfoRequest) -> Result<()> {
        self.call(DlpOpcode::WRITE_USER_INFO, Some(&request)).await?;
        Ok(())
    }

    /// System info, plus DLP versions when the handheld reports them.
    pub async fn read_sys_info(&self) -> Result<(SysInfo, Option<DlpVersions>)> {
        let mut response = self
            .call(DlpOpcode::READ_SYS_INFO, Some(&SysInfoRequest::default()))
            .await?;
        let versions = response.take::<DlpVersions>(ArgId::SECOND);
        let info = response.take::<SysInfo>(ArgId::FIRST).ok_or(LinkError::Protocol(
            ProtocolError::MissingArgument {
                command: "ReadSysInfo",
                name: "sysInfo",
            },
        ))?;
        Ok((info, versions))
    }

    pub async fn get_sys_date_time(&self) -> Result<DlpDateTime> {
        self.call_for(DlpOpcode::GET_SYS_DATE_TIME, None, "GetSysDateTime")
            .await
    }

    pub async fn set_sys_date_time(&self, date_time: DlpDateTime) -> Result<()> {
        self.call(DlpOpcode::SET_SYS_DATE_TIME, Some(&date_time))
            .await?;
        Ok(())
    }

    pub async fn read_db_list(&self, request: ReadDbListRequest) -> Result<DbList> {
        self.call_for(DlpOpcode::READ_DB_LIST, Some(&request), "ReadDBList")
            .await
    }

    /// Every database matching `flags`, fetched page by page until the
    /// handheld reports NotFound.
    pub async fn read_db_list_all(&self, flags: DbListFlags) -> Result<Vec<DbInfo>> {
        let mut databases = Vec::new();
        let mut start_index = 0u16;
        loop {
            let request = ReadDbListRequest {
                flags: flags | DbListFlags::MULTIPLE,
                card_no: 0,
                start_index,
            };
            match self.read_db_list(request).await {
                Ok(page) => {
                    let Some(next) = page.last_index.checked_add(1) else {
                        databases.extend(page.entries);
                        break;
                    };
                    if page.entries.is_empty() {
                        break;
                    }
                    databases.extend(page.entries);
                    start_index = next;
                }
                Err(err) if err.command_code() == Some(DlpErrorCode::NOT_FOUND) => break,
                Err(err) => return Err(err),
            }
        }
        tracing::debug!(count = databases.len(), "database list read");
        Ok(databases)
    }

    pub async fn open_db(&self, name: &str, mode: OpenDbMode) -> Result<DbHandle> {
        let request = OpenDbRequest {
            card_no: 0,
            mode,
            name: name.to_string(),
        };
        self.call_for(DlpOpcode::OPEN_DB, Some(&request), "OpenDB")
            .await
    }

    pub async fn close_db(&self, handle: DbHandle) -> Result<()> {
        self.call(DlpOpcode::CLOSE_DB, Some(&handle)).await?;
        Ok(())
    }

    /// The whole application info block of an open database.
    pub async fn read_app_block(&self, handle: DbHandle) -> Result<Bytes> {
        let request = ReadAppBlockRequest {
            handle,
            offset: 0,
            max_len: u16::MAX,
        };
        let block: AppBlock = self
            .call_for(DlpOpcode::READ_APP_BLOCK, Some(&request), "ReadAppBlock")
            .await?;
        Ok(block.data)
    }

    pub async fn read_record(&self, handle: DbHandle, record_id: u32) -> Result<Record> {
        let request = ReadRecordRequest::whole(handle, record_id);
        self.call_for(DlpOpcode::READ_RECORD, Some(&request), "ReadRecord")
            .await
    }

    pub async fn delete_record(&self, handle: DbHandle, record_id: u32) -> Result<()> {
        let request = DeleteRecordRequest {
            handle,
            delete_all: false,
            record_id,
        };
        self.call(DlpOpcode::DELETE_RECORD, Some(&request)).await?;
        Ok(())
    }

    pub async fn clean_up_database(&self, handle: DbHandle) -> Result<()> {
        self.call(DlpOpcode::CLEAN_UP_DATABASE, Some(&handle))
            .await?;
        Ok(())
    }

    pub async fn reset_sync_flags(&self, handle: DbHandle) -> Result<()> {
        self.call(DlpOpcode::RESET_SYNC_FLAGS, Some(&handle))
            .await?;
        Ok(())
    }

    pub async fn add_sync_log_entry(&self, text: &str) -> Result<()> {
        let entry = SyncLogEntry(text.to_string());
        self.call(DlpOpcode::ADD_SYNC_LOG_ENTRY, Some(&entry))
            .await?;
        Ok(())
    }

    pub async fn read_open_db_info(&self, handle: DbHandle) -> Result<OpenDbInfo> {
        self.call_for(DlpOpcode::READ_OPEN_DB_INFO, Some(&handle), "ReadOpenDBInfo")
            .await
    }

    /// Tell the handheld a conduit is starting. Shows progress on its screen.
    pub async fn open_conduit(&self) -> Result<()> {
        self.call(DlpOpcode::OPEN_CONDUIT, None).await?;
        Ok(())
    }

    pub async fn read_record_id_list(
        &self,
        handle: DbHandle,
        start_index: u16,
        max_entries: u16,
    ) -> Result<Vec<u32>> {
        let request = ReadRecordIdListRequest {
            handle,
            sort: false,
            start_index,
            max_entries,
        };
        let list: RecordIdList = self
            .call_for(DlpOpcode::READ_RECORD_ID_LIST, Some(&request), "ReadRecordIDList")
            .await?;
        Ok(list.ids)
    }

    /// Finish the session. The handheld disconnects after answering.
    pub async fn end_of_sync(&self, code: SyncTermCode) -> Result<()> {
        self.call(DlpOpcode::END_OF_SYNC, Some(&code)).await?;
        Ok(())
    }
}

/// A request value stored as the first argument of a command.
trait RequestArg: Sync {
    fn insert_into(&self, args: &mut ArgMap);
}

impl<A: DlpArg + Clone + 'static> RequestArg for A {
    fn insert_into(&self, args: &mut ArgMap) {
        args.insert(ArgId::FIRST, self.clone());
    }
}

impl<T> std::fmt::Debug for DlpConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DlpConnection")
            .field("commands", &self.registry.len())
            .finish_non_exhaustive()
    }
}
