//! Test fixtures: in-memory link pairs and a scripted handheld.

use std::collections::HashMap;

use bytes::Bytes;
use palm_sync_core::cmp::CmpPacket;
use palm_sync_core::dlp::records::UserInfo;
use palm_sync_core::dlp::{
    decode_request, encode_response, ArgId, ArgMap, DlpErrorCode, DlpOpcode, DlpRegistry,
    SyncTermCode,
};
use palm_sync_link::{
    cmp, connect_handshake, DeviceHandshake, LinkError, LinkHandle, NetSyncConfig,
    NetSyncStream, PadpConfig, PadpStream,
};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_util::sync::CancellationToken;

/// Buffer size of in-memory duplex pipes.
pub const PIPE_CAPACITY: usize = 64 * 1024;

/// Both ends of an in-memory link.
pub struct LinkPair<S> {
    pub desktop: S,
    pub desktop_link: LinkHandle,
    pub device: S,
    pub device_link: LinkHandle,
    pub root: CancellationToken,
}

impl<S> LinkPair<S> {
    /// Shut both links down and return their results.
    pub async fn shutdown(self) -> (palm_sync_link::Result<()>, palm_sync_link::Result<()>) {
        let desktop = self.desktop_link.shutdown().await;
        let device = self.device_link.shutdown().await;
        (desktop, device)
    }
}

/// Two connected in-memory byte streams.
pub fn pipe() -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(PIPE_CAPACITY)
}

pub fn padp_pair(config: PadpConfig) -> LinkPair<PadpStream> {
    let (a, b) = pipe();
    let root = CancellationToken::new();
    let (desktop, desktop_link) = PadpStream::open(a, config.clone(), &root);
    let (device, device_link) = PadpStream::open(b, config, &root);
    LinkPair {
        desktop,
        desktop_link,
        device,
        device_link,
        root,
    }
}

pub fn netsync_pair(config: NetSyncConfig) -> LinkPair<NetSyncStream> {
    let (a, b) = pipe();
    let root = CancellationToken::new();
    let (desktop, desktop_link) = NetSyncStream::open(a, config.clone(), &root);
    let (device, device_link) = NetSyncStream::open(b, config, &root);
    LinkPair {
        desktop,
        desktop_link,
        device,
        device_link,
        root,
    }
}

/// A device answer: status code and response arguments.
pub type Reply = (DlpErrorCode, ArgMap);

type Responder = Box<dyn Fn(&ArgMap) -> Reply + Send + Sync>;

/// What a [`FakeDevice`] saw during a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceReport {
    /// Every command received, in order.
    pub commands: Vec<DlpOpcode>,
    /// Term code of the EndOfSync that ended the session, if one arrived.
    pub end_of_sync: Option<SyncTermCode>,
}

/// A handheld that answers DLP commands from a script.
///
/// Commands without a script entry are answered with `IllegalRequest`.
/// EndOfSync is always accepted and ends the session.
pub struct FakeDevice {
    registry: DlpRegistry,
    responders: HashMap<DlpOpcode, Responder>,
    padp: PadpConfig,
    netsync: NetSyncConfig,
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            registry: DlpRegistry::standard(),
            responders: HashMap::new(),
            padp: PadpConfig::default(),
            netsync: NetSyncConfig::default(),
        }
    }

    /// Answer `opcode` with `respond`.
    pub fn on(
        mut self,
        opcode: DlpOpcode,
        respond: impl Fn(&ArgMap) -> Reply + Send + Sync + 'static,
    ) -> Self {
        self.responders.insert(opcode, Box::new(respond));
        self
    }

    /// Answer `opcode` with a status code and no arguments.
    pub fn fail(self, opcode: DlpOpcode, code: DlpErrorCode) -> Self {
        self.on(opcode, move |_| (code, ArgMap::new()))
    }

    /// Answer ReadUserInfo with `user`.
    pub fn with_user(self, user: UserInfo) -> Self {
        self.on(DlpOpcode::READ_USER_INFO, move |_| {
            (DlpErrorCode::NONE, ArgMap::new().with(ArgId::FIRST, user.clone()))
        })
    }

    pub fn with_padp_config(mut self, config: PadpConfig) -> Self {
        self.padp = config;
        self
    }

    pub fn with_netsync_config(mut self, config: NetSyncConfig) -> Self {
        self.netsync = config;
        self
    }

    /// Encode the answer to one request. The flag is set when the session
    /// is over.
    fn answer(&self, request: Bytes, report: &mut DeviceReport) -> palm_sync_link::Result<(Bytes, bool)> {
        let request = decode_request(&self.registry, request)?;
        tracing::debug!(opcode = %request.opcode, "fake device received command");
        report.commands.push(request.opcode);

        let def = self.registry.lookup(request.opcode)?;
        let (code, args) = if request.opcode == DlpOpcode::END_OF_SYNC {
            report.end_of_sync = request.args.get::<SyncTermCode>(ArgId::FIRST).copied();
            (DlpErrorCode::NONE, ArgMap::new())
        } else {
            match self.responders.get(&request.opcode) {
                Some(respond) => respond(&request.args),
                None => (DlpErrorCode::ILLEGAL_REQUEST, ArgMap::new()),
            }
        };
        let response = encode_response(def, code, &args)?;
        Ok((response, request.opcode == DlpOpcode::END_OF_SYNC))
    }

    /// Run a serial-style session: CMP wakeup, then DLP over PADP.
    ///
    /// Returns once EndOfSync is answered or the desktop goes away.
    pub async fn run_padp<IO>(self, io: IO, wakeup: CmpPacket) -> palm_sync_link::Result<DeviceReport>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let root = CancellationToken::new();
        let (stream, link) = PadpStream::open(io, self.padp.clone(), &root);
        let result = async {
            cmp::wakeup(&stream, wakeup).await?;
            let mut report = DeviceReport::default();
            loop {
                let request = match stream.recv().await {
                    Ok(request) => request,
                    Err(err) if err.is_closure() => return Ok(report),
                    Err(err) => return Err(err),
                };
                let (response, done) = self.answer(request.payload, &mut report)?;
                stream.send(request.xid, response).await?;
                if done {
                    return Ok(report);
                }
            }
        }
        .await;
        finish(link, result).await
    }

    /// Run a network-style session: NetSync handshake, then DLP.
    pub async fn run_netsync<IO>(
        self,
        io: IO,
        handshake: DeviceHandshake,
    ) -> palm_sync_link::Result<DeviceReport>
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let root = CancellationToken::new();
        let (stream, link) = NetSyncStream::open(io, self.netsync.clone(), &root);
        let result = async {
            connect_handshake(&stream, &handshake).await?;
            let mut report = DeviceReport::default();
            loop {
                let request = match stream.recv().await {
                    Ok(request) => request,
                    Err(err) if err.is_closure() => return Ok(report),
                    Err(err) => return Err(err),
                };
                let (response, done) = self.answer(request.payload, &mut report)?;
                stream.send(request.xid, response).await?;
                if done {
                    return Ok(report);
                }
            }
        }
        .await;
        finish(link, result).await
    }
}

async fn finish(
    link: LinkHandle,
    result: palm_sync_link::Result<DeviceReport>,
) -> palm_sync_link::Result<DeviceReport> {
    let link_result = link.shutdown().await;
    match (result, link_result) {
        (Ok(report), _) => Ok(report),
        (Err(err), Err(fatal)) if err.is_closure() => Err(fatal),
        (Err(err), _) => Err(err),
    }
}

impl std::fmt::Debug for FakeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut scripted: Vec<_> = self.responders.keys().copied().collect();
        scripted.sort_by_key(|opcode| opcode.0);
        f.debug_struct("FakeDevice")
            .field("scripted", &scripted)
            .finish_non_exhaustive()
    }
}

/// A failed command, for matching in tests.
pub fn is_command_error(err: &LinkError, code: DlpErrorCode) -> bool {
    err.command_code() == Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use palm_sync_link::{accept_handshake, CmpConfig, DlpConnection, NetSyncTransport, PadpTransport};

    fn sample_user() -> UserInfo {
        UserInfo {
            user_id: 42,
            user_name: "Test User".into(),
            ..UserInfo::default()
        }
    }

    #[tokio::test]
    async fn test_padp_pair_exchanges_messages() {
        let pair = padp_pair(PadpConfig::default());
        let xid = palm_sync_core::TransactionId(0x02);
        let (sent, received) = tokio::join!(
            pair.desktop.send(xid, Bytes::from_static(b"hello")),
            pair.device.recv()
        );
        sent.unwrap();
        assert_eq!(&received.unwrap().payload[..], b"hello");

        let (desktop, device) = pair.shutdown().await;
        desktop.unwrap();
        device.unwrap();
    }

    #[tokio::test]
    async fn test_fake_device_over_padp() {
        let (desktop_io, device_io) = pipe();
        let device = FakeDevice::new().with_user(sample_user());
        let device_task = tokio::spawn(device.run_padp(device_io, CmpPacket::wakeup(9600)));

        let root = CancellationToken::new();
        let (stream, link) = PadpStream::open(desktop_io, PadpConfig::default(), &root);
        cmp::accept(&stream, &CmpConfig::default()).await.unwrap();
        let dlp = DlpConnection::new(PadpTransport::new(stream));

        assert_eq!(dlp.read_user_info().await.unwrap().user_name, "Test User");
        let err = dlp.get_sys_date_time().await.unwrap_err();
        assert!(is_command_error(&err, DlpErrorCode::ILLEGAL_REQUEST));
        dlp.end_of_sync(SyncTermCode::Okay).await.unwrap();

        let report = device_task.await.unwrap().unwrap();
        assert_eq!(
            report.commands,
            [
                DlpOpcode::READ_USER_INFO,
                DlpOpcode::GET_SYS_DATE_TIME,
                DlpOpcode::END_OF_SYNC
            ]
        );
        assert_eq!(report.end_of_sync, Some(SyncTermCode::Okay));
        link.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fake_device_over_netsync() {
        let (desktop_io, device_io) = pipe();
        let device = FakeDevice::new().fail(DlpOpcode::OPEN_CONDUIT, DlpErrorCode::CANCEL_SYNC);
        let device_task = tokio::spawn(device.run_netsync(device_io, DeviceHandshake::default()));

        let root = CancellationToken::new();
        let (stream, link) = NetSyncStream::open(desktop_io, NetSyncConfig::default(), &root);
        accept_handshake(&stream).await.unwrap();
        let dlp = DlpConnection::new(NetSyncTransport::new(stream));

        let err = dlp.open_conduit().await.unwrap_err();
        assert!(is_command_error(&err, DlpErrorCode::CANCEL_SYNC));
        dlp.end_of_sync(SyncTermCode::UserCancelled).await.unwrap();

        let report = device_task.await.unwrap().unwrap();
        assert_eq!(report.end_of_sync, Some(SyncTermCode::UserCancelled));
        link.shutdown().await.unwrap();
    }
}
