//! NetSync links and the NetSync handshake.
//!
//! NetSync has no acknowledgments: a payload is one packet, and the link
//! underneath (USB bulk or TCP) is assumed reliable.

use bytes::{Bytes, BytesMut};
use palm_sync_core::error::ProtocolError;
use palm_sync_core::netsync::{handshake, NetSyncCodec, NetSyncPacket, DEFAULT_MAX_PAYLOAD};
use palm_sync_core::TransactionId;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;

use crate::error::{LinkError, Result};
use crate::link::{send_queue, spawn_link, FrameHandler, LinkHandle, SendQueue};

/// NetSync link options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetSyncConfig {
    /// Largest payload accepted in either direction.
    pub max_payload: usize,
}

impl Default for NetSyncConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl NetSyncConfig {
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }
}

struct Forward(mpsc::UnboundedSender<NetSyncPacket>);

impl FrameHandler for Forward {
    type Frame = NetSyncPacket;

    fn handle(&mut self, packet: NetSyncPacket) -> Result<()> {
        tracing::debug!(xid = %packet.xid, len = packet.payload.len(), "NetSync message received");
        let _ = self.0.send(packet);
        Ok(())
    }
}

/// NetSync endpoint. Serves both the desktop and the handheld side.
pub struct NetSyncStream {
    queue: SendQueue,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<NetSyncPacket>>,
    config: NetSyncConfig,
    cancel: CancellationToken,
}

impl NetSyncStream {
    /// Start a NetSync link over `io`. The link's token is a child of `parent`.
    pub fn open<IO>(io: IO, config: NetSyncConfig, parent: &CancellationToken) -> (Self, LinkHandle)
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let cancel = parent.child_token();
        let (queue, queue_rx) = send_queue();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let codec = NetSyncCodec::with_max_payload(config.max_payload);
        let link = spawn_link(io, codec, Forward(inbox_tx), queue_rx, cancel.clone());

        let stream = Self {
            queue,
            inbox: tokio::sync::Mutex::new(inbox_rx),
            config,
            cancel,
        };
        (stream, link)
    }

    pub fn config(&self) -> &NetSyncConfig {
        &self.config
    }

    pub async fn send(&self, xid: TransactionId, payload: Bytes) -> Result<()> {
        let mut frame = BytesMut::new();
        NetSyncCodec::with_max_payload(self.config.max_payload)
            .encode(NetSyncPacket::new(xid, payload), &mut frame)?;
        tracing::debug!(xid = %xid, len = frame.len(), "sending NetSync message");
        self.queue.post(frame.freeze())
    }

    pub async fn recv(&self) -> Result<NetSyncPacket> {
        let mut inbox = self.inbox.lock().await;
        // Payloads delivered before the link closed are still returned.
        tokio::select! {
            biased;
            packet = inbox.recv() => packet.ok_or(LinkError::Closed),
            _ = self.cancel.cancelled() => Err(LinkError::Cancelled),
        }
    }
}

impl std::fmt::Debug for NetSyncStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetSyncStream")
            .field("config", &self.config)
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

async fn recv_exact(stream: &NetSyncStream, what: &'static str, len: usize) -> Result<NetSyncPacket> {
    let packet = stream.recv().await?;
    if packet.payload.len() != len {
        return Err(ProtocolError::HandshakeLength {
            what,
            expected: len,
            actual: packet.payload.len(),
        }
        .into());
    }
    Ok(packet)
}

/// Desktop side of the NetSync handshake.
pub async fn accept_handshake(stream: &NetSyncStream) -> Result<()> {
    let wakeup = recv_exact(stream, "NetSync wakeup", handshake::WAKEUP_LEN).await?;
    if wakeup.xid != TransactionId::WAKEUP {
        tracing::debug!(xid = %wakeup.xid, "NetSync wakeup with unusual xid");
    }

    stream
        .send(wakeup.xid, Bytes::from_static(&handshake::REQUEST_1))
        .await?;
    let response = recv_exact(
        stream,
        "NetSync handshake response 1",
        handshake::RESPONSE_1_LEN,
    )
    .await?;

    stream
        .send(response.xid, Bytes::from_static(&handshake::REQUEST_2))
        .await?;
    recv_exact(
        stream,
        "NetSync handshake response 2",
        handshake::RESPONSE_2_LEN,
    )
    .await?;

    tracing::debug!("NetSync handshake complete");
    Ok(())
}

/// Packets a handheld sends during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandshake {
    pub wakeup: Bytes,
    pub response_1: Bytes,
    pub response_2: Bytes,
}

impl Default for DeviceHandshake {
    fn default() -> Self {
        Self {
            wakeup: Bytes::from(vec![0; handshake::WAKEUP_LEN]),
            response_1: Bytes::from(vec![0; handshake::RESPONSE_1_LEN]),
            response_2: Bytes::from(vec![0; handshake::RESPONSE_2_LEN]),
        }
    }
}

/// Handheld side of the NetSync handshake.
pub async fn connect_handshake(stream: &NetSyncStream, script: &DeviceHandshake) -> Result<()> {
    stream
        .send(TransactionId::WAKEUP, script.wakeup.clone())
        .await?;
    let request = recv_exact(
        stream,
        "NetSync handshake request 1",
        handshake::REQUEST_1.len(),
    )
    .await?;
    stream.send(request.xid, script.response_1.clone()).await?;
    let request = recv_exact(
        stream,
        "NetSync handshake request 2",
        handshake::REQUEST_2.len(),
    )
    .await?;
    stream.send(request.xid, script.response_2.clone()).await?;
    Ok(())
}
