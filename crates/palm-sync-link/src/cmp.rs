//! CMP handshake over a PADP stream.
//!
//! ```text
//! handheld                         desktop
//!   |-- Wakeup (xid 0xFF) ------------>|
//!   |<-------------- Init (xid 0xFF) --|   or Abort on a version mismatch
//! ```
//!
//! No DLP traffic may be sent before this completes.

use palm_sync_core::cmp::{CmpKind, CmpPacket, CMP_PACKET_SIZE, CMP_VERSION_MAJOR};
use palm_sync_core::error::ProtocolError;
use palm_sync_core::TransactionId;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::padp::{PadpMessage, PadpStream};

/// Desktop-side CMP options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmpConfig {
    /// Baud rate to request in Init. `None` keeps the current rate.
    pub baud_rate: Option<u32>,
}

impl CmpConfig {
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }
}

fn expect_cmp(message: PadpMessage, what: &'static str) -> Result<CmpPacket> {
    if message.xid != TransactionId::WAKEUP {
        return Err(ProtocolError::TransactionId {
            expected: TransactionId::WAKEUP.as_u8(),
            actual: message.xid.as_u8(),
        }
        .into());
    }
    if message.payload.len() != CMP_PACKET_SIZE {
        return Err(ProtocolError::HandshakeLength {
            what,
            expected: CMP_PACKET_SIZE,
            actual: message.payload.len(),
        }
        .into());
    }
    Ok(CmpPacket::decode(message.payload)?)
}

/// Desktop side: wait for the handheld's Wakeup and answer it.
///
/// Returns the Wakeup packet.
pub async fn accept(stream: &PadpStream, config: &CmpConfig) -> Result<CmpPacket> {
    let message = stream.recv().await?;
    let xid = message.xid;
    let wakeup = expect_cmp(message, "CMP wakeup")?;
    if wakeup.kind != CmpKind::Wakeup {
        return Err(ProtocolError::Cmp(format!("expected Wakeup, got {:?}", wakeup.kind)).into());
    }

    if wakeup.version_major > CMP_VERSION_MAJOR {
        tracing::warn!(
            major = wakeup.version_major,
            minor = wakeup.version_minor,
            "handheld speaks an unsupported CMP version"
        );
        stream.send(xid, CmpPacket::abort().encode()).await?;
        return Err(ProtocolError::Cmp(format!(
            "unsupported CMP version {}.{}",
            wakeup.version_major, wakeup.version_minor
        ))
        .into());
    }

    let init = CmpPacket::init(config.baud_rate);
    stream.send(xid, init.encode()).await?;
    tracing::debug!(
        version = %format!("{}.{}", wakeup.version_major, wakeup.version_minor),
        baud = wakeup.baud_rate,
        "CMP handshake complete"
    );
    Ok(wakeup)
}

/// Handheld side: announce ourselves and wait for Init.
pub async fn wakeup(stream: &PadpStream, wakeup: CmpPacket) -> Result<CmpPacket> {
    stream.send(TransactionId::WAKEUP, wakeup.encode()).await?;
    let reply = expect_cmp(stream.recv().await?, "CMP init")?;
    match reply.kind {
        CmpKind::Init => Ok(reply),
        CmpKind::Abort => Err(ProtocolError::Cmp("desktop aborted the connection".into()).into()),
        other => Err(ProtocolError::Cmp(format!("expected Init, got {other:?}")).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::padp::PadpConfig;
    use palm_sync_core::cmp::CmpFlags;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_handshake() {
        let (a, b) = tokio::io::duplex(4096);
        let root = CancellationToken::new();
        let (desktop, desktop_link) = PadpStream::open(a, PadpConfig::default(), &root);
        let (device, device_link) = PadpStream::open(b, PadpConfig::default(), &root);

        let config = CmpConfig::default().with_baud_rate(57_600);
        let (accepted, init) = tokio::join!(
            accept(&desktop, &config),
            wakeup(&device, CmpPacket::wakeup(9600))
        );
        assert_eq!(accepted.unwrap().baud_rate, 9600);
        let init = init.unwrap();
        assert!(init.flags.contains(CmpFlags::CHANGE_BAUD_RATE));
        assert_eq!(init.baud_rate, 57_600);

        desktop_link.shutdown().await.unwrap();
        device_link.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_newer_major_version_is_aborted() {
        let (a, b) = tokio::io::duplex(4096);
        let root = CancellationToken::new();
        let (desktop, desktop_link) = PadpStream::open(a, PadpConfig::default(), &root);
        let (device, device_link) = PadpStream::open(b, PadpConfig::default(), &root);

        let config = CmpConfig::default();
        let mut future = CmpPacket::wakeup(9600);
        future.version_major = 2;
        let (accepted, reply) = tokio::join!(
            accept(&desktop, &config),
            wakeup(&device, future)
        );
        assert!(matches!(
            accepted,
            Err(LinkError::Protocol(ProtocolError::Cmp(_)))
        ));
        assert!(matches!(reply, Err(LinkError::Protocol(ProtocolError::Cmp(_)))));

        desktop_link.shutdown().await.unwrap();
        device_link.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wakeup_requires_reserved_xid() {
        let (a, b) = tokio::io::duplex(4096);
        let root = CancellationToken::new();
        let (desktop, desktop_link) = PadpStream::open(a, PadpConfig::default(), &root);
        let (device, device_link) = PadpStream::open(b, PadpConfig::default(), &root);

        let config = CmpConfig::default();
        let (accepted, sent) = tokio::join!(
            accept(&desktop, &config),
            device.send(TransactionId(0x02), CmpPacket::wakeup(9600).encode())
        );
        sent.unwrap();
        assert!(matches!(
            accepted,
            Err(LinkError::Protocol(ProtocolError::TransactionId {
                expected: 0xff,
                actual: 0x02
            }))
        ));

        desktop_link.shutdown().await.unwrap();
        device_link.shutdown().await.unwrap();
    }
}
