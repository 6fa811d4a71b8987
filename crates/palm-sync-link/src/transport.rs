//! Transaction transports: one request payload in, one correlated
//! response payload out.
//!
//! Both PADP and NetSync implement [`TransactionTransport`], so the DLP
//! layer never needs to know which framing family it runs over.

use async_trait::async_trait;
use bytes::Bytes;
use palm_sync_core::error::ProtocolError;
use palm_sync_core::{TransactionCounter, TransactionId};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::netsync::NetSyncStream;
use crate::padp::PadpStream;

/// Request/response exchange keyed by transaction id.
///
/// Implementations serialize concurrent calls: at most one exchange is in
/// flight per transport.
#[async_trait]
pub trait TransactionTransport: Send + Sync {
    /// Send `request` under a fresh transaction id and return the response
    /// carrying the same id.
    async fn execute(&self, request: Bytes) -> Result<Bytes>;
}

fn check_xid(expected: TransactionId, actual: TransactionId) -> Result<()> {
    if expected != actual {
        return Err(ProtocolError::TransactionId {
            expected: expected.as_u8(),
            actual: actual.as_u8(),
        }
        .into());
    }
    Ok(())
}

/// DLP transport over PADP.
#[derive(Debug)]
pub struct PadpTransport {
    stream: PadpStream,
    xids: Mutex<TransactionCounter>,
}

impl PadpTransport {
    pub fn new(stream: PadpStream) -> Self {
        Self {
            stream,
            xids: Mutex::new(TransactionCounter::new()),
        }
    }

    pub fn stream(&self) -> &PadpStream {
        &self.stream
    }
}

#[async_trait]
impl TransactionTransport for PadpTransport {
    async fn execute(&self, request: Bytes) -> Result<Bytes> {
        let mut xids = self.xids.lock().await;
        let xid = xids.bump();
        self.stream.send(xid, request).await?;
        let response = self.stream.recv().await?;
        check_xid(xid, response.xid)?;
        Ok(response.payload)
    }
}

/// DLP transport over NetSync.
#[derive(Debug)]
pub struct NetSyncTransport {
    stream: NetSyncStream,
    xids: Mutex<TransactionCounter>,
}

impl NetSyncTransport {
    pub fn new(stream: NetSyncStream) -> Self {
        Self {
            stream,
            xids: Mutex::new(TransactionCounter::new()),
        }
    }

    pub fn stream(&self) -> &NetSyncStream {
        &self.stream
    }
}

#[async_trait]
impl TransactionTransport for NetSyncTransport {
    async fn execute(&self, request: Bytes) -> Result<Bytes> {
        let mut xids = self.xids.lock().await;
        let xid = xids.bump();
        self.stream.send(xid, request).await?;
        let response = self.stream.recv().await?;
        check_xid(xid, response.xid)?;
        Ok(response.payload)
    }
}

#[async_trait]
impl<T: TransactionTransport + ?Sized> TransactionTransport for std::sync::Arc<T> {
    async fn execute(&self, request: Bytes) -> Result<Bytes> {
        (**self).execute(request).await
    }
}

#[async_trait]
impl<T: TransactionTransport + ?Sized> TransactionTransport for Box<T> {
    async fn execute(&self, request: Bytes) -> Result<Bytes> {
        (**self).execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::netsync::NetSyncConfig;
    use crate::padp::PadpConfig;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_padp_exchange_bumps_xid() {
        let (a, b) = tokio::io::duplex(8192);
        let root = CancellationToken::new();
        let (desktop, desktop_link) = PadpStream::open(a, PadpConfig::default(), &root);
        let (device, device_link) = PadpStream::open(b, PadpConfig::default(), &root);
        let transport = PadpTransport::new(desktop);

        let echo = async {
            for _ in 0..2 {
                let request = device.recv().await.unwrap();
                let mut reply = request.payload.to_vec();
                reply.reverse();
                device.send(request.xid, Bytes::from(reply)).await.unwrap();
            }
        };
        let exchanges = async {
            let first = transport.execute(Bytes::from_static(b"abc")).await.unwrap();
            let second = transport.execute(Bytes::from_static(b"xyz")).await.unwrap();
            (first, second)
        };
        let ((first, second), ()) = tokio::join!(exchanges, echo);
        assert_eq!(&first[..], b"cba");
        assert_eq!(&second[..], b"zyx");

        desktop_link.shutdown().await.unwrap();
        device_link.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_netsync_wrong_xid_is_protocol_error() {
        let (a, b) = tokio::io::duplex(8192);
        let root = CancellationToken::new();
        let (desktop, desktop_link) = NetSyncStream::open(a, NetSyncConfig::default(), &root);
        let (device, device_link) = NetSyncStream::open(b, NetSyncConfig::default(), &root);
        let transport = NetSyncTransport::new(desktop);

        let reply = async {
            let request = device.recv().await.unwrap();
            assert_eq!(request.xid, TransactionId(0x02));
            device
                .send(TransactionId(0x09), Bytes::from_static(b"late"))
                .await
                .unwrap();
        };
        let (result, ()) = tokio::join!(transport.execute(Bytes::from_static(b"q")), reply);
        assert!(matches!(
            result,
            Err(LinkError::Protocol(ProtocolError::TransactionId {
                expected: 0x02,
                actual: 0x09
            }))
        ));

        desktop_link.shutdown().await.unwrap();
        device_link.shutdown().await.unwrap();
    }
}
