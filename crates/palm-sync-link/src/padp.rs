//! PADP over SLP: reliable delivery of payloads larger than one fragment.
//!
//! Sending splits a payload into fragments and waits for each fragment's
//! Ack before the next goes out. Receiving happens in the reader task:
//! data fragments are reassembled and acknowledged inline, completed
//! payloads land in an inbox, and Acks resolve the matching waiter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use palm_sync_core::error::ProtocolError;
use palm_sync_core::padp::{split_payload, FragmentFlags, FragmentKind, PadpFragment, Reassembler};
use palm_sync_core::slp::{socket, SlpCodec, SlpPacket, SlpPacketType};
use palm_sync_core::TransactionId;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{LinkError, Result};
use crate::link::{send_queue, spawn_link, FrameHandler, LinkHandle, SendQueue};

/// PADP timing and retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadpConfig {
    /// How long to wait for each fragment's Ack.
    pub ack_timeout: Duration,
    /// Resends of a fragment after its Ack wait expires.
    pub ack_retries: u32,
}

impl Default for PadpConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(2),
            ack_retries: 0,
        }
    }
}

impl PadpConfig {
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_ack_retries(mut self, retries: u32) -> Self {
        self.ack_retries = retries;
        self
    }
}

/// A fully reassembled PADP payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PadpMessage {
    pub xid: TransactionId,
    pub payload: Bytes,
}

type AckKey = (TransactionId, u32);

#[derive(Debug, Default)]
struct AckWaiters {
    pending: Mutex<HashMap<AckKey, oneshot::Sender<FragmentFlags>>>,
    tickles: AtomicU64,
}

impl AckWaiters {
    fn register(&self, key: AckKey) -> oneshot::Receiver<FragmentFlags> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(key, tx);
        rx
    }

    fn forget(&self, key: &AckKey) {
        self.lock().remove(key);
    }

    fn resolve(&self, key: &AckKey, flags: FragmentFlags) -> bool {
        match self.lock().remove(key) {
            Some(tx) => tx.send(flags).is_ok(),
            None => false,
        }
    }

    fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<AckKey, oneshot::Sender<FragmentFlags>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reader-side PADP state: reassembly, inline acks and ack dispatch.
struct PadpReceiver {
    queue: SendQueue,
    waiters: Arc<AckWaiters>,
    reassembler: Reassembler,
    inbox: mpsc::UnboundedSender<PadpMessage>,
}

impl PadpReceiver {
    fn acknowledge(&self, packet: &SlpPacket, fragment: &PadpFragment) -> Result<()> {
        let ack = SlpPacket {
            dest: packet.src,
            src: packet.dest,
            packet_type: SlpPacketType::Padp as u8,
            xid: packet.xid,
            payload: PadpFragment::ack_for(fragment).encode(),
        };
        self.queue.post(ack.encode()?)
    }
}

impl FrameHandler for PadpReceiver {
    type Frame = SlpPacket;

    fn handle(&mut self, packet: SlpPacket) -> Result<()> {
        if packet.packet_type != SlpPacketType::Padp as u8 || packet.dest != socket::DLP {
            tracing::trace!(
                dest = packet.dest,
                packet_type = packet.packet_type,
                "ignoring non-PADP packet"
            );
            return Ok(());
        }

        let fragment = PadpFragment::decode(packet.payload.clone())?;
        match fragment.kind {
            FragmentKind::Data => {
                let complete = self.reassembler.push(&fragment)?;
                self.acknowledge(&packet, &fragment)?;
                if let Some(payload) = complete {
                    tracing::debug!(xid = %packet.xid, len = payload.len(), "PADP message received");
                    // A dropped stream just means nobody is listening any more.
                    let _ = self.inbox.send(PadpMessage {
                        xid: packet.xid,
                        payload,
                    });
                }
            }
            FragmentKind::Ack => {
                let key = (packet.xid, fragment.size_or_offset);
                if !self.waiters.resolve(&key, fragment.flags) {
                    tracing::debug!(
                        xid = %packet.xid,
                        offset = fragment.size_or_offset,
                        "unexpected PADP ack"
                    );
                }
            }
            FragmentKind::Tickle => {
                self.waiters.tickles.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(xid = %packet.xid, "PADP tickle");
            }
            FragmentKind::Abort => return Err(ProtocolError::Aborted.into()),
        }
        Ok(())
    }

    fn on_close(&mut self) {
        self.reassembler.reset();
        self.waiters.clear();
    }
}

/// PADP endpoint over an SLP link. The same type serves both the desktop
/// and the handheld side.
pub struct PadpStream {
    queue: SendQueue,
    waiters: Arc<AckWaiters>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<PadpMessage>>,
    config: PadpConfig,
    cancel: CancellationToken,
}

impl PadpStream {
    /// Start an SLP link over `io`. The link's token is a child of `parent`.
    pub fn open<IO>(io: IO, config: PadpConfig, parent: &CancellationToken) -> (Self, LinkHandle)
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let cancel = parent.child_token();
        let (queue, queue_rx) = send_queue();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let waiters = Arc::new(AckWaiters::default());

        let receiver = PadpReceiver {
            queue: queue.clone(),
            waiters: Arc::clone(&waiters),
            reassembler: Reassembler::new(),
            inbox: inbox_tx,
        };
        let link = spawn_link(io, SlpCodec::new(), receiver, queue_rx, cancel.clone());

        let stream = Self {
            queue,
            waiters,
            inbox: tokio::sync::Mutex::new(inbox_rx),
            config,
            cancel,
        };
        (stream, link)
    }

    pub fn config(&self) -> &PadpConfig {
        &self.config
    }

    /// Tickle fragments seen so far.
    pub fn tickles_received(&self) -> u64 {
        self.waiters.tickles.load(Ordering::Relaxed)
    }

    /// Send `payload` under `xid`, one acknowledged fragment at a time.
    pub async fn send(&self, xid: TransactionId, payload: Bytes) -> Result<()> {
        let fragments = split_payload(&payload);
        tracing::debug!(
            xid = %xid,
            len = payload.len(),
            fragments = fragments.len(),
            "sending PADP message"
        );
        for fragment in fragments {
            self.send_fragment(xid, fragment).await?;
        }
        Ok(())
    }

    async fn send_fragment(&self, xid: TransactionId, fragment: PadpFragment) -> Result<()> {
        let frame = SlpPacket::padp(xid, fragment.encode()).encode()?;
        let key = (xid, fragment.size_or_offset);
        let attempts = self.config.ack_retries + 1;

        for attempt in 1..=attempts {
            let ack = self.waiters.register(key);
            self.queue.post(frame.clone())?;

            let Some(flags) = self.wait_for_ack(ack).await? else {
                self.waiters.forget(&key);
                tracing::warn!(
                    xid = %xid,
                    offset = fragment.size_or_offset,
                    attempt,
                    attempts,
                    "PADP ack timed out"
                );
                continue;
            };
            if flags.contains(FragmentFlags::MEMORY_ERROR) {
                return Err(LinkError::DeviceMemoryError);
            }
            return Ok(());
        }

        Err(LinkError::AckTimeout {
            xid,
            offset: fragment.size_or_offset,
            attempts,
        })
    }

    /// `None` on timeout.
    async fn wait_for_ack(
        &self,
        ack: oneshot::Receiver<FragmentFlags>,
    ) -> Result<Option<FragmentFlags>> {
        tokio::select! {
            biased;
            waited = tokio::time::timeout(self.config.ack_timeout, ack) => match waited {
                Ok(Ok(flags)) => Ok(Some(flags)),
                Ok(Err(_)) => Err(LinkError::Closed),
                Err(_) => Ok(None),
            },
            _ = self.cancel.cancelled() => Err(LinkError::Cancelled),
        }
    }

    /// Wait for the next reassembled payload.
    pub async fn recv(&self) -> Result<PadpMessage> {
        let mut inbox = self.inbox.lock().await;
        // Payloads delivered before the link closed are still returned.
        tokio::select! {
            biased;
            message = inbox.recv() => message.ok_or(LinkError::Closed),
            _ = self.cancel.cancelled() => Err(LinkError::Cancelled),
        }
    }
}

impl std::fmt::Debug for PadpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PadpStream")
            .field("config", &self.config)
            .field("closed", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
