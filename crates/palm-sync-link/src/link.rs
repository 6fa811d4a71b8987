//! Reader and writer tasks sharing one duplex byte stream.
//!
//! The reader pulls bytes, runs a frame decoder and hands each frame to a
//! [`FrameHandler`]. The writer drains a FIFO of fully built frames, so
//! frames from different layers never interleave on the wire.
//!
//! ```text
//!            +-------------+   frames   +--------------+
//!  bytes --> | reader task | ---------> | FrameHandler | --> inbox / ack waiters
//!            +-------------+            +--------------+
//!                                              |
//!  bytes <-- | writer task | <-- SendQueue <---+--- streams, handshakes
//! ```

use std::io::ErrorKind;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use palm_sync_core::error::FramingError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;

use crate::error::{LinkError, Result};

const READ_BUFFER_SIZE: usize = 4096;

/// Time a cancelled writer gets to flush frames queued before the cancel.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest prefix of a frame included in trace dumps.
const TRACE_DUMP_LIMIT: usize = 64;

/// Consumer of decoded frames, driven by the reader task.
///
/// `handle` runs inline in the read loop and must not block. An error
/// ends the link.
pub trait FrameHandler: Send + 'static {
    type Frame;

    fn handle(&mut self, frame: Self::Frame) -> Result<()>;

    /// Called once when the reader stops, for any reason.
    fn on_close(&mut self) {}
}

/// Non-blocking handle for submitting frames to the writer task.
#[derive(Debug, Clone)]
pub struct SendQueue {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl SendQueue {
    /// Enqueue a fully encoded frame.
    pub fn post(&self, frame: Bytes) -> Result<()> {
        self.tx.send(frame).map_err(|_| LinkError::Closed)
    }
}

/// Writer side of a [`SendQueue`], consumed by [`spawn_link`].
#[derive(Debug)]
pub struct QueueReceiver(mpsc::UnboundedReceiver<Bytes>);

/// Create a send queue. Frame handlers that answer inline (acks) hold a
/// clone of the queue before the link is spawned.
pub fn send_queue() -> (SendQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SendQueue { tx }, QueueReceiver(rx))
}

/// Owner of a link's background tasks.
#[derive(Debug)]
pub struct LinkHandle {
    cancel: CancellationToken,
    reader: JoinHandle<Result<()>>,
    writer: JoinHandle<Result<()>>,
}

impl LinkHandle {
    /// Token cancelled when the link shuts down or the reader stops.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancel both tasks and wait for them to finish.
    ///
    /// Returns the reader's error if it stopped on a fatal one, else the
    /// writer's.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        let read = self.reader.await;
        let write = self.writer.await;
        let read = read.map_err(LinkError::from).and_then(|result| result);
        let write = write.map_err(LinkError::from).and_then(|result| result);
        read.and(write)
    }
}

/// Split `io` and start the reader and writer tasks.
///
/// `cancel` belongs to this link: it is cancelled by [`LinkHandle::shutdown`]
/// and whenever the reader stops.
pub fn spawn_link<IO, D, H>(
    io: IO,
    decoder: D,
    handler: H,
    queue: QueueReceiver,
    cancel: CancellationToken,
) -> LinkHandle
where
    IO: AsyncRead + AsyncWrite + Send + 'static,
    D: Decoder<Error = FramingError> + Send + 'static,
    D::Item: Send,
    H: FrameHandler<Frame = D::Item>,
{
    let (read_half, write_half) = tokio::io::split(io);

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        let mut handler = handler;
        let result = read_loop(read_half, decoder, &mut handler, &reader_cancel).await;
        handler.on_close();
        match &result {
            Ok(()) => tracing::debug!("link reader stopped"),
            Err(err) => tracing::warn!(error = %err, "link reader failed"),
        }
        reader_cancel.cancel();
        result
    });

    let writer = tokio::spawn(write_loop(write_half, queue.0, cancel.clone()));

    LinkHandle {
        cancel,
        reader,
        writer,
    }
}

async fn read_loop<R, D, H>(
    mut reader: R,
    mut decoder: D,
    handler: &mut H,
    cancel: &CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    D: Decoder<Error = FramingError>,
    H: FrameHandler<Frame = D::Item>,
{
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        while let Some(frame) = decoder.decode(&mut buf)? {
            handler.handle(frame)?;
        }

        let read = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = reader.read_buf(&mut buf) => match read {
                Err(err) if is_disconnect(&err) => 0,
                read => read?,
            },
        };

        if read == 0 {
            while let Some(frame) = decoder.decode_eof(&mut buf)? {
                handler.handle(frame)?;
            }
            tracing::debug!(buffered = buf.len(), "peer closed the stream");
            return Ok(());
        }

        let start = buf.len() - read;
        tracing::trace!(
            len = read,
            bytes = %hex::encode(&buf[start..buf.len().min(start + TRACE_DUMP_LIMIT)]),
            "read"
        );
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            _ = cancel.cancelled() => break,
        };

        match write_bounded(&mut writer, &frame, &cancel).await {
            Some(Ok(())) => {}
            Some(Err(LinkError::Io(err))) if is_disconnect(&err) => {
                tracing::debug!(error = %err, "peer closed the stream");
                cancel.cancel();
                return Ok(());
            }
            Some(Err(err)) => return Err(err),
            None => {
                tracing::warn!(len = frame.len(), "frame write abandoned at shutdown");
                return Ok(());
            }
        }
    }

    // Frames posted before the cancel still go out.
    let drained = tokio::time::timeout(FLUSH_TIMEOUT, async {
        let mut count = 0usize;
        while let Ok(frame) = queue.try_recv() {
            trace_frame(&frame);
            write_frame(&mut writer, &frame).await?;
            count += 1;
        }
        Ok::<_, LinkError>(count)
    })
    .await;
    match drained {
        Ok(Ok(0)) => {}
        Ok(Ok(count)) => tracing::debug!(count, "flushed queued frames at shutdown"),
        Ok(Err(LinkError::Io(err))) if is_disconnect(&err) => {
            tracing::debug!(error = %err, "peer closed the stream during flush");
        }
        Ok(Err(err)) => return Err(err),
        Err(_) => tracing::warn!("flush of queued frames timed out"),
    }
    tracing::debug!("link writer stopped");
    Ok(())
}

/// Write one frame. A write in progress when the link is cancelled gets
/// [`FLUSH_TIMEOUT`] to finish; `None` means it was abandoned.
async fn write_bounded<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
    cancel: &CancellationToken,
) -> Option<Result<()>> {
    trace_frame(frame);
    let write = write_frame(writer, frame);
    tokio::pin!(write);
    tokio::select! {
        biased;
        written = &mut write => Some(written),
        _ = cancel.cancelled() => tokio::time::timeout(FLUSH_TIMEOUT, write).await.ok(),
    }
}

fn trace_frame(frame: &[u8]) {
    tracing::trace!(
        len = frame.len(),
        bytes = %hex::encode(&frame[..frame.len().min(TRACE_DUMP_LIMIT)]),
        "write"
    );
}

fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}
