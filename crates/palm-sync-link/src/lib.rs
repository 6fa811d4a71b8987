//! # palm-sync link
//!
//! Async links to a Palm handheld: framed byte streams, the PADP and
//! NetSync message layers, their handshakes, and DLP connections on top.
//!
//! ## Stacks
//!
//! ```text
//!   serial / IrDA / USB (older)        USB (newer) / TCP
//!   ---------------------------        -----------------
//!   SLP frames                         NetSync frames
//!   PADP fragments + acks              NetSync handshake
//!   CMP handshake
//!             \                        /
//!              TransactionTransport (xid-correlated exchange)
//!                          |
//!                    DlpConnection
//! ```
//!
//! Every link runs a reader task and a writer task over the split I/O
//! handle. Cancelling the link's token stops both; [`LinkHandle::shutdown`]
//! waits for them and returns the first fatal error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use palm_sync_link::{cmp, CmpConfig, DlpConnection, PadpConfig, PadpStream, PadpTransport};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example(io: tokio::net::TcpStream) -> palm_sync_link::Result<()> {
//!     let root = CancellationToken::new();
//!     let (stream, link) = PadpStream::open(io, PadpConfig::default(), &root);
//!     cmp::accept(&stream, &CmpConfig::default()).await?;
//!
//!     let dlp = DlpConnection::new(PadpTransport::new(stream));
//!     let user = dlp.read_user_info().await?;
//!     println!("syncing {}", user.user_name);
//!
//!     link.shutdown().await
//! }
//! ```

pub mod cmp;
pub mod dlp;
pub mod error;
pub mod link;
pub mod netsync;
pub mod padp;
pub mod transport;

pub use cmp::CmpConfig;
pub use dlp::DlpConnection;
pub use error::{LinkError, Result};
pub use link::{send_queue, spawn_link, FrameHandler, LinkHandle, SendQueue};
pub use netsync::{accept_handshake, connect_handshake, DeviceHandshake, NetSyncConfig, NetSyncStream};
pub use padp::{PadpConfig, PadpMessage, PadpStream};
pub use transport::{NetSyncTransport, PadpTransport, TransactionTransport};
