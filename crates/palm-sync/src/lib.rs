//! # palm-sync
//!
//! HotSync server for Palm OS handhelds.
//!
//! ## Overview
//!
//! A [`SyncServer`] waits for a handheld on a [`DeviceConnector`], performs
//! the CMP or NetSync handshake, and hands a DLP [`Connection`] to your
//! [`SyncHandler`]. Whatever the handler does, the server then tells the
//! handheld the sync is over and tears the link down.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use palm_sync::{Connection, ServerConfig, SyncHandler, SyncServer, TcpConnector};
//!
//! struct PrintUser;
//!
//! #[async_trait]
//! impl SyncHandler for PrintUser {
//!     async fn sync(&self, dlp: &Connection) -> anyhow::Result<()> {
//!         let user = dlp.read_user_info().await?;
//!         dlp.add_sync_log_entry(&format!("Hello {}\n", user.user_name)).await?;
//!         Ok(())
//!     }
//! }
//!
//! async fn example() -> palm_sync::Result<()> {
//!     let mut connector = TcpConnector::bind_default().await?;
//!     let server = SyncServer::new(ServerConfig::default().with_continuous(true), PrintUser);
//!     server.serve(&mut connector).await
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `palm_sync::core` - wire formats and the DLP command set
//! - `palm_sync::link` - links, handshakes and DLP connections

pub mod config;
pub mod devices;
pub mod error;
pub mod server;

pub use palm_sync_core as core;
pub use palm_sync_link as link;

pub use config::{ServerConfig, DEFAULT_END_OF_SYNC_DELAY};
pub use devices::{find_usb_device, UsbDeviceInfo, UsbInitMode, USB_DEVICES};
pub use error::{Result, SessionError};
pub use server::{
    BoxedIo, Connection, DeviceConnector, DeviceIo, Protocol, ServerEvent, SessionState,
    StreamConnector, StreamSender, SyncHandler, SyncServer, TcpConnector, DEFAULT_NETSYNC_PORT,
};

pub use palm_sync_core::{DlpErrorCode, SyncTermCode};
pub use palm_sync_link::{DlpConnection, LinkError};
