//! # palm-sync testkit
//!
//! Testing utilities for the palm-sync workspace.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: hand-checked SLP, NetSync and DLP bytes
//! - **Generators**: proptest strategies for frames and device records
//! - **Fixtures**: in-memory link pairs and a scripted fake handheld
//!
//! ## Golden Vectors
//!
//! ```rust
//! use palm_sync_testkit::vectors::{slp_vectors, verify_all_vectors};
//!
//! verify_all_vectors().unwrap();
//! for vector in slp_vectors() {
//!     assert_eq!(vector.packet().encode().unwrap(), vector.frame());
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use palm_sync_testkit::generators::netsync_packet;
//!
//! proptest! {
//!     #[test]
//!     fn frames_decode(packet in netsync_packet(512)) {
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Fake Handheld
//!
//! ```rust,no_run
//! use palm_sync_core::cmp::CmpPacket;
//! use palm_sync_core::dlp::records::UserInfo;
//! use palm_sync_testkit::fixtures::{pipe, FakeDevice};
//!
//! # async fn example() {
//! let (desktop_io, device_io) = pipe();
//! let device = FakeDevice::new().with_user(UserInfo::default());
//! let handheld = tokio::spawn(device.run_padp(device_io, CmpPacket::wakeup(9600)));
//! // ... run the desktop side over `desktop_io` ...
//! let report = handheld.await.unwrap().unwrap();
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{netsync_pair, padp_pair, pipe, DeviceReport, FakeDevice, LinkPair, Reply};
pub use vectors::{crc_vectors, netsync_vectors, slp_vectors, verify_all_vectors};
