//! # The ecu-link Crate
//! Blocking communication stack for vehicle ECUs: UDS (ISO 14229) on top of ISO-TP (ISO 15765-2), carried over
//! SocketCAN, SAE J2534 pass-through devices or ELM327 serial adapters. The same UDS code runs unchanged on every transport.
//!
//! ## CAN Example
//!
//! Open a SocketCAN interface and print all frames received within one second of each other.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use ecu_link::can::CanAdapter;
//!
//! fn can_example() -> ecu_link::Result<()> {
//!     let mut adapter = ecu_link::socketcan::SocketCan::open("can0")?;
//!
//!     while let Some(frame) = adapter.recv(Duration::from_secs(1))? {
//!         let id: u32 = frame.id.into();
//!         println!("0x{:x}\t{}", id, hex::encode(frame.data));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## UDS Example
//!
//! A [`datalink::DataLink`] picks the transport, a [`datalink::PlatformLink`] adds the ECU addressing. Every call blocks
//! until the ECU answered or the configured timeout passed.
//!
//! ```rust,no_run
//! use ecu_link::datalink::{DataLink, DataLinkConfig, PlatformConfig, PlatformLink};
//! use ecu_link::uds::DataIdentifier;
//!
//! fn uds_example() -> ecu_link::Result<()> {
//!     let link = DataLink::new(DataLinkConfig::elm327("/dev/ttyUSB0", 38400));
//!     let platform = PlatformConfig::new("obd", 0x7e0.into(), 0x7e8.into());
//!     let mut uds = PlatformLink::new(link, platform).uds()?;
//!
//!     let response = uds.read_data_by_identifier(DataIdentifier::Vin as u16)?;
//!     println!("VIN: {}", hex::encode(response));
//!     Ok(())
//! }
//! ```
//!
//! ## Supported adapters
//!  - SocketCAN (Linux only, `socketcan` feature)
//!  - J2534 pass-through devices (`j2534` feature)
//!  - ELM327 and compatible serial adapters (`elm327` feature)
//!

pub mod can;
pub mod datalink;
mod error;
pub mod isotp;
pub mod uds;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

#[cfg(feature = "j2534")]
pub mod j2534;

#[cfg(feature = "elm327")]
pub mod elm327;
