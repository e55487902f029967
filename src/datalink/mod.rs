//! Selects a transport for a configured interface and builds CAN, ISO-TP and UDS objects on top of it.
//! ## Example
//! ```rust,no_run
//! use ecu_link::datalink::{DataLink, DataLinkConfig, PlatformConfig, PlatformLink};
//!
//! fn datalink_example() -> ecu_link::Result<()> {
//!     let link = DataLink::new(DataLinkConfig::socketcan("can0"));
//!     let platform = PlatformConfig::new("obd", 0x7e0.into(), 0x7e8.into());
//!     let mut uds = PlatformLink::new(link, platform).uds()?;
//!
//!     uds.tester_present()?;
//!     Ok(())
//! }
//! ```

mod config;
mod handle;
mod platform;

use tracing::info;

use crate::can::CanAdapter;
use crate::error::Error;
use crate::isotp::{IsoTPOptions, IsoTpChannel};
use crate::Result;

pub use config::{DataLinkConfig, DataLinkKind, PlatformConfig, DEFAULT_ELM327_BAUDRATE};
pub use handle::SharedHandle;
pub use platform::PlatformLink;

#[cfg(feature = "elm327")]
type ElmSession = parking_lot::Mutex<crate::elm327::Elm327<Box<dyn serialport::SerialPort>>>;

#[cfg(any(
    not(feature = "j2534"),
    not(feature = "elm327"),
    all(target_os = "linux", not(feature = "socketcan"))
))]
fn feature_disabled(transport: &str, feature: &str) -> Error {
    Error::Unsupported(format!("{} support requires the `{}` feature", transport, feature))
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
fn socketcan_unavailable() -> Error {
    if cfg!(target_os = "linux") {
        feature_disabled("SocketCAN", "socketcan")
    } else {
        Error::Unsupported("SocketCAN is only available on Linux".into())
    }
}

/// A configured interface. Device handles are opened on first use and shared by all channels created from it.
pub struct DataLink {
    config: DataLinkConfig,
    #[cfg(feature = "j2534")]
    j2534: SharedHandle<crate::j2534::Device>,
    #[cfg(feature = "elm327")]
    elm327: SharedHandle<ElmSession>,
}

impl DataLink {
    pub fn new(config: DataLinkConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "j2534")]
            j2534: SharedHandle::new(),
            #[cfg(feature = "elm327")]
            elm327: SharedHandle::new(),
        }
    }

    pub fn config(&self) -> &DataLinkConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[cfg(feature = "j2534")]
    fn j2534_device(&self, library: &str) -> Result<std::sync::Arc<crate::j2534::Device>> {
        self.j2534
            .get_or_open(|| Ok(crate::j2534::Device::open(library)?))
    }

    #[cfg(feature = "elm327")]
    fn elm327_session(&self, port: &str, baudrate: u32) -> Result<std::sync::Arc<ElmSession>> {
        self.elm327.get_or_open(|| {
            let elm = crate::elm327::Elm327::open(port, baudrate)?;
            Ok(parking_lot::Mutex::new(elm))
        })
    }

    /// Raw CAN access at `bitrate`. SocketCAN interfaces keep the bitrate configured in the OS.
    pub fn can(&self, bitrate: u32) -> Result<Box<dyn CanAdapter + Send>> {
        info!("Opening CAN on {} at {} bit/s", self.config.kind, bitrate);

        match &self.config.kind {
            #[cfg(all(target_os = "linux", feature = "socketcan"))]
            DataLinkKind::SocketCan { interface } => Ok(Box::new(crate::socketcan::SocketCan::open(interface)?)),
            #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
            DataLinkKind::SocketCan { .. } => Err(socketcan_unavailable()),
            #[cfg(feature = "j2534")]
            DataLinkKind::PassThru { library } => {
                let device = self.j2534_device(library)?;
                Ok(Box::new(crate::j2534::J2534Can::connect(device, bitrate)?))
            }
            #[cfg(not(feature = "j2534"))]
            DataLinkKind::PassThru { .. } => Err(feature_disabled("J2534", "j2534")),
            DataLinkKind::Elm327 { .. } => Err(Error::Unsupported(
                "ELM327 adapters do not provide raw CAN access".into(),
            )),
        }
    }

    /// ISO-TP channel at `bitrate`: segmented on the host for SocketCAN, native for J2534 and ELM327.
    pub fn isotp(&self, options: IsoTPOptions, bitrate: u32) -> Result<Box<dyn IsoTpChannel + Send>> {
        info!(
            "Opening ISO-TP on {}, {:?} -> {:?}",
            self.config.kind, options.source_id, options.dest_id
        );

        match &self.config.kind {
            #[cfg(all(target_os = "linux", feature = "socketcan"))]
            DataLinkKind::SocketCan { interface } => {
                let mut adapter = crate::socketcan::SocketCan::open(interface)?;
                adapter.set_filter(options.dest_id)?;
                Ok(Box::new(crate::isotp::IsoTPAdapter::new(adapter, options)))
            }
            #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
            DataLinkKind::SocketCan { .. } => Err(socketcan_unavailable()),
            #[cfg(feature = "j2534")]
            DataLinkKind::PassThru { library } => {
                let device = self.j2534_device(library)?;
                Ok(Box::new(crate::j2534::J2534IsoTp::connect(device, bitrate, options)?))
            }
            #[cfg(not(feature = "j2534"))]
            DataLinkKind::PassThru { .. } => Err(feature_disabled("J2534", "j2534")),
            #[cfg(feature = "elm327")]
            DataLinkKind::Elm327 { port, baudrate } => {
                let session = self.elm327_session(port, *baudrate)?;
                Ok(Box::new(crate::elm327::Elm327IsoTp::new(session, bitrate, options)?))
            }
            #[cfg(not(feature = "elm327"))]
            DataLinkKind::Elm327 { .. } => Err(feature_disabled("ELM327", "elm327")),
        }
    }
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
fn detect_socketcan() -> Vec<DataLinkConfig> {
    // ARPHRD_CAN
    const CAN_LINK_TYPE: &str = "280";

    let Ok(entries) = std::fs::read_dir("/sys/class/net") else {
        return vec![];
    };

    let mut links: Vec<DataLinkConfig> = entries
        .flatten()
        .filter(|entry| {
            std::fs::read_to_string(entry.path().join("type"))
                .map(|t| t.trim() == CAN_LINK_TYPE)
                .unwrap_or(false)
        })
        .filter_map(|entry| entry.file_name().into_string().ok())
        .map(|interface| DataLinkConfig::socketcan(&interface))
        .collect();
    links.sort_by(|a, b| a.name.cmp(&b.name));
    links
}

#[cfg(not(all(target_os = "linux", feature = "socketcan")))]
fn detect_socketcan() -> Vec<DataLinkConfig> {
    vec![]
}

/// Enumerate candidate links: SocketCAN interfaces, installed J2534 drivers and serial ports.
pub fn detect() -> Vec<DataLinkConfig> {
    let mut links = detect_socketcan();

    #[cfg(feature = "j2534")]
    links.extend(
        crate::j2534::drivers()
            .into_iter()
            .map(|driver| DataLinkConfig::passthru(&driver.name, &driver.library.to_string_lossy())),
    );

    #[cfg(feature = "elm327")]
    if let Ok(ports) = serialport::available_ports() {
        links.extend(
            ports
                .into_iter()
                .map(|port| DataLinkConfig::elm327(&port.port_name, DEFAULT_ELM327_BAUDRATE)),
        );
    }

    info!("Detected {} data links", links.len());
    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elm327_has_no_raw_can() {
        let link = DataLink::new(DataLinkConfig::elm327("/dev/null", DEFAULT_ELM327_BAUDRATE));
        assert!(matches!(link.can(500_000), Err(Error::Unsupported(_))));
    }

    #[cfg(not(feature = "j2534"))]
    #[test]
    fn disabled_j2534_names_feature() {
        let link = DataLink::new(DataLinkConfig::passthru("missing", "/nonexistent/j2534.so"));
        match link.can(500_000) {
            Err(Error::Unsupported(msg)) => assert!(msg.contains("`j2534` feature"), "{}", msg),
            other => panic!("Expected Unsupported, got {:?}", other.err()),
        }
    }

    #[cfg(not(feature = "elm327"))]
    #[test]
    fn disabled_elm327_names_feature() {
        let link = DataLink::new(DataLinkConfig::elm327("/dev/null", DEFAULT_ELM327_BAUDRATE));
        let options = IsoTPOptions::from_id(0x7e0.into());
        match link.isotp(options, 500_000) {
            Err(Error::Unsupported(msg)) => assert!(msg.contains("`elm327` feature"), "{}", msg),
            other => panic!("Expected Unsupported, got {:?}", other.err()),
        }
    }

    #[cfg(feature = "j2534")]
    #[test]
    fn missing_j2534_library() {
        let link = DataLink::new(DataLinkConfig::passthru("missing", "/nonexistent/j2534.so"));
        assert!(matches!(
            link.can(500_000),
            Err(Error::J2534Error(crate::j2534::Error::LoadFailed(_)))
        ));
    }
}
