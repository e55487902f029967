//! Configuration for links and platforms.
use std::fmt;
use std::time::Duration;

use crate::can::Identifier;
use crate::isotp::IsoTPOptions;

/// Default serial speed of ELM327 v1.x adapters.
pub const DEFAULT_ELM327_BAUDRATE: u32 = 38_400;

/// Physical interface behind a link.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataLinkKind {
    /// Linux SocketCAN network interface, e.g. `can0`
    SocketCan { interface: String },
    /// J2534 driver library (DLL/shared object)
    PassThru { library: String },
    /// ELM327 compatible adapter on a serial port
    Elm327 { port: String, baudrate: u32 },
}

impl fmt::Display for DataLinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLinkKind::SocketCan { interface } => write!(f, "SocketCAN {}", interface),
            DataLinkKind::PassThru { library } => write!(f, "J2534 {}", library),
            DataLinkKind::Elm327 { port, baudrate } => write!(f, "ELM327 {} @ {}", port, baudrate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataLinkConfig {
    /// Display name, e.g. the driver name from the registry
    pub name: String,
    pub kind: DataLinkKind,
}

impl DataLinkConfig {
    pub fn new(name: impl Into<String>, kind: DataLinkKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn socketcan(interface: &str) -> Self {
        Self::new(
            interface,
            DataLinkKind::SocketCan {
                interface: interface.to_string(),
            },
        )
    }

    pub fn passthru(name: &str, library: &str) -> Self {
        Self::new(
            name,
            DataLinkKind::PassThru {
                library: library.to_string(),
            },
        )
    }

    pub fn elm327(port: &str, baudrate: u32) -> Self {
        Self::new(
            port,
            DataLinkKind::Elm327 {
                port: port.to_string(),
                baudrate,
            },
        )
    }
}

/// Addressing and bus settings of one vehicle platform's diagnostic ECU.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlatformConfig {
    pub name: String,
    /// Tester request ID
    pub source_id: Identifier,
    /// ECU response ID
    pub dest_id: Identifier,
    /// CAN bitrate in bit/s
    pub baudrate: u32,
    /// Per frame/response timeout
    pub timeout: Duration,
    /// Name of the flashing procedure used by higher layers, if any
    pub flash_mode: Option<String>,
    pub download_mode: Option<String>,
    pub log_mode: Option<String>,
}

impl PlatformConfig {
    /// Platform on the standard OBD-II 11 bit addressing at 500 kbit/s.
    pub fn new(name: &str, source_id: Identifier, dest_id: Identifier) -> Self {
        Self {
            name: name.to_string(),
            source_id,
            dest_id,
            baudrate: 500_000,
            timeout: Duration::from_millis(1000),
            flash_mode: None,
            download_mode: None,
            log_mode: None,
        }
    }

    pub fn isotp_options(&self) -> IsoTPOptions {
        IsoTPOptions::new(self.source_id, self.dest_id).with_timeout(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_options() {
        let mut platform = PlatformConfig::new("mazdaspeed6", 0x7e0.into(), 0x7e8.into());
        platform.timeout = Duration::from_millis(250);

        let options = platform.isotp_options();
        assert_eq!(options.source_id, Identifier::Standard(0x7e0));
        assert_eq!(options.dest_id, Identifier::Standard(0x7e8));
        assert_eq!(options.timeout, Duration::from_millis(250));
    }

    #[test]
    fn display() {
        assert_eq!(DataLinkConfig::socketcan("can0").kind.to_string(), "SocketCAN can0");
        assert_eq!(
            DataLinkConfig::elm327("/dev/ttyUSB0", DEFAULT_ELM327_BAUDRATE).kind.to_string(),
            "ELM327 /dev/ttyUSB0 @ 38400"
        );
    }
}
