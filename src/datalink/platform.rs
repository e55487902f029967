use crate::can::CanAdapter;
use crate::datalink::{DataLink, PlatformConfig};
use crate::isotp::IsoTpChannel;
use crate::uds::UDSClient;
use crate::Result;

/// A [`DataLink`] bound to one platform's bitrate and diagnostic addressing.
pub struct PlatformLink {
    datalink: DataLink,
    platform: PlatformConfig,
}

impl PlatformLink {
    pub fn new(datalink: DataLink, platform: PlatformConfig) -> Self {
        Self { datalink, platform }
    }

    pub fn datalink(&self) -> &DataLink {
        &self.datalink
    }

    pub fn platform(&self) -> &PlatformConfig {
        &self.platform
    }

    /// Raw CAN at the platform bitrate.
    pub fn can(&self) -> Result<Box<dyn CanAdapter + Send>> {
        self.datalink.can(self.platform.baudrate)
    }

    /// ISO-TP channel between the tester and the platform's ECU.
    pub fn isotp(&self) -> Result<Box<dyn IsoTpChannel + Send>> {
        self.datalink
            .isotp(self.platform.isotp_options(), self.platform.baudrate)
    }

    pub fn uds(&self) -> Result<UDSClient<Box<dyn IsoTpChannel + Send>>> {
        Ok(UDSClient::new(self.isotp()?))
    }
}
