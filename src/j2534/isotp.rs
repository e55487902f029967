use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::error::Error;
use crate::isotp::{IsoTPOptions, IsoTpChannel};
use crate::j2534::types::{connect_flags, ConfigParameter, FilterType, PassThruMsg, Protocol};
use crate::j2534::{Channel, Device};
use crate::Result;

/// ISO-TP channel using the driver's ISO15765 protocol. Segmentation and flow control happen in the device.
pub struct J2534IsoTp {
    channel: Channel,
    options: IsoTPOptions,
    filter: Option<u32>,
}

impl J2534IsoTp {
    pub fn connect(device: Arc<Device>, bitrate: u32, options: IsoTPOptions) -> Result<Self> {
        let flags = if options.source_id.is_extended() {
            connect_flags::CAN_29BIT_ID
        } else {
            0
        };
        let channel = Channel::connect(device, Protocol::Iso15765, flags, bitrate)?;

        let mut isotp = Self {
            channel,
            options,
            filter: None,
        };
        isotp.program(options)?;
        Ok(isotp)
    }

    /// Install the flow control filter and block size/STmin for `options`.
    fn program(&mut self, options: IsoTPOptions) -> Result<()> {
        if let Some(filter) = self.filter.take() {
            self.channel.stop_filter(filter)?;
        }

        let pattern = PassThruMsg::new(Protocol::Iso15765, options.dest_id, &[])?;
        let mask = PassThruMsg::mask_for(&pattern, 0xffff_ffff);
        let flow_control = PassThruMsg::new(Protocol::Iso15765, options.source_id, &[])?;

        self.filter = Some(self.channel.start_filter(
            FilterType::FlowControl,
            &mask,
            &pattern,
            Some(&flow_control),
        )?);

        let st_min = crate::isotp::types::encode_st_min(options.st_min) as u32;
        self.channel.set_config(&[
            (ConfigParameter::Iso15765Bs, options.block_size as u32),
            (ConfigParameter::Iso15765Stmin, st_min),
        ])?;
        self.channel.clear_rx_buffer()?;

        self.options = options;
        Ok(())
    }
}

impl IsoTpChannel for J2534IsoTp {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        debug!("TX {}", hex::encode(data));
        let msg = PassThruMsg::new(Protocol::Iso15765, self.options.source_id, data)?;
        Ok(self.channel.write(&msg, self.options.timeout)?)
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        let deadline = Instant::now() + self.options.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if let Some(msg) = self.channel.read(remaining)? {
                if let Some(payload) = msg.isotp_payload(self.options.dest_id) {
                    debug!("RX {}", hex::encode(payload));
                    return Ok(payload.to_vec());
                }
                debug!("Skipping {:?}", msg);
            }

            if remaining.is_zero() || Instant::now() >= deadline {
                return Err(Error::Timeout);
            }
        }
    }

    fn options(&self) -> &IsoTPOptions {
        &self.options
    }

    fn set_options(&mut self, options: IsoTPOptions) -> Result<()> {
        self.program(options)
    }
}
