use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::can::{CanAdapter, Frame, Identifier};
use crate::j2534::types::{connect_flags, FilterType, PassThruMsg, Protocol};
use crate::j2534::{Channel, Device};
use crate::Result;

const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Raw CAN channel on a pass-through device.
pub struct J2534Can {
    channel: Channel,
    filter: Option<u32>,
}

impl J2534Can {
    /// Connect a CAN channel accepting both 11 and 29 bit identifiers. All frames pass until
    /// [`J2534Can::set_pass_filter`] narrows it down.
    pub fn connect(device: Arc<Device>, bitrate: u32) -> Result<Self> {
        let channel = Channel::connect(device, Protocol::Can, connect_flags::CAN_ID_BOTH, bitrate)?;
        let mut adapter = Self { channel, filter: None };
        adapter.set_pass_filter(Identifier::Standard(0), 0)?;
        Ok(adapter)
    }

    /// Replace the pass filter: a frame is received if `received_id & mask == id & mask`.
    pub fn set_pass_filter(&mut self, id: Identifier, mask: u32) -> Result<()> {
        if let Some(filter) = self.filter.take() {
            self.channel.stop_filter(filter)?;
        }

        let pattern_msg = PassThruMsg::new(Protocol::Can, id, &[])?;
        let mask_msg = PassThruMsg::mask_for(&pattern_msg, mask);
        self.filter = Some(
            self.channel
                .start_filter(FilterType::Pass, &mask_msg, &pattern_msg, None)?,
        );
        Ok(())
    }
}

impl CanAdapter for J2534Can {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        debug!("TX {:?}", frame);
        let msg = PassThruMsg::new(Protocol::Can, frame.id, &frame.data)?;
        Ok(self.channel.write(&msg, WRITE_TIMEOUT)?)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(msg) = self.channel.read(remaining)? else {
                return Ok(None);
            };

            match msg.to_frame() {
                Some(frame) => {
                    debug!("RX {:?}", frame);
                    return Ok(Some(frame));
                }
                None => debug!("Ignoring {:?}", msg),
            }

            if remaining.is_zero() {
                return Ok(None);
            }
        }
    }

    fn set_filter(&mut self, id: Identifier) -> Result<()> {
        self.set_pass_filter(id, 0xffff_ffff)
    }
}
