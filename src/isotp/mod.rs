//! ISO Transport Protocol (ISO-TP) implementation, implements ISO 15765-2
//! ## Example:
//! ```rust,no_run
//! use ecu_link::isotp::{IsoTPAdapter, IsoTPOptions, IsoTpChannel};
//!
//! fn isotp_example() -> ecu_link::Result<()> {
//!     let adapter = ecu_link::socketcan::SocketCan::open("can0")?;
//!     let options = IsoTPOptions::from_id(0x7e0.into());
//!     let mut isotp = IsoTPAdapter::new(adapter, options);
//!
//!     let response = isotp.request(&[0x3e, 0x00])?;
//!     println!("{}", hex::encode(response));
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod constants;
pub mod error;
pub mod mock;
pub mod types;

use std::time::{Duration, Instant};

use crate::can::{CanAdapter, Frame};
use crate::error::Error;
use crate::isotp::constants::FlowStatus;
use crate::Result;

pub use codec::{segment, Progress, Reassembler};
pub use types::{FlowControlConfig, IsoTPOptions};

use tracing::{debug, warn};

/// A reliable packet channel to one ECU. Implemented by the manual segmentation layer on top of a
/// [`CanAdapter`], and by adapters that implement ISO-TP natively.
pub trait IsoTpChannel {
    /// Send one packet of up to 4095 bytes.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive the next packet from the destination ID. Returns [`Error::Timeout`] if nothing arrives in time.
    fn recv(&mut self) -> Result<Vec<u8>>;

    /// Send a packet and block for the answer.
    fn request(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.send(data)?;
        self.recv()
    }

    fn options(&self) -> &IsoTPOptions;

    /// Replace the addressing and timing of this channel.
    fn set_options(&mut self, options: IsoTPOptions) -> Result<()>;
}

impl<T: IsoTpChannel + ?Sized> IsoTpChannel for Box<T> {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        (**self).send(data)
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        (**self).recv()
    }

    fn request(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        (**self).request(data)
    }

    fn options(&self) -> &IsoTPOptions {
        (**self).options()
    }

    fn set_options(&mut self, options: IsoTPOptions) -> Result<()> {
        (**self).set_options(options)
    }
}

/// Wraps a CAN adapter to provide a simple interface for sending and receiving ISO-TP packets. CAN-FD ISO-TP is not supported.
pub struct IsoTPAdapter<C: CanAdapter> {
    adapter: C,
    options: IsoTPOptions,
}

impl<C: CanAdapter> IsoTPAdapter<C> {
    /// Convenience method for creating a new IsoTPAdapter from a CAN adapter and an Arbitration ID.
    pub fn from_id(adapter: C, id: u32) -> Self {
        Self::new(adapter, IsoTPOptions::from_id(id.into()))
    }

    /// Create a new IsoTPAdapter from a CAN adapter and a configuration.
    pub fn new(adapter: C, options: IsoTPOptions) -> Self {
        Self { adapter, options }
    }

    pub fn get_ref(&self) -> &C {
        &self.adapter
    }

    pub fn get_mut(&mut self) -> &mut C {
        &mut self.adapter
    }

    pub fn into_inner(self) -> C {
        self.adapter
    }

    fn send_frame(&mut self, data: &[u8]) -> Result<()> {
        let frame = Frame::new(self.options.source_id, data)?;
        self.adapter.send(&frame)
    }

    fn send_flow_control(&mut self) -> Result<()> {
        let fc = FlowControlConfig::continue_to_send(self.options.block_size, self.options.st_min);
        let mut buf = fc.to_bytes().to_vec();
        if let Some(padding) = self.options.padding {
            buf.resize(8, padding);
        }

        debug!("TX FC, data {}", hex::encode(&buf));
        self.send_frame(&buf)
    }

    /// Next frame from the destination ID. Frames with other IDs and our own echoed frames are skipped.
    fn recv_frame(&mut self, deadline: Instant) -> Result<Frame> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            match self.adapter.recv(remaining)? {
                None => return Err(Error::Timeout),
                Some(frame) if frame.loopback || frame.id != self.options.dest_id => continue,
                Some(frame) => return Ok(frame),
            }
        }
    }

    /// Wait for a Flow Control frame that allows us to continue, honoring Wait frames up to the configured limit.
    fn recv_flow_control(&mut self) -> Result<FlowControlConfig> {
        let mut wait_frames = 0;
        loop {
            let deadline = Instant::now() + self.options.timeout;
            let frame = self.recv_frame(deadline)?;
            debug!("RX FC, data {}", hex::encode(&frame.data));

            let fc = match FlowControlConfig::try_from(frame.data.as_slice()) {
                Ok(fc) => fc,
                Err(error::Error::MalformedFrame) => {
                    warn!("Dropping malformed FC {}", hex::encode(&frame.data));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            match fc.flow_status {
                FlowStatus::ContinueToSend => return Ok(fc),
                FlowStatus::Wait => {
                    wait_frames += 1;
                    if wait_frames > self.options.max_wait_frames {
                        return Err(error::Error::FlowControlWaitExceeded.into());
                    }
                }
                FlowStatus::Overflow => return Err(error::Error::Overflow.into()),
            }
        }
    }

    fn send_multiple(&mut self, frames: &[Vec<u8>]) -> Result<()> {
        debug!("TX FF, data {}", hex::encode(&frames[0]));
        self.send_frame(&frames[0])?;

        let mut consecutive = frames[1..].iter().peekable();
        while consecutive.peek().is_some() {
            let fc = self.recv_flow_control()?;
            let block_size = match fc.block_size {
                0 => usize::MAX,
                bs => bs as usize,
            };

            for (idx, frame) in consecutive.by_ref().take(block_size).enumerate() {
                if idx > 0 && fc.separation_time_min > Duration::ZERO {
                    std::thread::sleep(fc.separation_time_min);
                }
                debug!("TX CF, data {}", hex::encode(frame));
                self.send_frame(frame)?;
            }
        }

        Ok(())
    }
}

impl<C: CanAdapter> IsoTpChannel for IsoTPAdapter<C> {
    /// Send an ISO-TP packet of up to 4095 bytes. Returns [`Error::Timeout`] if the ECU is not responding in time with flow control messages.
    fn send(&mut self, data: &[u8]) -> Result<()> {
        debug!("TX {}", hex::encode(data));

        let frames = codec::segment(data, self.options.padding)?;
        if frames.len() == 1 {
            debug!("TX SF, length: {} data {}", data.len(), hex::encode(&frames[0]));
            self.send_frame(&frames[0])
        } else {
            self.send_multiple(&frames)
        }
    }

    /// Receive an ISO-TP packet. Returns [`Error::Timeout`] if the timeout is exceeded between individual ISO-TP frames. Note the total time to receive a packet may be longer than the timeout.
    fn recv(&mut self) -> Result<Vec<u8>> {
        let mut reassembler = Reassembler::new(self.options.block_size);
        let mut deadline = Instant::now() + self.options.timeout;

        loop {
            let frame = self.recv_frame(deadline)?;
            match reassembler.feed(&frame.data)? {
                Progress::Ignored => continue,
                Progress::FlowControlRequired => self.send_flow_control()?,
                Progress::InProgress => {}
                Progress::Complete(buf) => {
                    debug!("RX {}", hex::encode(&buf));
                    return Ok(buf);
                }
            }
            deadline = Instant::now() + self.options.timeout;
        }
    }

    fn options(&self) -> &IsoTPOptions {
        &self.options
    }

    /// Replace the options and move the adapter's acceptance filter to the new destination ID.
    fn set_options(&mut self, options: IsoTPOptions) -> Result<()> {
        self.adapter.set_filter(options.dest_id)?;
        self.options = options;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can::mock::MockCanAdapter;
    use crate::can::Identifier;

    const TESTER: u32 = 0x7e0;
    const ECU: u32 = 0x7e8;

    fn ecu_frame(data: &[u8]) -> Frame {
        Frame::new(ECU.into(), data).unwrap()
    }

    fn adapter(mock: MockCanAdapter) -> IsoTPAdapter<MockCanAdapter> {
        IsoTPAdapter::from_id(mock, TESTER)
    }

    #[test]
    fn send_single_frame_padded() {
        let mut isotp = adapter(MockCanAdapter::new());
        isotp.send(&[0x10, 0x03]).unwrap();

        let sent = isotp.get_ref().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, Identifier::Standard(TESTER));
        assert_eq!(sent[0].data, vec![0x02, 0x10, 0x03, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn send_multi_frame_waits_for_flow_control() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[0x30, 0x00, 0x00]));
        let mut isotp = adapter(mock);

        let data: Vec<u8> = (0..20).collect();
        isotp.send(&data).unwrap();

        let sent = isotp.get_ref().sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].data, vec![0x10, 20, 0, 1, 2, 3, 4, 5]);
        assert_eq!(sent[1].data, vec![0x21, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(sent[2].data, vec![0x22, 13, 14, 15, 16, 17, 18, 19]);
    }

    #[test]
    fn send_respects_block_size() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[0x30, 0x01, 0x00]));
        mock.push_rx(ecu_frame(&[0x30, 0x01, 0x00]));
        let mut isotp = adapter(mock);

        isotp.send(&[0x55; 20]).unwrap();
        assert_eq!(isotp.get_ref().sent().len(), 3);
        assert_eq!(isotp.get_ref().pending(), 0);
    }

    #[test]
    fn send_missing_second_block_flow_control() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[0x30, 0x01, 0x00]));
        let mut isotp = adapter(mock);

        assert!(matches!(isotp.send(&[0x55; 20]), Err(Error::Timeout)));
        // FF and the first block went out
        assert_eq!(isotp.get_ref().sent().len(), 2);
    }

    #[test]
    fn send_honors_wait() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[0x31, 0x00, 0x00]));
        mock.push_rx(ecu_frame(&[0x31, 0x00, 0x00]));
        mock.push_rx(ecu_frame(&[0x30, 0x00, 0x00]));
        let mut isotp = adapter(mock);

        isotp.send(&[0x55; 20]).unwrap();
        assert_eq!(isotp.get_ref().sent().len(), 3);
    }

    #[test]
    fn send_drops_malformed_flow_control() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[0x30, 0x00]));
        mock.push_rx(ecu_frame(&[0x21, 0x00, 0x00]));
        mock.push_rx(ecu_frame(&[0x30, 0x00, 0x00]));
        let mut isotp = adapter(mock);

        isotp.send(&[0x55; 20]).unwrap();
        assert_eq!(isotp.get_ref().sent().len(), 3);
    }

    #[test]
    fn send_reserved_flow_status() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[0x35, 0x00, 0x00]));
        let mut isotp = adapter(mock);

        assert!(matches!(
            isotp.send(&[0x55; 20]),
            Err(Error::IsoTPError(error::Error::FlowControl))
        ));
    }

    #[test]
    fn send_wait_limit() {
        let mut mock = MockCanAdapter::new();
        for _ in 0..3 {
            mock.push_rx(ecu_frame(&[0x31, 0x00, 0x00]));
        }
        let mut options = IsoTPOptions::from_id(TESTER.into());
        options.max_wait_frames = 2;
        let mut isotp = IsoTPAdapter::new(mock, options);

        assert!(matches!(
            isotp.send(&[0x55; 20]),
            Err(Error::IsoTPError(error::Error::FlowControlWaitExceeded))
        ));
    }

    #[test]
    fn send_empty_packet() {
        let mut isotp = adapter(MockCanAdapter::new());
        assert!(matches!(isotp.send(&[]), Err(Error::IsoTPError(error::Error::EmptyPacket))));
        assert!(isotp.get_ref().sent().is_empty());
    }

    #[test]
    fn send_overflow() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[0x32, 0x00, 0x00]));
        let mut isotp = adapter(mock);

        assert!(matches!(
            isotp.send(&[0x55; 20]),
            Err(Error::IsoTPError(error::Error::Overflow))
        ));
        assert_eq!(isotp.get_ref().sent().len(), 1);
    }

    #[test]
    fn send_without_flow_control_times_out() {
        let mut isotp = adapter(MockCanAdapter::new());
        assert!(matches!(isotp.send(&[0x55; 20]), Err(Error::Timeout)));
    }

    #[test]
    fn recv_multi_frame_sends_flow_control() {
        let data: Vec<u8> = (0..30).collect();
        let mut mock = MockCanAdapter::new();
        for frame in codec::segment(&data, Some(0xaa)).unwrap() {
            mock.push_rx(ecu_frame(&frame));
        }
        let mut isotp = adapter(mock);

        assert_eq!(isotp.recv().unwrap(), data);

        let sent = isotp.get_ref().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, Identifier::Standard(TESTER));
        assert_eq!(sent[0].data, vec![0x30, 0x00, 0x00, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn recv_ignores_other_ids_and_loopback() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(Frame::new(0x7e9.into(), &[0x02, 0x50, 0x01]).unwrap());
        let mut echoed = ecu_frame(&[0x02, 0x50, 0x02]);
        echoed.loopback = true;
        mock.push_rx(echoed);
        mock.push_rx(ecu_frame(&[0x02, 0x50, 0x03]));
        let mut isotp = adapter(mock);

        assert_eq!(isotp.recv().unwrap(), vec![0x50, 0x03]);
    }

    #[test]
    fn recv_drops_malformed_until_timeout() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[]));
        mock.push_rx(ecu_frame(&[0x07, 0x01]));
        let mut isotp = adapter(mock);

        assert!(matches!(isotp.recv(), Err(Error::Timeout)));
    }

    #[test]
    fn recv_out_of_order() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(ecu_frame(&[0x10, 0x10, 0, 1, 2, 3, 4, 5]));
        mock.push_rx(ecu_frame(&[0x22, 6, 7, 8, 9, 10, 11, 12]));
        let mut isotp = adapter(mock);

        assert!(matches!(
            isotp.recv(),
            Err(Error::IsoTPError(error::Error::OutOfOrder { expected: 1, actual: 2 }))
        ));
    }

    #[test]
    fn set_options_changes_addressing() {
        let mut mock = MockCanAdapter::new();
        mock.push_rx(Frame::new(0x7e9.into(), &[0x01, 0x7e]).unwrap());
        let mut isotp = adapter(mock);

        isotp
            .set_options(IsoTPOptions::new(0x7e1.into(), 0x7e9.into()))
            .unwrap();
        assert_eq!(isotp.request(&[0x3e]).unwrap(), vec![0x7e]);
        assert_eq!(isotp.get_ref().sent()[0].id, Identifier::Standard(0x7e1));
    }

    #[test]
    fn set_options_moves_filter() {
        let mut mock = MockCanAdapter::new();
        mock.set_filter(ECU.into()).unwrap();
        mock.push_rx(Frame::new(0x7e9.into(), &[0x01, 0x7e]).unwrap());
        let mut isotp = adapter(mock);

        isotp
            .set_options(IsoTPOptions::new(0x7e1.into(), 0x7e9.into()))
            .unwrap();
        assert_eq!(isotp.get_ref().filter(), Some(Identifier::Standard(0x7e9)));
        assert_eq!(isotp.recv().unwrap(), vec![0x7e]);
    }
}
