//! Generic CAN types and traits

pub mod logging;
pub mod mock;
pub mod receiver;

use std::fmt;
use std::time::Duration;

pub use logging::{CanLog, Direction, LogEntry, LoggingCanAdapter};
pub use receiver::{BackgroundReceiver, FrameSource};

/// Maximum payload of a classic CAN frame.
pub const CAN_MAX_DLEN: usize = 8;

const STANDARD_ID_MAX: u32 = 0x7ff;
const EXTENDED_ID_MAX: u32 = 0x1fffffff;

/// Identifier for a CAN frame
#[derive(Copy, Clone, PartialOrd, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Identifier {
    Standard(u32),
    Extended(u32),
}

impl Identifier {
    pub fn is_standard(&self) -> bool {
        match self {
            Identifier::Standard(_) => true,
            Identifier::Extended(_) => false,
        }
    }
    pub fn is_extended(&self) -> bool {
        !self.is_standard()
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Extended(id) => write!(f, "0x{:08x}", id),
            Identifier::Standard(id) => write!(f, "0x{:03x}", id),
        }
    }
}

impl From<u32> for Identifier {
    fn from(id: u32) -> Identifier {
        if id <= STANDARD_ID_MAX {
            Identifier::Standard(id)
        } else {
            Identifier::Extended(id)
        }
    }
}

impl From<Identifier> for u32 {
    fn from(val: Identifier) -> u32 {
        match val {
            Identifier::Standard(id) => id,
            Identifier::Extended(id) => id,
        }
    }
}

/// A classic CAN frame with up to 8 data bytes. The frame length is the length of `data`.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Frame {
    /// Arbitration ID
    pub id: Identifier,
    /// Frame Data
    pub data: Vec<u8>,
    /// Whether the frame was sent out by this adapter and echoed back
    pub loopback: bool,
}

impl Frame {
    pub fn new(id: Identifier, data: &[u8]) -> Result<Frame, crate::error::Error> {
        if data.len() > CAN_MAX_DLEN {
            return Err(crate::error::Error::MalformedFrame);
        }

        // Check if the ID makes sense
        match id {
            Identifier::Standard(id) if id > STANDARD_ID_MAX => return Err(crate::error::Error::MalformedFrame),
            Identifier::Extended(id) if id > EXTENDED_ID_MAX => return Err(crate::error::Error::MalformedFrame),
            _ => {}
        };

        Ok(Frame {
            id,
            data: data.to_vec(),
            loopback: false,
        })
    }

    /// Length of the payload, always between 0 and 8.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fill the unused bytes with `padding` so the frame carries exactly 8 bytes.
    pub fn pad(&mut self, padding: u8) {
        self.data.resize(CAN_MAX_DLEN, padding);
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("data", &hex::encode(&self.data))
            .field("loopback", &self.loopback)
            .finish()
    }
}

/// Trait for a blocking CAN adapter.
pub trait CanAdapter {
    /// Transmit one frame. Returns once the medium accepted the frame.
    fn send(&mut self, frame: &Frame) -> crate::Result<()>;

    /// Wait up to `timeout` for the next frame. Returns `None` only after the timeout elapsed.
    fn recv(&mut self, timeout: Duration) -> crate::Result<Option<Frame>>;

    /// Only receive frames with identifier `id` from now on. Adapters without acceptance filtering
    /// keep receiving everything and leave the check to the caller.
    fn set_filter(&mut self, _id: Identifier) -> crate::Result<()> {
        Ok(())
    }
}

impl<T: CanAdapter + ?Sized> CanAdapter for Box<T> {
    fn send(&mut self, frame: &Frame) -> crate::Result<()> {
        (**self).send(frame)
    }

    fn recv(&mut self, timeout: Duration) -> crate::Result<Option<Frame>> {
        (**self).recv(timeout)
    }

    fn set_filter(&mut self, id: Identifier) -> crate::Result<()> {
        (**self).set_filter(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_compare() {
        assert_eq!(true, Identifier::Standard(0x123) < Identifier::Standard(0x124));
        assert_eq!(true, Identifier::Standard(0x7ff) > Identifier::Standard(0x100));

        // Extended IDs always have lower priority than standard IDs
        assert_eq!(true, Identifier::Extended(0x1) > Identifier::Standard(0x100));
    }

    #[test]
    fn id_from_u32() {
        assert_eq!(Identifier::from(0x7e0), Identifier::Standard(0x7e0));
        assert_eq!(Identifier::from(0x18daf110), Identifier::Extended(0x18daf110));
        assert_eq!(u32::from(Identifier::Extended(0x18daf110)), 0x18daf110);
    }

    #[test]
    fn frame_length_limit() {
        assert!(Frame::new(0x123.into(), &[0u8; 8]).is_ok());
        assert!(matches!(
            Frame::new(0x123.into(), &[0u8; 9]),
            Err(crate::Error::MalformedFrame)
        ));
        assert!(matches!(
            Frame::new(Identifier::Standard(0x800), &[]),
            Err(crate::Error::MalformedFrame)
        ));
        assert!(matches!(
            Frame::new(Identifier::Extended(0x2000_0000), &[]),
            Err(crate::Error::MalformedFrame)
        ));
    }

    #[test]
    fn frame_padding() {
        let mut frame = Frame::new(0x7e0.into(), &[0x02, 0x10, 0x03]).unwrap();
        frame.pad(0x00);
        assert_eq!(frame.len(), 8);
        assert_eq!(frame.data, vec![0x02, 0x10, 0x03, 0, 0, 0, 0, 0]);
    }
}
