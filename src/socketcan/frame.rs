//! Conversion between [`Frame`] and the kernel `can_frame`.
use libc::{can_frame, canid_t, CAN_EFF_FLAG, CAN_EFF_MASK, CAN_ERR_FLAG, CAN_RTR_FLAG, CAN_SFF_MASK};

use crate::can::{Frame, Identifier, CAN_MAX_DLEN};
use crate::error::Error;

pub fn can_frame_default() -> can_frame {
    unsafe { std::mem::zeroed() }
}

pub fn id_to_canid_t(id: Identifier) -> canid_t {
    match id {
        Identifier::Standard(id) => id & CAN_SFF_MASK,
        Identifier::Extended(id) => (id & CAN_EFF_MASK) | CAN_EFF_FLAG,
    }
}

fn canid_t_to_id(id: canid_t) -> Identifier {
    match id & CAN_EFF_FLAG != 0 {
        true => Identifier::Extended(id & CAN_EFF_MASK),
        false => Identifier::Standard(id & CAN_SFF_MASK),
    }
}

impl TryFrom<&can_frame> for Frame {
    type Error = Error;

    /// Error and remote frames carry no diagnostic payload and are rejected.
    fn try_from(frame: &can_frame) -> Result<Self, Self::Error> {
        if frame.can_id & (CAN_ERR_FLAG | CAN_RTR_FLAG) != 0 || frame.can_dlc as usize > CAN_MAX_DLEN {
            return Err(Error::MalformedFrame);
        }

        Frame::new(
            canid_t_to_id(frame.can_id),
            &frame.data[..frame.can_dlc as usize],
        )
    }
}

impl From<&Frame> for can_frame {
    fn from(frame: &Frame) -> can_frame {
        // Frame::new guarantees at most 8 bytes
        let len = std::cmp::min(frame.data.len(), CAN_MAX_DLEN);

        let mut raw_frame = can_frame_default();
        raw_frame.can_id = id_to_canid_t(frame.id);
        raw_frame.can_dlc = len as u8;
        raw_frame.data[..len].copy_from_slice(&frame.data[..len]);

        raw_frame
    }
}
