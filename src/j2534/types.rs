//! PassThru message layout and API constants (SAE J2534-1 v04.04).

use crate::can::{Frame, Identifier};
use crate::j2534::error::Error;

/// Size of the data buffer in a PASSTHRU_MSG.
pub const PASSTHRU_MSG_DATA_SIZE: usize = 4128;
/// Largest ISO15765 message accepted by drivers, including the 4 byte CAN ID.
pub const ISO15765_MAX_MSG_SIZE: usize = 4124;
/// Bytes used by the CAN ID at the start of every CAN/ISO15765 message.
pub const CAN_ID_SIZE: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum Protocol {
    Can = 0x05,
    Iso15765 = 0x06,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum FilterType {
    Pass = 0x01,
    Block = 0x02,
    FlowControl = 0x03,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum IoctlId {
    GetConfig = 0x01,
    SetConfig = 0x02,
    ClearTxBuffer = 0x07,
    ClearRxBuffer = 0x08,
    ClearMsgFilters = 0x0a,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum ConfigParameter {
    DataRate = 0x01,
    Loopback = 0x03,
    Iso15765Bs = 0x1e,
    Iso15765Stmin = 0x1f,
}

pub mod connect_flags {
    pub const CAN_29BIT_ID: u32 = 0x0100;
    pub const CAN_ID_BOTH: u32 = 0x0800;
}

pub mod tx_flags {
    pub const ISO15765_FRAME_PAD: u32 = 0x0040;
    pub const CAN_29BIT_ID: u32 = 0x0100;
}

pub mod rx_status {
    /// Echo of a message sent by this channel
    pub const TX_MSG_TYPE: u32 = 0x0001;
    /// First frame of an incoming ISO15765 message, the payload follows later
    pub const START_OF_MESSAGE: u32 = 0x0002;
    /// Confirmation that an ISO15765 message was transmitted
    pub const TX_DONE: u32 = 0x0008;
    pub const CAN_29BIT_ID: u32 = 0x0100;
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct SConfig {
    pub parameter: u32,
    pub value: u32,
}

#[repr(C)]
#[derive(Debug)]
pub struct SConfigList {
    pub num_of_params: u32,
    pub config: *mut SConfig,
}

/// PASSTHRU_MSG as passed to the driver.
#[repr(C)]
#[derive(Clone)]
pub struct PassThruMsg {
    pub protocol_id: u32,
    pub rx_status: u32,
    pub tx_flags: u32,
    pub timestamp: u32,
    pub data_size: u32,
    pub extra_data_index: u32,
    pub data: [u8; PASSTHRU_MSG_DATA_SIZE],
}

impl Default for PassThruMsg {
    fn default() -> Self {
        Self {
            protocol_id: 0,
            rx_status: 0,
            tx_flags: 0,
            timestamp: 0,
            data_size: 0,
            extra_data_index: 0,
            data: [0; PASSTHRU_MSG_DATA_SIZE],
        }
    }
}

impl std::fmt::Debug for PassThruMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassThruMsg")
            .field("protocol_id", &self.protocol_id)
            .field("rx_status", &format_args!("0x{:x}", self.rx_status))
            .field("tx_flags", &format_args!("0x{:x}", self.tx_flags))
            .field("data", &hex::encode(self.payload()))
            .finish()
    }
}

impl PassThruMsg {
    /// Message for `protocol` with a 4 byte big endian CAN ID followed by `data`.
    pub fn new(protocol: Protocol, id: Identifier, data: &[u8]) -> Result<Self, Error> {
        let size = CAN_ID_SIZE + data.len();
        let limit = match protocol {
            Protocol::Can => CAN_ID_SIZE + crate::can::CAN_MAX_DLEN,
            Protocol::Iso15765 => ISO15765_MAX_MSG_SIZE,
        };
        if size > limit {
            return Err(Error::MessageTooLarge(size));
        }

        let mut msg = PassThruMsg {
            protocol_id: protocol as u32,
            data_size: size as u32,
            ..Default::default()
        };
        if id.is_extended() {
            msg.tx_flags |= tx_flags::CAN_29BIT_ID;
        }
        if protocol == Protocol::Iso15765 {
            msg.tx_flags |= tx_flags::ISO15765_FRAME_PAD;
        }

        let raw_id: u32 = id.into();
        msg.data[..CAN_ID_SIZE].copy_from_slice(&raw_id.to_be_bytes());
        msg.data[CAN_ID_SIZE..size].copy_from_slice(data);
        Ok(msg)
    }

    /// Filter mask matching `pattern`: same protocol and flags, `mask` in place of the CAN ID.
    pub fn mask_for(pattern: &PassThruMsg, mask: u32) -> Self {
        let mut msg = pattern.clone();
        msg.data[..CAN_ID_SIZE].copy_from_slice(&mask.to_be_bytes());
        msg
    }

    /// Valid part of the data buffer.
    pub fn payload(&self) -> &[u8] {
        let size = std::cmp::min(self.data_size as usize, PASSTHRU_MSG_DATA_SIZE);
        &self.data[..size]
    }

    /// CAN ID prefix and the data after it. `None` for messages too short to hold an ID.
    pub fn split_id(&self) -> Option<(u32, &[u8])> {
        let payload = self.payload();
        if payload.len() < CAN_ID_SIZE {
            return None;
        }
        let id = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Some((id, &payload[CAN_ID_SIZE..]))
    }

    pub fn is_transmitted(&self) -> bool {
        self.rx_status & (rx_status::TX_MSG_TYPE | rx_status::TX_DONE) != 0
    }

    pub fn is_first_frame(&self) -> bool {
        self.rx_status & rx_status::START_OF_MESSAGE != 0
    }

    fn identifier(&self, raw: u32) -> Identifier {
        if self.rx_status & rx_status::CAN_29BIT_ID != 0 {
            Identifier::Extended(raw)
        } else {
            Identifier::Standard(raw)
        }
    }

    /// Convert a received CAN message into a frame. Echoes are marked as loopback.
    pub fn to_frame(&self) -> Option<Frame> {
        let (id, data) = self.split_id()?;
        let mut frame = Frame::new(self.identifier(id), data).ok()?;
        frame.loopback = self.rx_status & rx_status::TX_MSG_TYPE != 0;
        Some(frame)
    }

    /// Payload of a complete inbound ISO15765 message from `dest_id`. Indications and other IDs yield `None`.
    pub fn isotp_payload(&self, dest_id: Identifier) -> Option<&[u8]> {
        if self.protocol_id != Protocol::Iso15765 as u32 || self.is_transmitted() || self.is_first_frame() {
            return None;
        }
        let (id, data) = self.split_id()?;
        if id != u32::from(dest_id) {
            return None;
        }
        Some(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_message_layout() {
        let msg = PassThruMsg::new(Protocol::Can, Identifier::Standard(0x7e0), &[0x02, 0x3e, 0x00]).unwrap();
        assert_eq!(msg.data_size, 7);
        assert_eq!(msg.payload(), &[0x00, 0x00, 0x07, 0xe0, 0x02, 0x3e, 0x00]);
        assert_eq!(msg.tx_flags, 0);

        let msg = PassThruMsg::new(Protocol::Can, Identifier::Extended(0x18da10f1), &[]).unwrap();
        assert_eq!(msg.tx_flags, tx_flags::CAN_29BIT_ID);
        assert!(PassThruMsg::new(Protocol::Can, Identifier::Standard(0x7e0), &[0; 9]).is_err());
    }

    #[test]
    fn isotp_size_limit() {
        let msg = PassThruMsg::new(Protocol::Iso15765, Identifier::Standard(0x7e0), &[0; 4095]).unwrap();
        assert_eq!(msg.tx_flags, tx_flags::ISO15765_FRAME_PAD);
        assert_eq!(
            PassThruMsg::new(Protocol::Iso15765, Identifier::Standard(0x7e0), &[0; 4121]).unwrap_err(),
            Error::MessageTooLarge(4125)
        );
    }

    #[test]
    fn isotp_indications_skipped() {
        let mut msg = PassThruMsg::new(Protocol::Iso15765, Identifier::Standard(0x7e8), &[0x50, 0x03]).unwrap();
        assert_eq!(msg.isotp_payload(Identifier::Standard(0x7e8)), Some(&[0x50, 0x03][..]));
        assert_eq!(msg.isotp_payload(Identifier::Standard(0x7e9)), None);

        msg.rx_status = rx_status::START_OF_MESSAGE;
        assert_eq!(msg.isotp_payload(Identifier::Standard(0x7e8)), None);

        msg.rx_status = rx_status::TX_DONE;
        assert_eq!(msg.isotp_payload(Identifier::Standard(0x7e8)), None);
    }

    #[test]
    fn received_frame() {
        let mut msg = PassThruMsg::new(Protocol::Can, Identifier::Extended(0x18daf110), &[1, 2]).unwrap();
        msg.rx_status = rx_status::CAN_29BIT_ID | rx_status::TX_MSG_TYPE;
        let frame = msg.to_frame().unwrap();
        assert_eq!(frame.id, Identifier::Extended(0x18daf110));
        assert_eq!(frame.data, vec![1, 2]);
        assert!(frame.loopback);
    }
}
