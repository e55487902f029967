use strum_macros::FromRepr;

/// Largest packet classic ISO-TP can describe with the 12 bit First Frame length.
pub const MAX_PACKET_LEN: usize = 0xfff;
/// Payload carried by a Single Frame with normal addressing.
pub const MAX_SF_DL: usize = 7;
/// Payload carried by a First Frame.
pub const FF_DL: usize = 6;
/// Payload carried by a Consecutive Frame.
pub const CF_DL: usize = 7;

pub static FRAME_TYPE_MASK: u8 = 0xf0;

#[derive(Debug, PartialEq, Copy, Clone)]
#[repr(u8)]
pub enum FrameType {
    Single = 0x00,
    First = 0x10,
    Consecutive = 0x20,
    FlowControl = 0x30,
    Unknown = 0xff,
}

impl From<u8> for FrameType {
    fn from(val: u8) -> FrameType {
        match val & FRAME_TYPE_MASK {
            0x00 => FrameType::Single,
            0x10 => FrameType::First,
            0x20 => FrameType::Consecutive,
            0x30 => FrameType::FlowControl,
            _ => FrameType::Unknown,
        }
    }
}

/// Flow status nibble of a Flow Control frame.
#[derive(Debug, PartialEq, Copy, Clone, FromRepr)]
#[repr(u8)]
pub enum FlowStatus {
    ContinueToSend = 0x0,
    Wait = 0x1,
    Overflow = 0x2,
}
