//! Error types for J2534 pass-through devices

use thiserror::Error;

/// Status codes returned by the PassThru API (SAE J2534-1 v04.04).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StatusCode {
    NotSupported,
    InvalidChannelId,
    InvalidProtocolId,
    NullParameter,
    InvalidIoctlValue,
    InvalidFlags,
    Failed,
    DeviceNotConnected,
    Timeout,
    InvalidMsg,
    InvalidTimeInterval,
    ExceededLimit,
    InvalidMsgId,
    DeviceInUse,
    InvalidIoctlId,
    BufferEmpty,
    BufferFull,
    BufferOverflow,
    PinInvalid,
    ChannelInUse,
    MsgProtocolId,
    InvalidFilterId,
    NoFlowControl,
    NotUnique,
    InvalidBaudrate,
    InvalidDeviceId,
    Unknown(i32),
}

impl From<i32> for StatusCode {
    fn from(code: i32) -> StatusCode {
        match code {
            0x01 => StatusCode::NotSupported,
            0x02 => StatusCode::InvalidChannelId,
            0x03 => StatusCode::InvalidProtocolId,
            0x04 => StatusCode::NullParameter,
            0x05 => StatusCode::InvalidIoctlValue,
            0x06 => StatusCode::InvalidFlags,
            0x07 => StatusCode::Failed,
            0x08 => StatusCode::DeviceNotConnected,
            0x09 => StatusCode::Timeout,
            0x0a => StatusCode::InvalidMsg,
            0x0b => StatusCode::InvalidTimeInterval,
            0x0c => StatusCode::ExceededLimit,
            0x0d => StatusCode::InvalidMsgId,
            0x0e => StatusCode::DeviceInUse,
            0x0f => StatusCode::InvalidIoctlId,
            0x10 => StatusCode::BufferEmpty,
            0x11 => StatusCode::BufferFull,
            0x12 => StatusCode::BufferOverflow,
            0x13 => StatusCode::PinInvalid,
            0x14 => StatusCode::ChannelInUse,
            0x15 => StatusCode::MsgProtocolId,
            0x16 => StatusCode::InvalidFilterId,
            0x17 => StatusCode::NoFlowControl,
            0x18 => StatusCode::NotUnique,
            0x19 => StatusCode::InvalidBaudrate,
            0x1a => StatusCode::InvalidDeviceId,
            _ => StatusCode::Unknown(code),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A PassThru call failed. `message` is the driver's PassThruGetLastError text.
    #[error("J2534 {code:?}: {message}")]
    Status { code: StatusCode, message: String },
    #[error("Failed to load J2534 library: {0}")]
    LoadFailed(String),
    #[error("J2534 library does not export {0}")]
    MissingSymbol(&'static str),
    #[error("Message of {0} bytes exceeds the pass-through limit")]
    MessageTooLarge(usize),
}

impl Error {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}
