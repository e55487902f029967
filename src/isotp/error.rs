//! Error types for the ISO-TP protocol.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Clone)]
pub enum Error {
    #[error("Empty Packet")]
    EmptyPacket,
    #[error("Data Too Large: {0} bytes")]
    DataTooLarge(usize),
    #[error("Flow Control")]
    FlowControl,
    #[error("Flow Control Overflow")]
    Overflow,
    #[error("Flow Control Wait Limit Exceeded")]
    FlowControlWaitExceeded,
    #[error("Out Of Order: expected sequence {expected}, got {actual}")]
    OutOfOrder { expected: u8, actual: u8 },
    #[error("Unexpected {0} Frame")]
    UnexpectedFrame(&'static str),
    #[error("Unknown Frame Type")]
    UnknownFrameType,
    #[error("Malformed Frame")]
    MalformedFrame,
}
