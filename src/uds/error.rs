use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum NegativeResponseCode {
    GeneralReject = 0x10,
    ServiceNotSupported = 0x11,
    SubFunctionNotSupported = 0x12,
    IncorrectMessageLengthOrInvalidFormat = 0x13,
    ResponseTooLong = 0x14,
    BusyRepeatRequest = 0x21,
    ConditionsNotCorrect = 0x22,
    RequestSequenceError = 0x24,
    NoResponseFromSubnetComponent = 0x25,
    FailurePreventsExecutionOfRequestedAction = 0x26,
    RequestOutOfRange = 0x31,
    SecurityAccessDenied = 0x33,
    InvalidKey = 0x35,
    ExceedNumberOfAttempts = 0x36,
    RequiredTimeDelayNotExpired = 0x37,
    UploadDownloadNotAccepted = 0x70,
    TransferDataSuspended = 0x71,
    GeneralProgrammingFailure = 0x72,
    WrongBlockSequenceCounter = 0x73,
    RequestCorrectlyReceivedResponsePending = 0x78,
    SubFunctionNotSupportedInActiveSession = 0x7e,
    ServiceNotSupportedInActiveSession = 0x7f,

    NonStandard(u8),
}

impl NegativeResponseCode {
    /// Raw code as sent on the wire.
    pub fn code(&self) -> u8 {
        match self {
            NegativeResponseCode::GeneralReject => 0x10,
            NegativeResponseCode::ServiceNotSupported => 0x11,
            NegativeResponseCode::SubFunctionNotSupported => 0x12,
            NegativeResponseCode::IncorrectMessageLengthOrInvalidFormat => 0x13,
            NegativeResponseCode::ResponseTooLong => 0x14,
            NegativeResponseCode::BusyRepeatRequest => 0x21,
            NegativeResponseCode::ConditionsNotCorrect => 0x22,
            NegativeResponseCode::RequestSequenceError => 0x24,
            NegativeResponseCode::NoResponseFromSubnetComponent => 0x25,
            NegativeResponseCode::FailurePreventsExecutionOfRequestedAction => 0x26,
            NegativeResponseCode::RequestOutOfRange => 0x31,
            NegativeResponseCode::SecurityAccessDenied => 0x33,
            NegativeResponseCode::InvalidKey => 0x35,
            NegativeResponseCode::ExceedNumberOfAttempts => 0x36,
            NegativeResponseCode::RequiredTimeDelayNotExpired => 0x37,
            NegativeResponseCode::UploadDownloadNotAccepted => 0x70,
            NegativeResponseCode::TransferDataSuspended => 0x71,
            NegativeResponseCode::GeneralProgrammingFailure => 0x72,
            NegativeResponseCode::WrongBlockSequenceCounter => 0x73,
            NegativeResponseCode::RequestCorrectlyReceivedResponsePending => 0x78,
            NegativeResponseCode::SubFunctionNotSupportedInActiveSession => 0x7e,
            NegativeResponseCode::ServiceNotSupportedInActiveSession => 0x7f,
            NegativeResponseCode::NonStandard(code) => *code,
        }
    }

    /// Human readable meaning of the code.
    pub fn description(&self) -> &'static str {
        match self {
            NegativeResponseCode::GeneralReject => "general reject",
            NegativeResponseCode::ServiceNotSupported => "service not supported",
            NegativeResponseCode::SubFunctionNotSupported => "sub-function not supported",
            NegativeResponseCode::IncorrectMessageLengthOrInvalidFormat => {
                "incorrect message length or invalid format"
            }
            NegativeResponseCode::ResponseTooLong => "response too long",
            NegativeResponseCode::BusyRepeatRequest => "busy, repeat request",
            NegativeResponseCode::ConditionsNotCorrect => "conditions not correct",
            NegativeResponseCode::RequestSequenceError => "request sequence error",
            NegativeResponseCode::NoResponseFromSubnetComponent => "no response from subnet component",
            NegativeResponseCode::FailurePreventsExecutionOfRequestedAction => {
                "failure prevents execution of requested action"
            }
            NegativeResponseCode::RequestOutOfRange => "request out of range",
            NegativeResponseCode::SecurityAccessDenied => "security access denied",
            NegativeResponseCode::InvalidKey => "invalid key",
            NegativeResponseCode::ExceedNumberOfAttempts => "exceeded number of attempts",
            NegativeResponseCode::RequiredTimeDelayNotExpired => "required time delay not expired",
            NegativeResponseCode::UploadDownloadNotAccepted => "upload/download not accepted",
            NegativeResponseCode::TransferDataSuspended => "transfer data suspended",
            NegativeResponseCode::GeneralProgrammingFailure => "general programming failure",
            NegativeResponseCode::WrongBlockSequenceCounter => "wrong block sequence counter",
            NegativeResponseCode::RequestCorrectlyReceivedResponsePending => {
                "request correctly received, response pending"
            }
            NegativeResponseCode::SubFunctionNotSupportedInActiveSession => {
                "sub-function not supported in active session"
            }
            NegativeResponseCode::ServiceNotSupportedInActiveSession => {
                "service not supported in active session"
            }
            NegativeResponseCode::NonStandard(_) => "vendor specific",
        }
    }
}

impl From<u8> for NegativeResponseCode {
    fn from(val: u8) -> NegativeResponseCode {
        match val {
            0x10 => NegativeResponseCode::GeneralReject,
            0x11 => NegativeResponseCode::ServiceNotSupported,
            0x12 => NegativeResponseCode::SubFunctionNotSupported,
            0x13 => NegativeResponseCode::IncorrectMessageLengthOrInvalidFormat,
            0x14 => NegativeResponseCode::ResponseTooLong,
            0x21 => NegativeResponseCode::BusyRepeatRequest,
            0x22 => NegativeResponseCode::ConditionsNotCorrect,
            0x24 => NegativeResponseCode::RequestSequenceError,
            0x25 => NegativeResponseCode::NoResponseFromSubnetComponent,
            0x26 => NegativeResponseCode::FailurePreventsExecutionOfRequestedAction,
            0x31 => NegativeResponseCode::RequestOutOfRange,
            0x33 => NegativeResponseCode::SecurityAccessDenied,
            0x35 => NegativeResponseCode::InvalidKey,
            0x36 => NegativeResponseCode::ExceedNumberOfAttempts,
            0x37 => NegativeResponseCode::RequiredTimeDelayNotExpired,
            0x70 => NegativeResponseCode::UploadDownloadNotAccepted,
            0x71 => NegativeResponseCode::TransferDataSuspended,
            0x72 => NegativeResponseCode::GeneralProgrammingFailure,
            0x73 => NegativeResponseCode::WrongBlockSequenceCounter,
            0x78 => NegativeResponseCode::RequestCorrectlyReceivedResponsePending,
            0x7e => NegativeResponseCode::SubFunctionNotSupportedInActiveSession,
            0x7f => NegativeResponseCode::ServiceNotSupportedInActiveSession,
            _ => NegativeResponseCode::NonStandard(val),
        }
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "0x{:02x} ({})", self.code(), self.description())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Error {
    EmptyResponse,
    /// The response identifier is neither the positive response for the request nor a negative response.
    InvalidServiceId(u8),
    InvalidSubFunction(u8),
    SessionTypeMismatch { expected: u8, actual: u8 },
    InvalidResponseLength,
    InvalidBlockSequenceCounter(u8),
    NegativeResponse { service: u8, code: NegativeResponseCode },
    /// The ECU kept answering "response pending" past the configured ceiling.
    ResponsePendingExceeded(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::EmptyResponse => write!(fmt, "Empty Response"),
            Error::InvalidServiceId(id) => write!(fmt, "Invalid Response Service ID: 0x{:02x}", id),
            Error::InvalidSubFunction(id) => {
                write!(fmt, "Invalid Response Sub Function ID: 0x{:02x}", id)
            }
            Error::SessionTypeMismatch { expected, actual } => write!(
                fmt,
                "Session Type Mismatch: requested 0x{:02x}, got 0x{:02x}",
                expected, actual
            ),
            Error::InvalidResponseLength => write!(fmt, "Invalid Response Length"),
            Error::InvalidBlockSequenceCounter(counter) => {
                write!(fmt, "Invalid Block Sequence Counter: {}", counter)
            }
            Error::NegativeResponse { service, code } => {
                write!(fmt, "Negative Response to 0x{:02x}: {}", service, code)
            }
            Error::ResponsePendingExceeded(count) => {
                write!(fmt, "Response Pending Exceeded after {} responses", count)
            }
        }
    }
}
impl std::error::Error for Error {}
