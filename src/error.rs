//! Contains the main error type for the library.
use thiserror::Error;

/// The main error type for the library. Each module has it's own error type that is contained by this error.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not Found")]
    NotFound,
    #[error("Malformed Frame")]
    MalformedFrame,
    #[error("Timeout")]
    Timeout,
    /// The underlying medium reported end-of-stream (zero byte read). Fatal for the transport instance.
    #[error("Disconnected")]
    Disconnected,
    /// The transport was shut down, possibly while a call was blocked on it.
    #[error("Transport Closed")]
    Closed,
    /// A write accepted fewer bytes than requested.
    #[error("Partial Write: wrote {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },
    /// A long running operation was stopped through its cancel flag.
    #[error("Cancelled")]
    Cancelled,
    /// The requested operation is not supported by the selected interface.
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    IsoTPError(#[from] crate::isotp::error::Error),
    #[error(transparent)]
    UDSError(#[from] crate::uds::Error),
    #[cfg(feature = "j2534")]
    #[error(transparent)]
    J2534Error(#[from] crate::j2534::Error),
    #[cfg(feature = "elm327")]
    #[error(transparent)]
    Elm327Error(#[from] crate::elm327::Error),
}

impl Error {
    /// True for errors caused by the absence of an expected frame or response, as opposed to hard failures.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Returns the negative response code if this error wraps a negative UDS response.
    pub fn negative_response_code(&self) -> Option<crate::uds::NegativeResponseCode> {
        match self {
            Error::UDSError(crate::uds::Error::NegativeResponse { code, .. }) => Some(*code),
            _ => None,
        }
    }
}

/// Writes the complete buffer with a single write call. Anything short of the full length is a protocol failure.
pub(crate) fn write_exact<W: std::io::Write + ?Sized>(writer: &mut W, buf: &[u8]) -> Result<(), Error> {
    let written = writer.write(buf)?;
    if written == 0 && !buf.is_empty() {
        return Err(Error::Disconnected);
    }
    if written != buf.len() {
        return Err(Error::PartialWrite {
            written,
            expected: buf.len(),
        });
    }
    Ok(())
}
