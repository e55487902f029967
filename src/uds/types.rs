//! Types used in the UDS protocol.
use std::time::Duration;

use crate::uds::constants::{NEGATIVE_RESPONSE, POSITIVE_RESPONSE};
use crate::uds::error::{Error, NegativeResponseCode};

const DEFAULT_MAX_RESPONSE_PENDING: usize = 32;
const DEFAULT_RESPONSE_PENDING_TIMEOUT_MS: u64 = 30_000;

/// Limits applied by [`crate::uds::UDSClient`] to every request.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UDSOptions {
    /// Number of "response pending" answers accepted for one request
    pub max_response_pending: usize,
    /// Total time a request may stay in the "response pending" state
    pub response_pending_timeout: Duration,
}

impl Default for UDSOptions {
    fn default() -> Self {
        Self {
            max_response_pending: DEFAULT_MAX_RESPONSE_PENDING,
            response_pending_timeout: Duration::from_millis(DEFAULT_RESPONSE_PENDING_TIMEOUT_MS),
        }
    }
}

/// A decoded response packet: the response identifier followed by the payload.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UDSResponse {
    pub id: u8,
    pub data: Vec<u8>,
}

impl UDSResponse {
    pub fn is_negative(&self) -> bool {
        self.id == NEGATIVE_RESPONSE
    }

    /// True if this is the positive response to `sid`.
    pub fn is_positive_for(&self, sid: u8) -> bool {
        self.id == sid.wrapping_add(POSITIVE_RESPONSE)
    }

    /// Service the ECU rejected, for negative responses. Layout per ISO 14229: `[0x7f, sid, nrc]`.
    pub fn rejected_service(&self) -> Option<u8> {
        if !self.is_negative() {
            return None;
        }
        self.data.first().copied()
    }

    pub fn negative_response_code(&self) -> Option<NegativeResponseCode> {
        if !self.is_negative() {
            return None;
        }
        self.data.get(1).map(|&code| code.into())
    }
}

impl TryFrom<&[u8]> for UDSResponse {
    type Error = Error;

    fn try_from(packet: &[u8]) -> Result<Self, Self::Error> {
        let (&id, data) = packet.split_first().ok_or(Error::EmptyResponse)?;
        if id == NEGATIVE_RESPONSE && data.len() < 2 {
            return Err(Error::InvalidResponseLength);
        }
        Ok(Self {
            id,
            data: data.to_vec(),
        })
    }
}

/// Struct returned by DiagnosticSessionControl (0x10)
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionParameterRecord {
    /// Performance requirement for the server (i.e. the ECU) to start with th response message after the reception of a request message.
    pub p2_server_max: Duration,
    /// Performance requirement for the server (i.e. the ECU) to start with the response message after the transmission of a "ResponsePending" message.
    pub p2_star_server_max: Duration,
}

impl SessionParameterRecord {
    /// Parse the 4 byte record, `None` if the ECU sent something else.
    pub fn parse(record: &[u8]) -> Option<Self> {
        if record.len() != 4 {
            return None;
        }

        let p2_server_max = u16::from_be_bytes([record[0], record[1]]);
        let p2_star_server_max = u16::from_be_bytes([record[2], record[3]]);
        Some(Self {
            p2_server_max: Duration::from_millis(p2_server_max as u64),
            p2_star_server_max: Duration::from_millis(p2_star_server_max as u64 * 10),
        })
    }
}
