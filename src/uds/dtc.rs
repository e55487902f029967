//! Diagnostic Trouble Codes as reported by OBD-II services 0x03 (confirmed) and 0x07 (pending).

use std::fmt;

use tracing::warn;

use crate::uds::constants::ObdService;
use crate::uds::error::Error;

const SYSTEM_PREFIXES: [char; 4] = ['P', 'C', 'B', 'U'];

/// A 16 bit trouble code: 2 bits system (powertrain, chassis, body, network) and 14 bits of digits.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticCode(pub u16);

impl DiagnosticCode {
    pub fn raw(&self) -> u16 {
        self.0
    }

    /// One of `P`, `C`, `B` or `U`.
    pub fn system(&self) -> char {
        SYSTEM_PREFIXES[(self.0 >> 14) as usize]
    }
}

fn digit(value: u16) -> char {
    match value {
        0..=9 => (b'0' + value as u8) as char,
        10..=15 => (b'A' + (value - 10) as u8) as char,
        _ => '?',
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.system(),
            digit((self.0 >> 12) & 0x3),
            digit((self.0 >> 8) & 0xf),
            digit((self.0 >> 4) & 0xf),
            digit(self.0 & 0xf)
        )
    }
}

/// Which list of codes to read.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DtcKind {
    /// Service 0x03, stored/confirmed codes
    Confirmed,
    /// Service 0x07, codes detected during the current or last drive cycle
    Pending,
}

impl DtcKind {
    pub fn service(&self) -> ObdService {
        match self {
            DtcKind::Confirmed => ObdService::ShowStoredDtc,
            DtcKind::Pending => ObdService::ShowPendingDtc,
        }
    }
}

/// Where the code pairs start in the response payload (after the response identifier).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DtcLayout {
    /// ISO 15765-4 (CAN) layout: one count byte, then `count` code pairs.
    #[default]
    CountPrefixed,
    /// Legacy layout: code pairs start at the first byte, `0000` entries are padding.
    Raw,
}

/// Decode the payload of a service 0x03/0x07 response, with the response identifier already stripped.
pub fn decode_dtcs(payload: &[u8], layout: DtcLayout) -> Result<Vec<DiagnosticCode>, Error> {
    let codes = |data: &[u8]| -> Vec<DiagnosticCode> {
        data.chunks_exact(2)
            .map(|pair| DiagnosticCode(u16::from_be_bytes([pair[0], pair[1]])))
            .collect()
    };

    match layout {
        DtcLayout::CountPrefixed => {
            let (&count, data) = payload.split_first().ok_or(Error::InvalidResponseLength)?;
            let mut codes = codes(data);
            if codes.len() < count as usize {
                warn!("DTC count {} but only {} codes in response", count, codes.len());
            }
            codes.truncate(count as usize);
            Ok(codes)
        }
        DtcLayout::Raw => Ok(codes(payload).into_iter().filter(|code| code.0 != 0).collect()),
    }
}
