use std::time::Duration;

use crate::can::Identifier;
use crate::isotp::constants::{FlowStatus, FrameType};

const DEFAULT_TIMEOUT_MS: u64 = 1000;
const DEFAULT_MAX_WAIT_FRAMES: usize = 10;

/// Addressing and timing of one ISO-TP session. Replaced as a whole when the addressing changes.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IsoTPOptions {
    /// Transmit ID
    pub source_id: Identifier,
    /// Receive ID, frames with any other ID are ignored
    pub dest_id: Identifier,
    /// Max time to wait for each frame of a response
    pub timeout: Duration,
    /// Fill byte for frames shorter than 8 bytes, `None` sends frames unpadded
    pub padding: Option<u8>,
    /// Block size advertised in our Flow Control frames, 0 means no further Flow Control
    pub block_size: u8,
    /// Minimum separation time advertised in our Flow Control frames
    pub st_min: Duration,
    /// Number of consecutive FC(Wait) frames accepted before giving up
    pub max_wait_frames: usize,
}

impl IsoTPOptions {
    pub fn new(source_id: Identifier, dest_id: Identifier) -> Self {
        Self {
            source_id,
            dest_id,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            padding: Some(0x00),
            block_size: 0,
            st_min: Duration::ZERO,
            max_wait_frames: DEFAULT_MAX_WAIT_FRAMES,
        }
    }

    /// Options for the usual diagnostic addressing: responses come from `id + 8` for 11 bit IDs,
    /// and from the ID with the target and source address bytes swapped for 29 bit IDs.
    pub fn from_id(id: Identifier) -> Self {
        let dest_id = match id {
            Identifier::Standard(id) => Identifier::Standard(id + 8),
            Identifier::Extended(id) => {
                let bytes = id.to_be_bytes();
                Identifier::Extended(u32::from_be_bytes([bytes[0], bytes[1], bytes[3], bytes[2]]))
            }
        };
        Self::new(id, dest_id)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_padding(mut self, padding: Option<u8>) -> Self {
        self.padding = padding;
        self
    }
}

/// Parsed Flow Control frame.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FlowControlConfig {
    pub flow_status: FlowStatus,
    pub block_size: u8,
    pub separation_time_min: Duration,
}

impl FlowControlConfig {
    pub fn continue_to_send(block_size: u8, separation_time_min: Duration) -> Self {
        Self {
            flow_status: FlowStatus::ContinueToSend,
            block_size,
            separation_time_min,
        }
    }

    /// Encode as the three PCI bytes of a Flow Control frame.
    pub fn to_bytes(&self) -> [u8; 3] {
        [
            FrameType::FlowControl as u8 | self.flow_status as u8,
            self.block_size,
            encode_st_min(self.separation_time_min),
        ]
    }
}

impl TryFrom<&[u8]> for FlowControlConfig {
    type Error = crate::isotp::error::Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        if data.len() < 3 || FrameType::from(data[0]) != FrameType::FlowControl {
            return Err(crate::isotp::error::Error::MalformedFrame);
        }

        let flow_status = FlowStatus::from_repr(data[0] & 0x0f).ok_or(crate::isotp::error::Error::FlowControl)?;
        let block_size = data[1];

        let separation_time_min = data[2] as u64;
        let separation_time_min = match separation_time_min {
            0x0..=0x7f => Duration::from_millis(separation_time_min),
            0xf1..=0xf9 => Duration::from_micros((separation_time_min - 0xf0) * 100),
            // Reserved values shall be treated as the maximum STmin (ISO 15765-2)
            _ => Duration::from_millis(0x7f),
        };

        Ok(Self {
            flow_status,
            block_size,
            separation_time_min,
        })
    }
}

pub fn encode_st_min(st_min: Duration) -> u8 {
    let micros = st_min.as_micros();
    if micros > 0 && micros < 1000 {
        0xf0 + std::cmp::max(1, micros / 100) as u8
    } else {
        std::cmp::min(st_min.as_millis(), 0x7f) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rx_id() {
        let options = IsoTPOptions::from_id(Identifier::Standard(0x7e0));
        assert_eq!(options.dest_id, Identifier::Standard(0x7e8));

        let options = IsoTPOptions::from_id(Identifier::Extended(0x18da10f1));
        assert_eq!(options.dest_id, Identifier::Extended(0x18daf110));
    }

    #[test]
    fn flow_control_parse() {
        let fc = FlowControlConfig::try_from(&[0x30, 0x08, 0x14][..]).unwrap();
        assert_eq!(fc.flow_status, FlowStatus::ContinueToSend);
        assert_eq!(fc.block_size, 8);
        assert_eq!(fc.separation_time_min, Duration::from_millis(20));

        let fc = FlowControlConfig::try_from(&[0x31, 0x00, 0xf3][..]).unwrap();
        assert_eq!(fc.flow_status, FlowStatus::Wait);
        assert_eq!(fc.separation_time_min, Duration::from_micros(300));

        assert_eq!(
            FlowControlConfig::try_from(&[0x33, 0x00, 0x00][..]),
            Err(crate::isotp::error::Error::FlowControl)
        );
        assert_eq!(
            FlowControlConfig::try_from(&[0x30, 0x00][..]),
            Err(crate::isotp::error::Error::MalformedFrame)
        );
    }

    #[test]
    fn flow_control_encode() {
        let fc = FlowControlConfig::continue_to_send(0, Duration::ZERO);
        assert_eq!(fc.to_bytes(), [0x30, 0x00, 0x00]);

        let fc = FlowControlConfig::continue_to_send(4, Duration::from_micros(500));
        assert_eq!(fc.to_bytes(), [0x30, 0x04, 0xf5]);

        let fc = FlowControlConfig::continue_to_send(0, Duration::from_secs(1));
        assert_eq!(fc.to_bytes(), [0x30, 0x00, 0x7f]);
    }
}
