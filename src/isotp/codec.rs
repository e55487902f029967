//! Segmentation and reassembly of ISO-TP packets, independent of any CAN adapter.

use tracing::{debug, warn};

use crate::isotp::constants::{FrameType, CF_DL, FF_DL, MAX_PACKET_LEN, MAX_SF_DL};
use crate::isotp::error::Error;

const CAN_DL: usize = 8;

fn pad(buf: &mut Vec<u8>, padding: Option<u8>) {
    if let Some(padding) = padding {
        buf.resize(CAN_DL, padding);
    }
}

/// Split `data` into the CAN payloads of a Single Frame, or a First Frame followed by Consecutive Frames.
/// Frames are filled up to 8 bytes when `padding` is set.
pub fn segment(data: &[u8], padding: Option<u8>) -> Result<Vec<Vec<u8>>, Error> {
    if data.is_empty() {
        return Err(Error::EmptyPacket);
    }
    if data.len() > MAX_PACKET_LEN {
        return Err(Error::DataTooLarge(data.len()));
    }

    if data.len() <= MAX_SF_DL {
        let mut buf = vec![FrameType::Single as u8 | data.len() as u8];
        buf.extend(data);
        pad(&mut buf, padding);
        return Ok(vec![buf]);
    }

    let mut frames = Vec::with_capacity(1 + (data.len() - FF_DL).div_ceil(CF_DL));

    let b0: u8 = FrameType::First as u8 | ((data.len() >> 8) & 0xF) as u8;
    let b1: u8 = (data.len() & 0xFF) as u8;
    let mut buf = vec![b0, b1];
    buf.extend(&data[..FF_DL]);
    frames.push(buf);

    for (idx, chunk) in data[FF_DL..].chunks(CF_DL).enumerate() {
        let seq = ((idx + 1) & 0xF) as u8;
        let mut buf = vec![FrameType::Consecutive as u8 | seq];
        buf.extend(chunk);
        pad(&mut buf, padding);
        frames.push(buf);
    }

    Ok(frames)
}

/// Result of feeding one frame into the [`Reassembler`].
#[derive(Debug, PartialEq)]
pub enum Progress {
    /// The frame was malformed or too short and has been dropped.
    Ignored,
    /// The sender now waits for a Flow Control frame (after a First Frame, or after a full block).
    FlowControlRequired,
    /// Consecutive Frame accepted, more data is expected.
    InProgress,
    /// A full packet was received.
    Complete(Vec<u8>),
}

enum State {
    Idle,
    Receiving {
        len: usize,
        buf: Vec<u8>,
        next_seq: u8,
        block_count: u8,
    },
}

/// Receive state machine for one ISO-TP channel. Sequence errors are fatal for the packet: the state is reset and
/// the error returned, no resynchronization is attempted.
pub struct Reassembler {
    state: State,
    block_size: u8,
}

impl Reassembler {
    /// `block_size` is the value we advertise in our Flow Control frames, 0 for unlimited.
    pub fn new(block_size: u8) -> Self {
        Self {
            state: State::Idle,
            block_size,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    fn abort_in_progress(&mut self) {
        if let State::Receiving { len, buf, .. } = &self.state {
            warn!("Aborting reception after {}/{} bytes, new packet started", buf.len(), len);
        }
        self.state = State::Idle;
    }

    /// Feed the data bytes of one CAN frame.
    pub fn feed(&mut self, data: &[u8]) -> Result<Progress, Error> {
        if data.is_empty() {
            warn!("Dropping empty frame");
            return Ok(Progress::Ignored);
        }

        match FrameType::from(data[0]) {
            FrameType::Single => self.single_frame(data),
            FrameType::First => self.first_frame(data),
            FrameType::Consecutive => self.consecutive_frame(data),
            FrameType::FlowControl => {
                self.state = State::Idle;
                Err(Error::UnexpectedFrame("Flow Control"))
            }
            FrameType::Unknown => {
                self.state = State::Idle;
                Err(Error::UnknownFrameType)
            }
        }
    }

    fn single_frame(&mut self, data: &[u8]) -> Result<Progress, Error> {
        let len = (data[0] & 0xF) as usize;
        if len == 0 || len > data.len() - 1 {
            warn!("Dropping malformed SF {}", hex::encode(data));
            return Ok(Progress::Ignored);
        }

        debug!("RX SF, length: {} data {}", len, hex::encode(data));
        self.abort_in_progress();
        Ok(Progress::Complete(data[1..len + 1].to_vec()))
    }

    fn first_frame(&mut self, data: &[u8]) -> Result<Progress, Error> {
        if data.len() < CAN_DL {
            warn!("Dropping short FF {}", hex::encode(data));
            return Ok(Progress::Ignored);
        }

        let b0 = data[0] as u16;
        let b1 = data[1] as u16;
        let len = ((b0 << 8 | b1) & 0xFFF) as usize;
        if len <= MAX_SF_DL {
            warn!("Dropping FF with invalid length {}", len);
            return Ok(Progress::Ignored);
        }

        debug!("RX FF, length: {}, data {}", len, hex::encode(data));
        self.abort_in_progress();

        let mut buf = Vec::with_capacity(len);
        buf.extend(&data[2..2 + FF_DL]);
        self.state = State::Receiving {
            len,
            buf,
            next_seq: 1,
            block_count: 0,
        };
        Ok(Progress::FlowControlRequired)
    }

    fn consecutive_frame(&mut self, data: &[u8]) -> Result<Progress, Error> {
        let block_size = self.block_size;
        let State::Receiving {
            len,
            buf,
            next_seq,
            block_count,
        } = &mut self.state
        else {
            return Err(Error::UnexpectedFrame("Consecutive"));
        };

        let msg_idx = data[0] & 0xF;
        if msg_idx != *next_seq {
            let expected = *next_seq;
            self.state = State::Idle;
            return Err(Error::OutOfOrder {
                expected,
                actual: msg_idx,
            });
        }

        if data.len() < 2 {
            warn!("Dropping empty CF");
            return Ok(Progress::Ignored);
        }

        let remaining_len = *len - buf.len();
        let end_idx = std::cmp::min(remaining_len + 1, data.len());
        buf.extend(&data[1..end_idx]);
        debug!("RX CF, idx: {}, data {}", msg_idx, hex::encode(data));

        *next_seq = (*next_seq + 1) & 0xF;
        *block_count += 1;

        if buf.len() >= *len {
            let buf = std::mem::take(buf);
            self.state = State::Idle;
            return Ok(Progress::Complete(buf));
        }

        if block_size > 0 && *block_count == block_size {
            *block_count = 0;
            return Ok(Progress::FlowControlRequired);
        }

        Ok(Progress::InProgress)
    }
}
