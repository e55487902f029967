#![allow(dead_code)]
//! Frame level ECU simulation shared by the integration tests.

use std::collections::VecDeque;

use ecu_link::can::mock::MockCanAdapter;
use ecu_link::can::{Frame, Identifier};
use ecu_link::isotp::{segment, FlowControlConfig, IsoTPAdapter, IsoTPOptions, Progress, Reassembler};

pub const TESTER_ID: u32 = 0x7e0;
pub const ECU_ID: u32 = 0x7e8;
const ECU_PADDING: u8 = 0xaa;

type Handler = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// Route `tracing` output of the crate into the test harness.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn tester_options() -> IsoTPOptions {
    IsoTPOptions::from_id(TESTER_ID.into())
}

/// Answers ISO-TP requests from the tester with the packets returned by a handler, including
/// flow control in both directions.
pub struct VirtualEcu {
    id: Identifier,
    tester: Identifier,
    reassembler: Reassembler,
    block_size: u8,
    /// FC(Wait) frames sent before every FC(CTS)
    wait_frames: usize,
    handler: Handler,
    /// Consecutive frames waiting for the tester's flow control
    outgoing: VecDeque<Vec<u8>>,
    queued: VecDeque<Vec<u8>>,
    pub requests: Vec<Vec<u8>>,
}

impl VirtualEcu {
    pub fn new(handler: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) -> Self {
        Self {
            id: ECU_ID.into(),
            tester: TESTER_ID.into(),
            reassembler: Reassembler::new(0),
            block_size: 0,
            wait_frames: 0,
            handler: Box::new(handler),
            outgoing: VecDeque::new(),
            queued: VecDeque::new(),
            requests: vec![],
        }
    }

    /// ECU that returns every request unchanged.
    pub fn echo() -> Self {
        Self::new(|request| vec![request.to_vec()])
    }

    pub fn with_block_size(mut self, block_size: u8) -> Self {
        self.block_size = block_size;
        self.reassembler = Reassembler::new(block_size);
        self
    }

    pub fn with_wait_frames(mut self, wait_frames: usize) -> Self {
        self.wait_frames = wait_frames;
        self
    }

    fn frame(&self, data: &[u8]) -> Frame {
        Frame::new(self.id, data).unwrap()
    }

    fn flow_control(&self) -> Vec<Frame> {
        let mut frames: Vec<Frame> = (0..self.wait_frames)
            .map(|_| self.frame(&[0x31, 0x00, 0x00]))
            .collect();
        let cts = FlowControlConfig::continue_to_send(self.block_size, std::time::Duration::ZERO);
        frames.push(self.frame(&cts.to_bytes()));
        frames
    }

    /// Start transmitting the next queued response. Multi frame responses stop after the first frame.
    fn transmit_next(&mut self) -> Vec<Frame> {
        let mut frames = vec![];
        while let Some(packet) = self.queued.pop_front() {
            let mut segments: VecDeque<Vec<u8>> = segment(&packet, Some(ECU_PADDING)).unwrap().into();
            let first = segments.pop_front().unwrap();
            frames.push(self.frame(&first));

            if !segments.is_empty() {
                self.outgoing = segments;
                break;
            }
        }
        frames
    }

    /// Process one frame sent by the tester and return the frames the ECU sends in reaction.
    pub fn on_frame(&mut self, frame: &Frame) -> Vec<Frame> {
        if frame.id != self.tester || frame.data.is_empty() {
            return vec![];
        }

        // Flow control for our multi frame response
        if frame.data[0] >> 4 == 0x3 {
            let fc = FlowControlConfig::try_from(frame.data.as_slice()).unwrap();
            let count = match fc.block_size {
                0 => self.outgoing.len(),
                bs => bs as usize,
            };

            let mut frames = vec![];
            for _ in 0..count {
                match self.outgoing.pop_front() {
                    Some(cf) => frames.push(self.frame(&cf)),
                    None => break,
                }
            }
            if self.outgoing.is_empty() {
                frames.extend(self.transmit_next());
            }
            return frames;
        }

        match self.reassembler.feed(&frame.data).unwrap() {
            Progress::FlowControlRequired => self.flow_control(),
            Progress::Complete(request) => {
                self.requests.push(request.clone());
                let responses = (self.handler)(&request);
                self.queued.extend(responses);
                self.transmit_next()
            }
            Progress::Ignored | Progress::InProgress => vec![],
        }
    }

    /// CAN adapter whose bus is answered by this ECU.
    pub fn into_adapter(mut self) -> MockCanAdapter {
        init_logging();
        MockCanAdapter::with_responder(move |frame| self.on_frame(frame))
    }

    /// Tester side ISO-TP adapter talking to this ECU.
    pub fn connect(self) -> IsoTPAdapter<MockCanAdapter> {
        IsoTPAdapter::new(self.into_adapter(), tester_options())
    }
}
