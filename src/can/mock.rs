//! In-memory [`CanAdapter`] for tests. Frames can be queued up front, or produced by a responder
//! closure that plays the part of the ECU.

use std::collections::VecDeque;
use std::time::Duration;

use crate::can::{CanAdapter, Frame, Identifier};
use crate::Result;

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame> + Send>;

/// Scripted CAN adapter. An empty receive queue is reported as an elapsed timeout without sleeping.
/// Once a filter is set, queued frames with other identifiers are discarded on reception.
#[derive(Default)]
pub struct MockCanAdapter {
    rx: VecDeque<Frame>,
    sent: Vec<Frame>,
    responder: Option<Responder>,
    filter: Option<Identifier>,
}

impl MockCanAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every sent frame is passed to `responder`, and the frames it returns are queued for reception.
    pub fn with_responder(responder: impl FnMut(&Frame) -> Vec<Frame> + Send + 'static) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    pub fn push_rx(&mut self, frame: Frame) {
        self.rx.push_back(frame);
    }

    /// Frames sent so far, in order.
    pub fn sent(&self) -> Vec<Frame> {
        self.sent.clone()
    }

    /// Identifier passed to the last [`CanAdapter::set_filter`] call.
    pub fn filter(&self) -> Option<Identifier> {
        self.filter
    }

    /// Frames still waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl CanAdapter for MockCanAdapter {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        self.sent.push(frame.clone());
        if let Some(responder) = self.responder.as_mut() {
            self.rx.extend(responder(frame));
        }
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> Result<Option<Frame>> {
        while let Some(frame) = self.rx.pop_front() {
            match self.filter {
                Some(id) if frame.id != id => continue,
                _ => return Ok(Some(frame)),
            }
        }
        Ok(None)
    }

    fn set_filter(&mut self, id: Identifier) -> Result<()> {
        self.filter = Some(id);
        Ok(())
    }
}
