//! Scripted [`IsoTpChannel`] for exercising the UDS layer without a CAN adapter.

use std::collections::VecDeque;

use crate::error::Error;
use crate::isotp::{IsoTPOptions, IsoTpChannel};
use crate::Result;

/// Returns queued responses in order. An empty queue is reported as [`Error::Timeout`].
pub struct MockIsoTp {
    options: IsoTPOptions,
    responses: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
}

impl MockIsoTp {
    pub fn new(options: IsoTPOptions) -> Self {
        Self {
            options,
            responses: VecDeque::new(),
            sent: Vec::new(),
        }
    }

    pub fn push_response(&mut self, response: &[u8]) {
        self.responses.push_back(response.to_vec());
    }

    /// Packets sent so far, in order.
    pub fn sent(&self) -> &[Vec<u8>] {
        &self.sent
    }

    /// Responses not consumed yet.
    pub fn pending(&self) -> usize {
        self.responses.len()
    }
}

impl IsoTpChannel for MockIsoTp {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.sent.push(data.to_vec());
        Ok(())
    }

    fn recv(&mut self) -> Result<Vec<u8>> {
        self.responses.pop_front().ok_or(Error::Timeout)
    }

    fn options(&self) -> &IsoTPOptions {
        &self.options
    }

    fn set_options(&mut self, options: IsoTPOptions) -> Result<()> {
        self.options = options;
        Ok(())
    }
}
