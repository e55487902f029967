//! Logging proxy for any [`CanAdapter`]. Every frame passing through is appended to a shared [`CanLog`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::can::{CanAdapter, Frame, Identifier};
use crate::Result;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub direction: Direction,
    pub frame: Frame,
    pub timestamp: Instant,
}

/// Append-only frame log. Cloning yields another handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct CanLog {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl CanLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, direction: Direction, frame: &Frame) {
        self.entries.lock().push(LogEntry {
            direction,
            frame: frame.clone(),
            timestamp: Instant::now(),
        });
    }

    /// Snapshot of all entries logged so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Forwards all calls to the wrapped adapter unchanged, recording successful sends and receives.
pub struct LoggingCanAdapter<C: CanAdapter> {
    adapter: C,
    log: CanLog,
}

impl<C: CanAdapter> LoggingCanAdapter<C> {
    pub fn new(adapter: C, log: CanLog) -> Self {
        Self { adapter, log }
    }

    pub fn log(&self) -> &CanLog {
        &self.log
    }

    pub fn into_inner(self) -> C {
        self.adapter
    }
}

impl<C: CanAdapter> CanAdapter for LoggingCanAdapter<C> {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        self.adapter.send(frame)?;
        debug!("TX {:?} {}", frame.id, hex::encode(&frame.data));
        self.log.append(Direction::Tx, frame);
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let frame = self.adapter.recv(timeout)?;
        if let Some(frame) = &frame {
            debug!("RX {:?} {}", frame.id, hex::encode(&frame.data));
            self.log.append(Direction::Rx, frame);
        }
        Ok(frame)
    }

    fn set_filter(&mut self, id: Identifier) -> Result<()> {
        self.adapter.set_filter(id)
    }
}
