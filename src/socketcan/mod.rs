//! This module provides a [`CanAdapter`] implementation for Linux SocketCAN interfaces.
use std::time::Duration;

use libc::{can_filter, CAN_EFF_FLAG, CAN_EFF_MASK, CAN_RTR_FLAG, CAN_SFF_MASK};
use tracing::{debug, info};

use crate::can::{BackgroundReceiver, CanAdapter, Frame, FrameSource, Identifier};
use crate::Result;

mod frame;
mod socket;

pub use socket::CanSocket;

/// Read timeout of the receive thread, bounds how long `close` waits for it.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Kernel acceptance filter: a frame is received if `received_id & mask == id & mask`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CanFilter {
    pub id: Identifier,
    pub mask: u32,
}

impl CanFilter {
    /// Match exactly one identifier, data frames only.
    pub fn exact(id: Identifier) -> Self {
        let mask = match id {
            Identifier::Standard(_) => CAN_SFF_MASK,
            Identifier::Extended(_) => CAN_EFF_MASK,
        };
        Self {
            id,
            mask: mask | CAN_EFF_FLAG | CAN_RTR_FLAG,
        }
    }

    fn to_raw(self) -> can_filter {
        can_filter {
            can_id: frame::id_to_canid_t(self.id),
            can_mask: self.mask,
        }
    }
}

struct SocketReader(CanSocket);

impl FrameSource for SocketReader {
    fn read_frame(&mut self) -> Result<Option<Frame>> {
        self.0.read_frame()
    }
}

/// Adapter for a raw SocketCAN socket. Frames are drained by a background thread into a bounded queue.
pub struct SocketCan {
    socket: CanSocket,
    receiver: BackgroundReceiver,
}

impl SocketCan {
    /// Open `interface` (e.g. `can0`, `vcan0`). Returns [`crate::Error::NotFound`] if it does not exist.
    pub fn open(interface: &str) -> Result<Self> {
        let socket = CanSocket::open(interface)?;
        socket.set_loopback(true)?;
        socket.set_read_timeout(POLL_INTERVAL)?;

        let reader = SocketReader(socket.try_clone()?);
        let receiver = BackgroundReceiver::new(reader)?;

        info!("Connected to SocketCAN interface {}", interface);
        Ok(Self { socket, receiver })
    }

    /// Only receive frames matching one of `filters`.
    pub fn set_filters(&self, filters: &[CanFilter]) -> Result<()> {
        let raw: Vec<can_filter> = filters.iter().map(|f| f.to_raw()).collect();
        self.socket.set_filters(&raw)
    }

    /// Stop the receive thread. Blocked and later `recv` calls fail with [`crate::Error::Closed`].
    pub fn close(&self) {
        self.receiver.close();
    }
}

impl CanAdapter for SocketCan {
    fn send(&mut self, frame: &Frame) -> Result<()> {
        debug!("TX {:?}", frame);
        self.socket.write_frame(frame)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        let frame = self.receiver.recv(timeout)?;
        if let Some(frame) = &frame {
            debug!("RX {:?}", frame);
        }
        Ok(frame)
    }

    fn set_filter(&mut self, id: Identifier) -> Result<()> {
        self.set_filters(&[CanFilter::exact(id)])
    }
}
