//! Low Level SocketCAN code
//! Code based on https://github.com/socketcan-rs/socketcan-rs
use std::ffi::CString;
use std::io::{ErrorKind, Read};
use std::os::fd::AsRawFd;
use std::time::Duration;

use libc::{
    c_int, c_void, can_filter, can_frame, sa_family_t, sockaddr, sockaddr_can, socklen_t, AF_CAN, CAN_RAW,
    CAN_RAW_FILTER, CAN_RAW_LOOPBACK, SOL_CAN_RAW,
};
use tracing::warn;

use crate::can::Frame;
use crate::error::{write_exact, Error};
use crate::socketcan::frame::can_frame_default;
use crate::Result;

/// Attempts made when the kernel TX queue is full (ENOBUFS).
const TX_RETRIES: usize = 100;
const TX_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Raw classic CAN socket bound to one interface.
pub struct CanSocket(socket2::Socket);

fn as_bytes<T: Sized>(val: &T) -> &[u8] {
    let sz = std::mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts::<'_, u8>(val as *const _ as *const u8, sz) }
}

fn as_bytes_mut<T: Sized>(val: &mut T) -> &mut [u8] {
    let sz = std::mem::size_of::<T>();
    unsafe { std::slice::from_raw_parts_mut(val as *mut _ as *mut u8, sz) }
}

fn if_nametoindex(ifname: &str) -> Result<c_int> {
    let name = CString::new(ifname).map_err(|_| Error::NotFound)?;
    match unsafe { libc::if_nametoindex(name.as_ptr()) } {
        0 => Err(Error::NotFound),
        idx => Ok(idx as c_int),
    }
}

impl CanSocket {
    pub fn open(ifname: &str) -> Result<Self> {
        let mut addr: sockaddr_can = unsafe { std::mem::zeroed() };
        addr.can_family = AF_CAN as sa_family_t;
        addr.can_ifindex = if_nametoindex(ifname)?;

        let af_can = socket2::Domain::from(AF_CAN);
        let can_raw = socket2::Protocol::from(CAN_RAW);
        let sock = socket2::Socket::new_raw(af_can, socket2::Type::RAW, Some(can_raw))?;

        let ret = unsafe {
            libc::bind(
                sock.as_raw_fd(),
                &addr as *const sockaddr_can as *const sockaddr,
                std::mem::size_of::<sockaddr_can>() as socklen_t,
            )
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        Ok(Self(sock))
    }

    /// Second handle to the same socket, used by the receive thread.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self(self.0.try_clone()?))
    }

    pub fn set_loopback(&self, enabled: bool) -> Result<()> {
        let loopback = c_int::from(enabled);
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_LOOPBACK, as_bytes(&loopback))
    }

    /// Bound the time a read may block, so a reader thread can notice shutdown.
    pub fn set_read_timeout(&self, timeout: Duration) -> Result<()> {
        Ok(self.0.set_read_timeout(Some(timeout))?)
    }

    /// Replace the kernel acceptance filters. An empty list receives nothing.
    pub fn set_filters(&self, filters: &[can_filter]) -> Result<()> {
        let bytes = unsafe {
            std::slice::from_raw_parts(filters.as_ptr() as *const u8, std::mem::size_of_val(filters))
        };
        self.set_socket_option(SOL_CAN_RAW, CAN_RAW_FILTER, bytes)
    }

    /// Read one frame. `Ok(None)` if the read timeout expired or a frame was not a data frame.
    pub fn read_frame(&self) -> Result<Option<Frame>> {
        let mut raw: can_frame = can_frame_default();
        let expected = std::mem::size_of::<can_frame>();

        let n = match (&self.0).read(as_bytes_mut(&mut raw)) {
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };

        if n == 0 {
            return Err(Error::Disconnected);
        }
        if n != expected {
            warn!("Ignoring {} byte read from CAN socket", n);
            return Ok(None);
        }

        match Frame::try_from(&raw) {
            Ok(frame) => Ok(Some(frame)),
            Err(_) => {
                warn!("Ignoring non-data frame 0x{:08x}", raw.can_id);
                Ok(None)
            }
        }
    }

    /// Write one frame, retrying while the TX queue is full.
    pub fn write_frame(&self, frame: &Frame) -> Result<()> {
        let raw = can_frame::from(frame);
        let mut retries = 0;

        loop {
            match write_exact(&mut &self.0, as_bytes(&raw)) {
                Err(Error::Io(e)) if e.raw_os_error() == Some(libc::ENOBUFS) && retries < TX_RETRIES => {
                    retries += 1;
                    std::thread::sleep(TX_RETRY_DELAY);
                }
                result => return result,
            }
        }
    }

    fn set_socket_option(&self, level: c_int, name: c_int, val: &[u8]) -> Result<()> {
        let ret = unsafe {
            libc::setsockopt(
                self.0.as_raw_fd(),
                level,
                name,
                val.as_ptr() as *const c_void,
                val.len() as socklen_t,
            )
        };

        match ret {
            0 => Ok(()),
            _ => Err(std::io::Error::last_os_error().into()),
        }
    }
}
