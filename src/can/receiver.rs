//! Background receive thread feeding a bounded frame queue.
//!
//! Used by transports whose medium only offers an OS-level blocking read (SocketCAN). The thread drains
//! the medium continuously so frames arriving between two [`BackgroundReceiver::recv`] calls are not lost.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::can::Frame;
use crate::error::Error;
use crate::Result;

/// Default number of frames buffered before the oldest frame is dropped.
pub const RX_QUEUE_SIZE: usize = 1024;

/// A medium the background thread can poll. Implementations must not block longer than a short poll
/// interval so the thread can notice a shutdown request.
pub trait FrameSource: Send + 'static {
    /// Returns `Ok(None)` when no frame arrived within the poll interval.
    fn read_frame(&mut self) -> Result<Option<Frame>>;
}

struct State {
    queue: VecDeque<Frame>,
    /// Fatal error raised by the background thread, handed to the next `recv` call.
    error: Option<Error>,
    /// Set once the thread has terminated, either due to `close` or a fatal error.
    stopped: bool,
    closed: bool,
}

struct Shared {
    state: Mutex<State>,
    available: Condvar,
    capacity: usize,
}

fn process<S: FrameSource>(mut source: S, shared: Arc<Shared>) {
    loop {
        if shared.state.lock().closed {
            break;
        }

        match source.read_frame() {
            Ok(Some(frame)) => {
                let mut state = shared.state.lock();
                if state.queue.len() >= shared.capacity {
                    warn!("RX queue full, dropping oldest frame");
                    state.queue.pop_front();
                }
                state.queue.push_back(frame);
                shared.available.notify_all();
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Background receiver stopped: {}", e);
                let mut state = shared.state.lock();
                state.error = Some(e);
                break;
            }
        }
    }

    let mut state = shared.state.lock();
    state.stopped = true;
    shared.available.notify_all();
    debug!("Background receiver exited");
}

/// Owns a receive thread and the queue it fills. Stopping happens in [`BackgroundReceiver::close`] or on drop.
pub struct BackgroundReceiver {
    shared: Arc<Shared>,
    processing_handle: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl BackgroundReceiver {
    pub fn new<S: FrameSource>(source: S) -> Result<Self> {
        Self::with_capacity(source, RX_QUEUE_SIZE)
    }

    pub fn with_capacity<S: FrameSource>(source: S, capacity: usize) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                error: None,
                stopped: false,
                closed: false,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        });

        let thread_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name("can-rx".into())
            .spawn(move || process(source, thread_shared))?;

        Ok(Self {
            shared,
            processing_handle: Mutex::new(Some(handle)),
        })
    }

    /// Wait up to `timeout` for the next frame in arrival order. Queued frames are handed out before a
    /// pending background error is raised. Returns [`Error::Closed`] once the receiver was closed.
    pub fn recv(&self, timeout: Duration) -> Result<Option<Frame>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();

        loop {
            if state.closed {
                return Err(Error::Closed);
            }
            if let Some(frame) = state.queue.pop_front() {
                return Ok(Some(frame));
            }
            if let Some(e) = state.error.take() {
                return Err(e);
            }
            if state.stopped {
                return Err(Error::Closed);
            }

            if self.shared.available.wait_until(&mut state, deadline).timed_out() {
                // One last look, a frame may have raced the timeout
                return match state.queue.pop_front() {
                    Some(frame) => Ok(Some(frame)),
                    None => Ok(None),
                };
            }
        }
    }

    /// Number of frames currently buffered.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Stop the background thread and wake all blocked readers. Safe to call more than once and from any thread.
    pub fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            state.closed = true;
            self.shared.available.notify_all();
        }

        if let Some(handle) = self.processing_handle.lock().take() {
            if handle.join().is_err() {
                warn!("Background receiver panicked");
            }
        }
    }
}

impl Drop for BackgroundReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    /// Source fed through a channel; polls with a short timeout like a socket with SO_RCVTIMEO.
    struct ChannelSource(mpsc::Receiver<Result<Frame>>);

    impl FrameSource for ChannelSource {
        fn read_frame(&mut self) -> Result<Option<Frame>> {
            match self.0.recv_timeout(Duration::from_millis(5)) {
                Ok(frame) => frame.map(Some),
                Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
                Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
            }
        }
    }

    fn frame(i: u8) -> Frame {
        Frame::new(0x7e8.into(), &[i]).unwrap()
    }

    #[test]
    fn recv_times_out_without_frames() {
        let (_tx, rx) = mpsc::channel();
        let receiver = BackgroundReceiver::new(ChannelSource(rx)).unwrap();
        assert_eq!(receiver.recv(Duration::from_millis(20)).unwrap(), None);
    }

    #[test]
    fn drops_oldest_when_full() {
        let (tx, rx) = mpsc::channel();
        for i in 0..4 {
            tx.send(Ok(frame(i))).unwrap();
        }
        let receiver = BackgroundReceiver::with_capacity(ChannelSource(rx), 2).unwrap();

        // All four frames are already waiting in the channel
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(receiver.pending(), 2);

        assert_eq!(receiver.recv(Duration::from_secs(1)).unwrap(), Some(frame(2)));
        assert_eq!(receiver.recv(Duration::from_secs(1)).unwrap(), Some(frame(3)));
    }

    #[test]
    fn background_error_reaches_next_recv() {
        let (tx, rx) = mpsc::channel();
        tx.send(Ok(frame(1))).unwrap();
        tx.send(Err(Error::Disconnected)).unwrap();
        let receiver = BackgroundReceiver::new(ChannelSource(rx)).unwrap();

        assert_eq!(receiver.recv(Duration::from_secs(1)).unwrap(), Some(frame(1)));
        assert!(matches!(receiver.recv(Duration::from_secs(1)), Err(Error::Disconnected)));
        // The thread is gone, later calls report the transport as closed
        assert!(matches!(receiver.recv(Duration::from_millis(10)), Err(Error::Closed)));
    }

    #[test]
    fn close_is_idempotent() {
        let (_tx, rx) = mpsc::channel();
        let receiver = BackgroundReceiver::new(ChannelSource(rx)).unwrap();
        receiver.close();
        receiver.close();
        assert!(matches!(receiver.recv(Duration::from_millis(10)), Err(Error::Closed)));
    }
}
