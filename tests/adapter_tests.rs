#![allow(dead_code, unused_imports)]
use ecu_link::can::{BackgroundReceiver, CanAdapter, Frame, FrameSource};
use ecu_link::Error;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

static BULK_NUM_FRAMES: u64 = 0x100;
static BULK_TIMEOUT_MS: u64 = 1000;

/// Frame source fed by another thread, polling like a socket with a read timeout.
struct ChannelSource(mpsc::Receiver<Frame>);

impl FrameSource for ChannelSource {
    fn read_frame(&mut self) -> ecu_link::Result<Option<Frame>> {
        match self.0.recv_timeout(Duration::from_millis(5)) {
            Ok(frame) => Ok(Some(frame)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Error::Disconnected),
        }
    }
}

fn bulk_frames() -> Vec<Frame> {
    (0..BULK_NUM_FRAMES)
        .map(|i| Frame::new(0x123.into(), &i.to_be_bytes()).unwrap())
        .collect()
}

#[test]
fn background_receiver_keeps_order() {
    let (tx, rx) = mpsc::channel();
    let receiver = BackgroundReceiver::new(ChannelSource(rx)).unwrap();

    let frames = bulk_frames();
    let to_send = frames.clone();
    let sender = std::thread::spawn(move || {
        for frame in to_send {
            tx.send(frame).unwrap();
        }
        // Keep the source alive until everything was read
        std::thread::sleep(Duration::from_millis(BULK_TIMEOUT_MS));
    });

    let start = Instant::now();
    let mut received = vec![];
    while received.len() < frames.len() && start.elapsed() < Duration::from_millis(BULK_TIMEOUT_MS) {
        if let Some(frame) = receiver.recv(Duration::from_millis(100)).unwrap() {
            received.push(frame);
        }
    }

    assert_eq!(frames, received);
    receiver.close();
    sender.join().unwrap();
}

#[test]
fn background_receiver_close_wakes_reader() {
    let (_tx, rx) = mpsc::channel::<Frame>();
    let receiver = Arc::new(BackgroundReceiver::new(ChannelSource(rx)).unwrap());

    let reader = receiver.clone();
    let blocked = std::thread::spawn(move || {
        let start = Instant::now();
        let result = reader.recv(Duration::from_secs(10));
        (result, start.elapsed())
    });

    std::thread::sleep(Duration::from_millis(50));
    receiver.close();

    let (result, elapsed) = blocked.join().unwrap();
    assert!(matches!(result, Err(Error::Closed)));
    assert!(elapsed < Duration::from_secs(5));
}

#[cfg(all(target_os = "linux", feature = "socketcan"))]
#[test]
fn socketcan_missing_interface() {
    assert!(matches!(
        ecu_link::socketcan::SocketCan::open("doesnotexist0"),
        Err(Error::NotFound)
    ));
}

/// Sends a large number of frames on one socket and reads them back on a second socket on the same bus.
/// Verifies the receive path doesn't drop frames and keeps them in order.
#[cfg(feature = "test-vcan")]
#[test]
#[serial_test::serial]
fn vcan_bulk_send() {
    use ecu_link::socketcan::SocketCan;

    let mut tx = SocketCan::open("vcan0").unwrap();
    let mut rx = SocketCan::open("vcan0").unwrap();

    let frames = bulk_frames();
    for frame in &frames {
        tx.send(frame).unwrap();
    }

    let start = Instant::now();
    let mut received = vec![];
    while received.len() < frames.len() && start.elapsed() < Duration::from_millis(BULK_TIMEOUT_MS) {
        if let Some(frame) = rx.recv(Duration::from_millis(100)).unwrap() {
            received.push(frame);
        }
    }

    assert_eq!(frames, received);
}

#[cfg(feature = "test-vcan")]
#[test]
#[serial_test::serial]
fn vcan_recv_after_close() {
    use ecu_link::socketcan::SocketCan;

    let mut adapter = SocketCan::open("vcan0").unwrap();
    adapter.close();
    assert!(matches!(adapter.recv(Duration::from_millis(10)), Err(Error::Closed)));
}
