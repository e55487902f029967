//! Chunked memory dumps using Read Memory By Address (0x23).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Error;
use crate::isotp::IsoTpChannel;
use crate::uds::UDSClient;
use crate::Result;

/// Cooperative cancellation for long transfers. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read `size` bytes starting at `start`, `chunk_size` bytes per request. `progress` is called
/// with (bytes read, total) after every chunk. The flag is checked before each request.
pub fn read_memory<T, F>(
    client: &mut UDSClient<T>,
    start: u32,
    size: u32,
    chunk_size: u16,
    cancel: &CancelFlag,
    mut progress: F,
) -> Result<Vec<u8>>
where
    T: IsoTpChannel,
    F: FnMut(usize, usize),
{
    let total = size as usize;
    let chunk_size = chunk_size.max(1);
    let mut data = Vec::with_capacity(std::cmp::min(total, chunk_size as usize));

    info!("Reading 0x{:x} bytes from 0x{:08x}", size, start);

    while data.len() < total {
        if cancel.is_cancelled() {
            info!("Memory read cancelled at 0x{:x}", data.len());
            return Err(Error::Cancelled);
        }

        let offset = data.len() as u32;
        let remaining = total - data.len();
        let length = std::cmp::min(remaining, chunk_size as usize) as u16;
        let address = start.wrapping_add(offset);

        let chunk = client.request_read_memory_address(address, length)?;
        if chunk.len() != length as usize {
            debug!("Expected {} bytes at 0x{:08x}, got {}", length, address, chunk.len());
            return Err(crate::uds::Error::InvalidResponseLength.into());
        }

        data.extend(chunk);
        progress(data.len(), total);
    }

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isotp::mock::MockIsoTp;
    use crate::isotp::IsoTPOptions;

    fn client() -> UDSClient<MockIsoTp> {
        UDSClient::new(MockIsoTp::new(IsoTPOptions::from_id(0x7e0.into())))
    }

    #[test]
    fn reads_in_chunks() {
        let mut uds = client();
        uds.channel_mut().push_response(&[0x63, 1, 2, 3, 4]);
        uds.channel_mut().push_response(&[0x63, 5]);

        let mut calls = vec![];
        let data = read_memory(&mut uds, 0x1000, 5, 4, &CancelFlag::new(), |done, total| {
            calls.push((done, total))
        })
        .unwrap();

        assert_eq!(data, vec![1, 2, 3, 4, 5]);
        assert_eq!(calls, vec![(4, 5), (5, 5)]);
        assert_eq!(uds.channel().sent()[1], vec![0x23, 0x00, 0x00, 0x10, 0x04, 0x00, 0x01]);
    }

    #[test]
    fn full_address_space_fails_on_first_chunk() {
        let mut uds = client();
        uds.channel_mut().push_response(&[0x7f, 0x23, 0x31]);

        let result = read_memory(&mut uds, 0, u32::MAX, 0x100, &CancelFlag::new(), |_, _| {});
        assert_eq!(
            result.unwrap_err().negative_response_code(),
            Some(crate::uds::NegativeResponseCode::RequestOutOfRange)
        );
        assert_eq!(uds.channel().sent().len(), 1);
    }

    #[test]
    fn cancel_stops_between_requests() {
        let mut uds = client();
        uds.channel_mut().push_response(&[0x63, 1, 2]);
        uds.channel_mut().push_response(&[0x63, 3, 4]);

        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let result = read_memory(&mut uds, 0, 4, 2, &cancel, |_, _| flag.cancel());

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(uds.channel().sent().len(), 1);
    }

    #[test]
    fn short_chunk() {
        let mut uds = client();
        uds.channel_mut().push_response(&[0x63, 1]);
        let result = read_memory(&mut uds, 0, 2, 2, &CancelFlag::new(), |_, _| {});
        assert!(matches!(
            result,
            Err(Error::UDSError(crate::uds::Error::InvalidResponseLength))
        ));
    }
}
