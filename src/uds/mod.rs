//! Unified Diagnostic Services (UDS) Client, implements ISO 14229
//! ## Example
//! ```rust,no_run
//! use ecu_link::isotp::{IsoTPAdapter, IsoTPOptions};
//! use ecu_link::uds::{DataIdentifier, UDSClient};
//!
//! fn uds_example() -> ecu_link::Result<()> {
//!     let adapter = ecu_link::socketcan::SocketCan::open("can0")?;
//!     let isotp = IsoTPAdapter::new(adapter, IsoTPOptions::from_id(0x7a1.into()));
//!     let mut uds = UDSClient::new(isotp);
//!
//!     uds.tester_present()?;
//!     let response = uds.read_data_by_identifier(DataIdentifier::ApplicationSoftwareIdentification as u16)?;
//!
//!     println!("Application Software Identification: {}", hex::encode(response));
//!     Ok(())
//! }
//! ```

mod constants;
pub mod dtc;
mod error;
pub mod memory;
pub mod security;
mod types;

use std::time::Instant;

use crate::isotp::IsoTpChannel;
use crate::Result;
pub use constants::*;
pub use dtc::{decode_dtcs, DiagnosticCode, DtcKind, DtcLayout};
pub use error::{Error, NegativeResponseCode};
pub use security::SecurityAlgorithm;
pub use types::*;

use tracing::{debug, warn};

/// UDS Client. Wraps an [`IsoTpChannel`] to provide a simple interface for making UDS calls.
///
/// The client owns its channel, so only one request can be in flight at a time.
pub struct UDSClient<T: IsoTpChannel> {
    channel: T,
    options: UDSOptions,
}

impl<T: IsoTpChannel> UDSClient<T> {
    pub fn new(channel: T) -> Self {
        Self::with_options(channel, UDSOptions::default())
    }

    pub fn with_options(channel: T, options: UDSOptions) -> Self {
        Self { channel, options }
    }

    pub fn options(&self) -> &UDSOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: UDSOptions) {
        self.options = options;
    }

    pub fn channel(&self) -> &T {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut T {
        &mut self.channel
    }

    pub fn into_inner(self) -> T {
        self.channel
    }

    /// Helper function to make custom UDS requests. This function will verify the ECU responds with the correct service identifier and sub function, handle negative responses, and will return the response data.
    ///
    /// "Response pending" answers are waited out, up to [`UDSOptions::max_response_pending`] answers and [`UDSOptions::response_pending_timeout`] in total.
    pub fn request(&mut self, sid: u8, sub_function: Option<u8>, data: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut request: Vec<u8> = vec![sid];

        if let Some(sub_function) = sub_function {
            request.push(sub_function);
        }

        if let Some(data) = data {
            request.extend(data);
        }

        match ServiceIdentifier::from_repr(sid) {
            Some(service) => debug!("UDS TX {:?} {}", service, hex::encode(&request)),
            None => debug!("UDS TX {}", hex::encode(&request)),
        }
        self.channel.send(&request)?;

        let mut pending = 0;
        let mut pending_since: Option<Instant> = None;

        loop {
            let packet = self.channel.recv()?;
            debug!("UDS RX {}", hex::encode(&packet));
            let response = UDSResponse::try_from(packet.as_slice())?;

            // Check for errors
            if let Some(code) = response.negative_response_code() {
                let service = response.rejected_service().unwrap_or(sid);

                if code == NegativeResponseCode::RequestCorrectlyReceivedResponsePending {
                    pending += 1;
                    let since = *pending_since.get_or_insert_with(Instant::now);
                    if pending > self.options.max_response_pending
                        || since.elapsed() > self.options.response_pending_timeout
                    {
                        return Err(Error::ResponsePendingExceeded(pending).into());
                    }
                    warn!("Received Response Pending for 0x{:02x} ({})", service, pending);
                    continue;
                }

                return Err(Error::NegativeResponse { service, code }.into());
            }

            // Check service id
            if !response.is_positive_for(sid) {
                return Err(Error::InvalidServiceId(response.id).into());
            }

            // Check sub function
            if let Some(sub_function) = sub_function {
                match response.data.first() {
                    Some(&echo) if echo == sub_function => {}
                    Some(&echo) => return Err(Error::InvalidSubFunction(echo).into()),
                    None => return Err(Error::InvalidResponseLength.into()),
                }
            }

            let start: usize = if sub_function.is_some() { 1 } else { 0 };
            return Ok(response.data[start..].to_vec());
        }
    }

    /// 0x10 - Diagnostic Session Control. Checks the echoed session type and returns the rest of the response, usually the 4 byte session parameter record.
    pub fn request_session(&mut self, session_type: u8) -> Result<Vec<u8>> {
        let resp = self.request(
            ServiceIdentifier::DiagnosticSessionControl as u8,
            None,
            Some(&[session_type]),
        )?;

        let (&actual, record) = resp.split_first().ok_or(Error::InvalidResponseLength)?;
        if actual != session_type {
            return Err(Error::SessionTypeMismatch {
                expected: session_type,
                actual,
            }
            .into());
        }

        Ok(record.to_vec())
    }

    /// 0x10 - Diagnostic Session Control. ECU may optionally return 4 bytes of sessionParameterRecord with some timing information.
    pub fn diagnostic_session_control(&mut self, session_type: u8) -> Result<Option<SessionParameterRecord>> {
        let record = self.request_session(session_type)?;
        Ok(SessionParameterRecord::parse(&record))
    }

    /// 0x11 - ECU Reset. Use the [`constants::ResetType`] enum for the reset types defined in the standard. Returns the power down time if the ECU sent one.
    pub fn ecu_reset(&mut self, reset_type: u8) -> Result<Option<u8>> {
        let result = self.request(ServiceIdentifier::EcuReset as u8, Some(reset_type), None)?;

        Ok(if result.len() == 1 { Some(result[0]) } else { None })
    }

    /// 0x27 - Security Access, request the seed for the default level.
    pub fn request_security_seed(&mut self) -> Result<Vec<u8>> {
        self.request(
            ServiceIdentifier::SecurityAccess as u8,
            Some(SecurityAccessType::RequestSeed as u8),
            None,
        )
    }

    /// 0x27 - Security Access, send the key for the default level. Any positive response unlocks.
    pub fn request_security_key(&mut self, key: &[u8]) -> Result<()> {
        let mut data = vec![SecurityAccessType::SendKey as u8];
        data.extend(key);

        self.request(ServiceIdentifier::SecurityAccess as u8, None, Some(&data))?;
        Ok(())
    }

    /// Full seed/key exchange using `algorithm` to compute the key.
    pub fn unlock<A: SecurityAlgorithm + ?Sized>(&mut self, algorithm: &A) -> Result<()> {
        let seed = self.request_security_seed()?;
        if seed.iter().all(|&b| b == 0) {
            debug!("ECU already unlocked");
            return Ok(());
        }

        let key = algorithm.compute_key(&seed);
        self.request_security_key(&key)
    }

    /// 0x3E - Tester Present
    pub fn tester_present(&mut self) -> Result<()> {
        self.request(ServiceIdentifier::TesterPresent as u8, Some(0), None)?;
        Ok(())
    }

    /// 0x22 - Read Data By Identifier. Specify a 16 bit data identifier, or use a constant from [`constants::DataIdentifier`] for standardized identifiers. The echoed identifier is left at the start of the returned data.
    pub fn read_data_by_identifier(&mut self, data_identifier: u16) -> Result<Vec<u8>> {
        let did = data_identifier.to_be_bytes();
        self.request(ServiceIdentifier::ReadDataByIdentifier as u8, None, Some(&did))
    }

    /// 0x23 - Read Memory By Address, using a 4 byte address and a 2 byte size.
    pub fn request_read_memory_address(&mut self, address: u32, length: u16) -> Result<Vec<u8>> {
        let mut data = address.to_be_bytes().to_vec();
        data.extend(length.to_be_bytes());

        self.request(ServiceIdentifier::ReadMemoryByAddress as u8, None, Some(&data))
    }

    fn request_download_upload(
        &mut self,
        sid: ServiceIdentifier,
        compression_method: u8,
        encryption_method: u8,
        memory_address: u32,
        memory_size: u32,
    ) -> Result<usize> {
        let data_format = (compression_method << 4) | (encryption_method & 0xf);
        // 4 byte size, 4 byte address
        let address_and_length_format = 0x44;

        let mut data: Vec<u8> = vec![data_format, address_and_length_format];
        data.extend(memory_address.to_be_bytes());
        data.extend(memory_size.to_be_bytes());

        let resp = self.request(sid as u8, None, Some(&data))?;

        // Ensure the response contains at least a length format
        let (&format, length) = resp.split_first().ok_or(Error::InvalidResponseLength)?;

        let num_length_bytes = (format >> 4) as usize;
        if num_length_bytes == 0 || num_length_bytes > 8 || length.len() != num_length_bytes {
            return Err(Error::InvalidResponseLength.into());
        }

        Ok(length.iter().fold(0, |acc, &x| (acc << 8) | x as usize))
    }

    /// 0x34 - Request Download. Used to initiate a transfer from the client to the ECU. Returns the maximum number of bytes to include in each TransferData request.
    pub fn request_download(
        &mut self,
        compression_method: u8,
        encryption_method: u8,
        memory_address: u32,
        memory_size: u32,
    ) -> Result<usize> {
        self.request_download_upload(
            ServiceIdentifier::RequestDownload,
            compression_method,
            encryption_method,
            memory_address,
            memory_size,
        )
    }

    /// 0x35 - Request Upload. Used to initiate a transfer from the ECU to the client. Returns the maximum number of bytes the ECU will include in each TransferData response.
    pub fn request_upload(
        &mut self,
        compression_method: u8,
        encryption_method: u8,
        memory_address: u32,
        memory_size: u32,
    ) -> Result<usize> {
        self.request_download_upload(
            ServiceIdentifier::RequestUpload,
            compression_method,
            encryption_method,
            memory_address,
            memory_size,
        )
    }

    /// 0x36 - Transfer Data. `block_sequence_counter` starts at 1 and wraps. Pass `None` as `data` during an upload, the function then returns the data sent by the ECU.
    pub fn transfer_data(&mut self, block_sequence_counter: u8, data: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        let mut buf: Vec<u8> = vec![block_sequence_counter];
        if let Some(data) = data {
            buf.extend(data);
        }

        let resp = self.request(ServiceIdentifier::TransferData as u8, None, Some(&buf))?;

        // Check block sequence counter
        let (&counter, payload) = resp.split_first().ok_or(Error::InvalidResponseLength)?;
        if counter != block_sequence_counter {
            return Err(Error::InvalidBlockSequenceCounter(counter).into());
        }

        Ok(if payload.is_empty() { None } else { Some(payload.to_vec()) })
    }

    /// 0x37 - Request Transfer Exit. Used to terminate an upload or download. Has optional `data` parameter for additional information, and can optionally return additional information from the ECU, such as a checksum.
    pub fn request_transfer_exit(&mut self, data: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        let resp = self.request(ServiceIdentifier::RequestTransferExit as u8, None, data)?;

        Ok(if resp.is_empty() { None } else { Some(resp) })
    }

    /// OBD-II service 0x03/0x07, decoded with an explicit `layout`.
    pub fn read_dtcs(&mut self, kind: DtcKind, layout: DtcLayout) -> Result<Vec<DiagnosticCode>> {
        let resp = self.request(kind.service() as u8, None, None)?;
        Ok(decode_dtcs(&resp, layout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error as CrateError;
    use crate::isotp::mock::MockIsoTp;
    use crate::isotp::IsoTPOptions;

    fn client(responses: &[&[u8]]) -> UDSClient<MockIsoTp> {
        let mut channel = MockIsoTp::new(IsoTPOptions::from_id(0x7e0.into()));
        for response in responses {
            channel.push_response(response);
        }
        UDSClient::new(channel)
    }

    fn uds_error(result: Result<impl std::fmt::Debug>) -> Error {
        match result {
            Err(CrateError::UDSError(err)) => err,
            other => panic!("expected UDS error, got {:?}", other),
        }
    }

    #[test]
    fn request_strips_sid_and_sub_function() {
        let mut uds = client(&[&[0x67, 0x01, 0x12, 0x34]]);
        assert_eq!(uds.request_security_seed().unwrap(), vec![0x12, 0x34]);
        assert_eq!(uds.channel().sent(), &[vec![0x27, 0x01]]);
    }

    #[test]
    fn response_pending_then_positive() {
        let mut uds = client(&[&[0x7f, 0x3e, 0x78], &[0x7f, 0x3e, 0x78], &[0x7e, 0x00]]);
        uds.tester_present().unwrap();
        assert_eq!(uds.channel().pending(), 0);
    }

    #[test]
    fn response_pending_ceiling() {
        let mut uds = client(&[&[0x7f, 0x3e, 0x78], &[0x7f, 0x3e, 0x78], &[0x7e, 0x00]]);
        uds.set_options(UDSOptions {
            max_response_pending: 1,
            ..Default::default()
        });
        assert_eq!(uds_error(uds.tester_present()), Error::ResponsePendingExceeded(2));
    }

    #[test]
    fn negative_response() {
        let mut uds = client(&[&[0x7f, 0x27, 0x35]]);
        let err = uds.request_security_key(&[0xaa]).unwrap_err();
        assert_eq!(err.negative_response_code(), Some(NegativeResponseCode::InvalidKey));
        assert_eq!(uds.channel().sent(), &[vec![0x27, 0x02, 0xaa]]);
    }

    #[test]
    fn service_mismatch() {
        let mut uds = client(&[&[0x62, 0xf1, 0x90]]);
        assert_eq!(uds_error(uds.tester_present()), Error::InvalidServiceId(0x62));
    }

    #[test]
    fn sub_function_mismatch() {
        let mut uds = client(&[&[0x67, 0x03, 0x00]]);
        assert_eq!(uds_error(uds.request_security_seed()), Error::InvalidSubFunction(0x03));
    }

    #[test]
    fn empty_response() {
        let mut uds = client(&[&[]]);
        assert_eq!(uds_error(uds.tester_present()), Error::EmptyResponse);
    }

    #[test]
    fn session_echo() {
        let mut uds = client(&[&[0x50, 0x03], &[0x50, 0x01]]);
        assert!(uds.request_session(0x03).unwrap().is_empty());
        assert_eq!(uds.channel().sent()[0], vec![0x10, 0x03]);

        assert_eq!(
            uds_error(uds.request_session(0x03)),
            Error::SessionTypeMismatch {
                expected: 0x03,
                actual: 0x01
            }
        );
    }

    #[test]
    fn session_parameter_record() {
        let mut uds = client(&[&[0x50, 0x03, 0x00, 0x32, 0x01, 0xf4]]);
        let record = uds.diagnostic_session_control(0x03).unwrap().unwrap();
        assert_eq!(record.p2_server_max, std::time::Duration::from_millis(50));
    }

    #[test]
    fn read_memory_request_layout() {
        let mut uds = client(&[&[0x63, 0xde, 0xad]]);
        assert_eq!(uds.request_read_memory_address(0x0001_0000, 2).unwrap(), vec![0xde, 0xad]);
        assert_eq!(
            uds.channel().sent(),
            &[vec![0x23, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02]]
        );
    }

    #[test]
    fn read_data_by_identifier_keeps_echo() {
        let mut uds = client(&[&[0x62, 0xf1, 0x90, b'V', b'I', b'N']]);
        assert_eq!(
            uds.read_data_by_identifier(DataIdentifier::Vin as u16).unwrap(),
            vec![0xf1, 0x90, b'V', b'I', b'N']
        );
        assert_eq!(uds.channel().sent(), &[vec![0x22, 0xf1, 0x90]]);
    }

    #[test]
    fn unlock_with_closure() {
        let mut uds = client(&[&[0x67, 0x01, 0x11, 0x22], &[0x67, 0x02]]);
        uds.unlock(&|seed: &[u8]| seed.iter().map(|b| b ^ 0xff).collect::<Vec<u8>>())
            .unwrap();
        assert_eq!(uds.channel().sent()[1], vec![0x27, 0x02, 0xee, 0xdd]);
    }

    #[test]
    fn unlock_skips_key_for_zero_seed() {
        let mut uds = client(&[&[0x67, 0x01, 0x00, 0x00]]);
        uds.unlock(&|_: &[u8]| vec![0x01]).unwrap();
        assert_eq!(uds.channel().sent().len(), 1);
    }

    #[test]
    fn download_sequence() {
        let mut uds = client(&[&[0x74, 0x20, 0x01, 0x02], &[0x76, 0x01], &[0x77]]);
        assert_eq!(uds.request_download(0, 0, 0x8000, 0x100).unwrap(), 0x102);
        assert_eq!(
            uds.channel().sent()[0],
            vec![0x34, 0x00, 0x44, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00, 0x01, 0x00]
        );
        assert_eq!(uds.transfer_data(1, Some(&[0xaa, 0xbb])).unwrap(), None);
        assert_eq!(uds.request_transfer_exit(None).unwrap(), None);
    }

    #[test]
    fn transfer_data_counter_mismatch() {
        let mut uds = client(&[&[0x76, 0x02]]);
        assert_eq!(
            uds_error(uds.transfer_data(1, None)),
            Error::InvalidBlockSequenceCounter(2)
        );
    }

    #[test]
    fn read_confirmed_dtcs() {
        let mut uds = client(&[&[0x43, 0x02, 0x01, 0x23, 0x45, 0x67]]);
        let codes = uds.read_dtcs(DtcKind::Confirmed, DtcLayout::CountPrefixed).unwrap();
        assert_eq!(codes, vec![DiagnosticCode(0x0123), DiagnosticCode(0x4567)]);
        assert_eq!(uds.channel().sent(), &[vec![0x03]]);
    }

    #[test]
    fn timeout_propagates() {
        let mut uds = client(&[]);
        assert!(uds.tester_present().unwrap_err().is_timeout());
    }
}
