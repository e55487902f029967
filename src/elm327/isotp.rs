use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::can::Identifier;
use crate::elm327::Elm327;
use crate::error::Error;
use crate::isotp::constants::MAX_SF_DL;
use crate::isotp::{IsoTPOptions, IsoTpChannel, Progress, Reassembler};
use crate::Result;

/// ISO-TP channel on an ELM327 session. Several channels may share one session, each call
/// reprograms the adapter if another channel changed its addressing.
pub struct Elm327IsoTp<T: Read + Write> {
    session: Arc<Mutex<Elm327<T>>>,
    bitrate: u32,
    options: IsoTPOptions,
    reassembler: Reassembler,
    packets: VecDeque<Vec<u8>>,
}

/// Feed one printed frame into the reassembler. Flow control is sent by the adapter itself.
fn accept(
    options: &IsoTPOptions,
    reassembler: &mut Reassembler,
    packets: &mut VecDeque<Vec<u8>>,
    id: Identifier,
    data: &[u8],
) -> Result<bool> {
    if id != options.dest_id {
        return Ok(false);
    }

    match reassembler.feed(data)? {
        Progress::Complete(packet) => {
            debug!("RX {}", hex::encode(&packet));
            packets.push_back(packet);
            Ok(true)
        }
        Progress::Ignored => {
            warn!("Dropping malformed frame {}", hex::encode(data));
            Ok(false)
        }
        Progress::FlowControlRequired | Progress::InProgress => Ok(false),
    }
}

impl<T: Read + Write> Elm327IsoTp<T> {
    pub fn new(session: Arc<Mutex<Elm327<T>>>, bitrate: u32, options: IsoTPOptions) -> Result<Self> {
        session.lock().configure(&options, bitrate)?;
        Ok(Self {
            session,
            bitrate,
            options,
            reassembler: Reassembler::new(options.block_size),
            packets: VecDeque::new(),
        })
    }
}

impl<T: Read + Write> IsoTpChannel for Elm327IsoTp<T> {
    /// Send a packet of up to 7 bytes. Responses printed by the adapter are buffered for [`IsoTpChannel::recv`].
    fn send(&mut self, data: &[u8]) -> Result<()> {
        // An empty command line makes the adapter repeat the previous command
        if data.is_empty() {
            return Err(crate::isotp::error::Error::EmptyPacket.into());
        }
        if data.len() > MAX_SF_DL {
            return Err(Error::Unsupported(format!(
                "ELM327 can only transmit single frames, got {} bytes",
                data.len()
            )));
        }
        debug!("TX {}", hex::encode(data));

        let mut session = self.session.lock();
        session.configure(&self.options, self.bitrate)?;

        self.reassembler.reset();
        for (id, frame) in session.transact(data, self.options.timeout)? {
            accept(&self.options, &mut self.reassembler, &mut self.packets, id, &frame)?;
        }
        Ok(())
    }

    /// Return a buffered packet, or monitor the bus until one is complete or the timeout passes.
    fn recv(&mut self) -> Result<Vec<u8>> {
        if let Some(packet) = self.packets.pop_front() {
            return Ok(packet);
        }

        let mut session = self.session.lock();
        session.configure(&self.options, self.bitrate)?;

        let deadline = Instant::now() + self.options.timeout;
        let options = &self.options;
        let reassembler = &mut self.reassembler;
        let packets = &mut self.packets;
        let monitored = session.monitor(deadline, |id, data| accept(options, reassembler, packets, id, data));

        match (monitored, self.packets.pop_front()) {
            (_, Some(packet)) => Ok(packet),
            (Err(e), None) => Err(e),
            (Ok(()), None) => Err(Error::Timeout),
        }
    }

    fn options(&self) -> &IsoTPOptions {
        &self.options
    }

    fn set_options(&mut self, options: IsoTPOptions) -> Result<()> {
        self.session.lock().configure(&options, self.bitrate)?;
        self.options = options;
        self.reassembler = Reassembler::new(options.block_size);
        self.packets.clear();
        Ok(())
    }
}
