//! ELM327 compatible serial adapters. The adapter implements ISO-TP itself and is driven with AT commands.
//!
//! Responses are printed with headers (`ATH1`) and spaces (`ATS1`) so every received CAN frame can be
//! reassembled on the host. The adapter can only transmit single frames, so requests are limited to 7 bytes.

pub mod error;
mod isotp;

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use bstr::ByteSlice;
use tracing::{debug, info, warn};

use crate::can::Identifier;
use crate::error::write_exact;
use crate::isotp::types::encode_st_min;
use crate::isotp::IsoTPOptions;
use crate::Result;

pub use error::Error;
pub use isotp::Elm327IsoTp;

/// Read timeout of the serial port, the session polls until its own deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(20);
const COMMAND_TIMEOUT: Duration = Duration::from_millis(1000);
const RESET_TIMEOUT: Duration = Duration::from_millis(3000);
/// Added on top of the ECU timeout programmed with ATST before the host gives up.
const RESPONSE_SLACK: Duration = Duration::from_millis(500);
const PROMPT: u8 = b'>';

const BUS_ERRORS: &[&str] = &[
    "CAN ERROR",
    "BUS ERROR",
    "BUS BUSY",
    "UNABLE TO CONNECT",
    "BUFFER FULL",
    "FB ERROR",
    "DATA ERROR",
    "<RX ERROR",
    "STOPPED",
    "ERR",
];

const INFO_LINES: &[&str] = &["SEARCHING...", "BUS INIT", "OK"];

enum Output {
    Line(String),
    Prompt,
}

/// Parse a frame printed with headers and spaces, e.g. `7E8 03 41 0D 00` or `18 DA F1 10 03 41 0D 00`.
pub fn parse_frame(line: &str) -> Option<(Identifier, Vec<u8>)> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (id, data) = match tokens.first() {
        Some(first) if first.len() == 3 => {
            let id = u32::from_str_radix(first, 16).ok()?;
            (Identifier::Standard(id), &tokens[1..])
        }
        Some(first) if first.len() == 2 && tokens.len() >= 4 => {
            if tokens[..4].iter().any(|t| t.len() != 2) {
                return None;
            }
            let bytes: [u8; 4] = hex::decode(tokens[..4].concat()).ok()?.try_into().ok()?;
            let id = u32::from_be_bytes(bytes);
            (Identifier::Extended(id & 0x1fff_ffff), &tokens[4..])
        }
        _ => return None,
    };

    if data.iter().any(|t| t.len() != 2) {
        return None;
    }
    let data = hex::decode(data.concat()).ok()?;
    Some((id, data))
}

fn is_bus_error(line: &str) -> bool {
    BUS_ERRORS.iter().any(|e| line.starts_with(e))
}

/// ISO 15765-4 protocol number for `ATSP`.
fn protocol_number(extended: bool, bitrate: u32) -> Option<u8> {
    match (extended, bitrate) {
        (false, 500_000) => Some(6),
        (true, 500_000) => Some(7),
        (false, 250_000) => Some(8),
        (true, 250_000) => Some(9),
        _ => None,
    }
}

fn id_hex(id: Identifier) -> String {
    match id {
        Identifier::Standard(id) => format!("{:03X}", id),
        Identifier::Extended(id) => format!("{:08X}", id),
    }
}

/// One serial session with an adapter. Generic over the port so it can run against any byte stream.
pub struct Elm327<T: Read + Write> {
    port: T,
    rx: Vec<u8>,
    version: String,
    configured: Option<(IsoTPOptions, u32)>,
}

impl Elm327<Box<dyn serialport::SerialPort>> {
    /// Open the serial port at `baudrate` and initialize the adapter.
    pub fn open(port: &str, baudrate: u32) -> Result<Self> {
        let serial = serialport::new(port, baudrate)
            .timeout(POLL_INTERVAL)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice | serialport::ErrorKind::Io(ErrorKind::NotFound) => {
                    crate::Error::NotFound
                }
                _ => Error::SerialPort(e).into(),
            })?;

        let elm = Self::new(serial)?;
        info!("Connected to {} on {}", elm.version(), port);
        Ok(elm)
    }
}

impl<T: Read + Write> Elm327<T> {
    /// Reset the adapter and apply the settings the rest of the session relies on.
    pub fn new(port: T) -> Result<Self> {
        let mut elm = Self {
            port,
            rx: Vec::new(),
            version: String::new(),
            configured: None,
        };

        let lines = elm.command("ATZ", RESET_TIMEOUT)?;
        elm.version = lines
            .iter()
            .find(|l| l.starts_with("ELM"))
            .cloned()
            .unwrap_or_else(|| "ELM327".to_string());

        for cmd in ["ATE0", "ATL0", "ATS1", "ATH1", "ATAT0", "ATCAF1"] {
            elm.at(cmd)?;
        }

        Ok(elm)
    }

    /// Identification printed on reset, e.g. `ELM327 v1.5`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Program addressing, flow control and timeout for `options` unless already active.
    pub fn configure(&mut self, options: &IsoTPOptions, bitrate: u32) -> Result<()> {
        if self.configured == Some((*options, bitrate)) {
            return Ok(());
        }

        let extended = options.source_id.is_extended();
        let protocol = protocol_number(extended, bitrate).ok_or_else(|| {
            crate::Error::Unsupported(format!("ELM327 does not support a CAN bitrate of {}", bitrate))
        })?;
        self.at(&format!("ATSP{}", protocol))?;

        let source: u32 = options.source_id.into();
        if extended {
            self.at(&format!("ATCP{:02X}", source >> 24))?;
            self.at(&format!("ATSH{:06X}", source & 0xff_ffff))?;
        } else {
            self.at(&format!("ATSH{}", id_hex(options.source_id)))?;
        }
        self.at(&format!("ATCRA{}", id_hex(options.dest_id)))?;

        self.at(&format!("ATFCSH{}", id_hex(options.source_id)))?;
        self.at(&format!(
            "ATFCSD30{:02X}{:02X}",
            options.block_size,
            encode_st_min(options.st_min)
        ))?;
        self.at("ATFCSM1")?;

        // ATST counts in units of 4 ms
        let st = (options.timeout.as_millis() / 4).clamp(1, 0xff);
        self.at(&format!("ATST{:02X}", st))?;

        self.configured = Some((*options, bitrate));
        Ok(())
    }

    /// Send one single frame payload and return the frames printed in response.
    pub fn transact(&mut self, data: &[u8], timeout: Duration) -> Result<Vec<(Identifier, Vec<u8>)>> {
        let cmd = hex::encode_upper(data);
        let lines = self.command(&cmd, timeout + RESPONSE_SLACK)?;

        let mut frames = vec![];
        for line in lines {
            if line == "NO DATA" {
                continue;
            }
            match parse_frame(&line) {
                Some(frame) => frames.push(frame),
                None => warn!("Ignoring ELM327 output {:?}", line),
            }
        }
        Ok(frames)
    }

    /// Listen with `ATMA` until `on_frame` returns true or `deadline` passes, then stop monitoring.
    pub fn monitor<F>(&mut self, deadline: Instant, mut on_frame: F) -> Result<()>
    where
        F: FnMut(Identifier, &[u8]) -> Result<bool>,
    {
        self.write_command("ATMA")?;

        let result = loop {
            match self.next_output(deadline) {
                Ok(Output::Line(line)) => {
                    if line == "ATMA" {
                        continue;
                    }
                    if is_bus_error(&line) {
                        break Err(Error::Bus(line).into());
                    }
                    if let Some((id, data)) = parse_frame(&line) {
                        match on_frame(id, &data) {
                            Ok(true) => break Ok(()),
                            Ok(false) => {}
                            Err(e) => break Err(e),
                        }
                    }
                }
                // Monitoring ended on its own
                Ok(Output::Prompt) => return Ok(()),
                Err(e) => break Err(e),
            }
        };

        // Any character ends monitoring, the adapter then prints a prompt
        write_exact(&mut self.port, b"\r")?;
        self.port.flush()?;
        let drain_deadline = Instant::now() + COMMAND_TIMEOUT;
        while let Output::Line(line) = self.next_output(drain_deadline)? {
            debug!("ELM327 after monitor: {}", line);
        }

        result
    }

    fn write_command(&mut self, cmd: &str) -> Result<()> {
        debug!("ELM327 TX {}", cmd);
        self.rx.clear();
        write_exact(&mut self.port, format!("{}\r", cmd).as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    /// Send `cmd` and collect the output lines up to the next prompt. Echoes and status lines are dropped.
    pub fn command(&mut self, cmd: &str, timeout: Duration) -> Result<Vec<String>> {
        self.write_command(cmd)?;

        let deadline = Instant::now() + timeout;
        let mut lines = vec![];
        while let Output::Line(line) = self.next_output(deadline)? {
            debug!("ELM327 RX {}", line);
            if line == cmd || line.starts_with("SEARCHING") || line.starts_with("BUS INIT") {
                continue;
            }
            if line == "?" {
                return Err(Error::Command(cmd.to_string()).into());
            }
            if is_bus_error(&line) {
                return Err(Error::Bus(line).into());
            }
            lines.push(line);
        }

        Ok(lines)
    }

    /// AT command that must be acknowledged with `OK`.
    fn at(&mut self, cmd: &str) -> Result<()> {
        let lines = self.command(cmd, COMMAND_TIMEOUT)?;
        if lines.iter().any(|l| INFO_LINES.contains(&l.as_str())) {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse {
                command: cmd.to_string(),
                response: lines.join(" "),
            }
            .into())
        }
    }

    fn next_output(&mut self, deadline: Instant) -> Result<Output> {
        loop {
            if let Some(pos) = self.rx.iter().position(|&b| b == b'\r' || b == b'\n' || b == PROMPT) {
                let terminator = self.rx[pos];
                let line = self.rx[..pos].trim().to_str_lossy().into_owned();

                if terminator == PROMPT && !line.is_empty() {
                    // Hand out the line now, the prompt on the next call
                    self.rx.drain(..pos);
                } else {
                    self.rx.drain(..=pos);
                }

                if !line.is_empty() {
                    return Ok(Output::Line(line));
                }
                if terminator == PROMPT {
                    return Ok(Output::Prompt);
                }
                continue;
            }

            let mut buf = [0u8; 256];
            match self.port.read(&mut buf) {
                Ok(0) => return Err(crate::Error::Disconnected),
                Ok(n) => self.rx.extend(buf[..n].iter().filter(|&&b| b != 0)),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                }
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(crate::Error::Timeout);
            }
        }
    }
}
