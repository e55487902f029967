//! Error types for ELM327 adapters

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The adapter answered `?` to a command.
    #[error("Command not understood: {0}")]
    Command(String),
    /// The adapter reported a problem on the vehicle bus, e.g. `CAN ERROR` or `BUFFER FULL`.
    #[error("Bus error: {0}")]
    Bus(String),
    #[error("Unexpected response to {command}: {response}")]
    UnexpectedResponse { command: String, response: String },
    #[error(transparent)]
    SerialPort(#[from] serialport::Error),
}
