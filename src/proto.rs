pub mod codec;
pub mod command;
pub mod link;
pub mod response;
pub mod transport;

#[cfg(test)]
pub mod fake;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("I/O error: {:?}", _0)]
    Io(#[from] std::io::Error),

    #[error("Serial I/O error: {:?}", _0)]
    Serial(#[from] tokio_serial::Error),

    #[error("No device with VID {vid:#06x} / PID {pid:#06x} found")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open {port}: {source}")]
    Connection {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("Timed out waiting for {expected:?}, got {} bytes", .partial.len())]
    TimeoutTruncated { expected: String, partial: Vec<u8> },

    #[error("Length mismatch: expected {expected} values, found {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Unable to parse {input:?}: {reason}")]
    Parse { input: String, reason: String },

    #[error("Nothing to average")]
    EmptyAverage,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Connection was closed")]
    Abort,
}

impl ProtoError {
    pub(crate) fn parse(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            input: input.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
