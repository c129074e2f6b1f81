// src/error.rs
use std::io::ErrorKind;
use std::num::ParseFloatError;

/// Everything that can go wrong between the device and the session.
///
/// None of these are fatal: a `Connection` error aborts Start, the other two
/// are logged and the sampler keeps polling.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// Opening the device failed.
    #[error("could not connect to {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: serialport::Error,
    },

    /// A received line is not a decimal number.
    #[error("invalid reading {line:?}: {source}")]
    Parse {
        line: String,
        #[source]
        source: ParseFloatError,
    },

    /// Any other failure while polling the link.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serialport::Error> for SensorError {
    fn from(err: serialport::Error) -> Self {
        SensorError::Io(err.into())
    }
}

impl SensorError {
    /// True when the device has gone away (unplugged, port closed under us).
    pub fn is_link_lost(&self) -> bool {
        match self {
            SensorError::Io(e) => matches!(
                e.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionReset
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotFound
            ),
            _ => false,
        }
    }

    pub fn connection(address: &str, source: serialport::Error) -> Self {
        SensorError::Connection {
            address: address.to_owned(),
            source,
        }
    }
}
