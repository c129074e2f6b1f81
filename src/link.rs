// src/link.rs
use crate::config::SensorConfig;
use crate::error::SensorError;
use serialport::SerialPort;
use std::io::{ErrorKind, Read};
use std::time::Duration;

/// An open, line-oriented device connection.
///
/// `read_line` never blocks past `timeout`: if no complete line is buffered it
/// returns `Ok(None)` and the caller decides how long to idle.
pub trait Link: Send {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, SensorError>;

    /// Time the device needs after opening before it produces valid data.
    fn settle_delay(&self) -> Duration {
        Duration::ZERO
    }

    fn describe(&self) -> String;

    /// Releases the OS handle.
    fn close(self: Box<Self>) {
        log::info!("Link closed: {}", self.describe());
    }
}

/// Opens links. Only one link may be open at a time; the controller enforces that.
pub trait Connector: Send {
    fn connect(&self, config: &SensorConfig) -> Result<Box<dyn Link>, SensorError>;
}

/// Splits a byte stream into trimmed, non-empty text lines.
#[derive(Default, Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Pops the next complete line. Partial lines stay buffered.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_owned());
            }
        }
        None
    }
}

/// Serial port wrapper for the distance sensor board.
pub struct SerialLink {
    port_name: String,
    port: Box<dyn SerialPort>,
    lines: LineBuffer,
    timeout: Duration,
    settle_delay: Duration,
}

impl SerialLink {
    /// Opens `config.address` at `config.baud_rate`, 8N1, no flow control.
    pub fn open(config: &SensorConfig) -> Result<Self, SensorError> {
        let port = serialport::new(&config.address, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| SensorError::connection(&config.address, e))?;

        Ok(Self {
            port_name: config.address.clone(),
            port,
            lines: LineBuffer::default(),
            timeout: config.read_timeout,
            settle_delay: config.settle_delay,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Link for SerialLink {
    fn read_line(&mut self, timeout: Duration) -> Result<Option<String>, SensorError> {
        if let Some(line) = self.lines.next_line() {
            return Ok(Some(line));
        }

        let waiting = self.port.bytes_to_read()?;
        if waiting == 0 {
            return Ok(None);
        }

        if timeout != self.timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }

        let mut chunk = vec![0u8; waiting as usize];
        match self.port.read(&mut chunk) {
            Ok(n) => self.lines.extend(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self.lines.next_line())
    }

    fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    fn describe(&self) -> String {
        self.port_name.clone()
    }
}

#[derive(Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn connect(&self, config: &SensorConfig) -> Result<Box<dyn Link>, SensorError> {
        let link = SerialLink::open(config)?;
        log::info!("Opened {} at {} baud", link.port_name(), config.baud_rate);
        Ok(Box::new(link))
    }
}
