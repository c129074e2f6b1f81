// src/config.rs
use crate::types::ConnectionMode;
use anyhow::{bail, Context, Result};
use std::time::Duration;

pub const DEFAULT_PORT: &str = "COM3";
pub const DEFAULT_BAUD: u32 = 9600;

/// Device parameters, fixed for the lifetime of the process.
#[derive(Clone, Debug, PartialEq)]
pub struct SensorConfig {
    pub mode: ConnectionMode,
    pub address: String,
    pub baud_rate: u32,
    /// Upper bound for a single `read_line` poll.
    pub read_timeout: Duration,
    /// The board resets when the port opens; nothing is read before this elapses.
    pub settle_delay: Duration,
    /// Sleep between polls that returned no data.
    pub idle_interval: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            mode: ConnectionMode::Hardware,
            address: DEFAULT_PORT.to_owned(),
            baud_rate: DEFAULT_BAUD,
            read_timeout: Duration::from_secs(1),
            settle_delay: Duration::from_secs(2),
            idle_interval: Duration::from_millis(100),
        }
    }
}

impl SensorConfig {
    /// Reads `DISTANCE_PORT`, `DISTANCE_BAUD` and `DISTANCE_SIMULATE`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), scan_ports)
    }

    fn from_lookup<F, S>(lookup: F, scan: S) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
        S: FnOnce() -> Vec<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("DISTANCE_SIMULATE") {
            if parse_flag(&raw).with_context(|| format!("DISTANCE_SIMULATE={raw}"))? {
                config.mode = ConnectionMode::Simulation;
            }
        }

        if let Some(raw) = lookup("DISTANCE_BAUD") {
            config.baud_rate = raw
                .trim()
                .parse()
                .with_context(|| format!("DISTANCE_BAUD must be a positive integer, got {raw:?}"))?;
            if config.baud_rate == 0 {
                bail!("DISTANCE_BAUD must be a positive integer, got 0");
            }
        }

        match lookup("DISTANCE_PORT") {
            Some(port) if !port.trim().is_empty() => config.address = port.trim().to_owned(),
            _ if config.mode == ConnectionMode::Hardware => {
                let ports = scan();
                log::info!("Serial ports found: {:?}", ports);
                if let Some(first) = ports.into_iter().next() {
                    config.address = first;
                }
            }
            _ => {}
        }

        Ok(config)
    }
}

fn scan_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            log::warn!("Port scan failed: {e}");
            Vec::new()
        }
    }
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("expected a boolean, got {other:?}"),
    }
}
