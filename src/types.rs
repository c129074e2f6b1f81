// src/types.rs
use std::time::Instant;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum LinkState {
    Disconnected,
    Connected,
}

/// User actions exposed by the window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuiCommand {
    Start,
    Stop,
    Clear,
}

/// Events published by the sampler thread to the UI thread.
#[derive(Clone, Debug)]
pub enum SensorMessage {
    /// A line parsed as a distance.
    Reading {
        value: f64,
        raw: String,
        captured_at: Instant,
    },
    /// A line that was not a number; nothing is recorded.
    Rejected { raw: String, error: String },
    /// The settle delay is over; timestamps count from here.
    Ready(Instant),
    /// The link failed while polling. `link_lost` marks a device that is gone.
    ReadFailed { error: String, link_lost: bool },
    /// The worker observed the cleared Run Flag and exited.
    Stopped,
}

/// One distance reading, `timestamp` in seconds since the session epoch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: f64,
    pub value: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    Info,
    Data,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub kind: LogKind,
    pub text: String,
}
