// src/sampler.rs
use crate::error::SensorError;
use crate::link::Link;
use crate::types::SensorMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Wakes the UI thread after a message has been queued.
pub type Notify = Box<dyn Fn() + Send>;

/// Parses one device line as a distance.
pub fn parse_reading(line: &str) -> Result<f64, SensorError> {
    line.trim().parse::<f64>().map_err(|source| SensorError::Parse {
        line: line.to_owned(),
        source,
    })
}

/// Background poll loop. Owns the link while running and hands it back on exit;
/// it never closes the link itself.
pub struct Sampler {
    link: Box<dyn Link>,
    running: Arc<AtomicBool>,
    tx: Sender<SensorMessage>,
    idle_interval: Duration,
    read_timeout: Duration,
    notify: Option<Notify>,
}

impl Sampler {
    pub fn new(
        link: Box<dyn Link>,
        running: Arc<AtomicBool>,
        tx: Sender<SensorMessage>,
        idle_interval: Duration,
        read_timeout: Duration,
    ) -> Self {
        Self {
            link,
            running,
            tx,
            idle_interval,
            read_timeout,
            notify: None,
        }
    }

    pub fn with_notify(mut self, notify: Notify) -> Self {
        self.notify = Some(notify);
        self
    }

    pub fn spawn(self) -> Result<JoinHandle<Box<dyn Link>>, SensorError> {
        let handle = thread::Builder::new()
            .name("sampler".to_owned())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// Polls until the Run Flag is cleared. Stop is observed within one idle
    /// interval plus one read timeout.
    pub fn run(mut self) -> Box<dyn Link> {
        log::info!("Sampler started on {}", self.link.describe());

        if self.wait_for_settle() {
            self.publish(SensorMessage::Ready(Instant::now()));
            while self.running.load(Ordering::Acquire) {
                match self.link.read_line(self.read_timeout) {
                    Ok(Some(line)) => self.handle_line(line),
                    Ok(None) => thread::sleep(self.idle_interval),
                    Err(e) => {
                        log::warn!("Read failed: {e}");
                        self.publish(SensorMessage::ReadFailed {
                            error: e.to_string(),
                            link_lost: e.is_link_lost(),
                        });
                        thread::sleep(self.idle_interval);
                    }
                }
            }
        }

        log::info!("Sampler stopped");
        self.publish(SensorMessage::Stopped);
        self.link
    }

    /// Sleeps off the device reset delay. Returns false if stopped meanwhile.
    fn wait_for_settle(&self) -> bool {
        let ready_at = Instant::now() + self.link.settle_delay();
        loop {
            if !self.running.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= ready_at {
                return true;
            }
            thread::sleep(self.idle_interval.min(ready_at - now));
        }
    }

    fn handle_line(&self, line: String) {
        match parse_reading(&line) {
            Ok(value) => self.publish(SensorMessage::Reading {
                value,
                raw: line,
                captured_at: Instant::now(),
            }),
            Err(e) => {
                log::warn!("{e}");
                self.publish(SensorMessage::Rejected {
                    raw: line,
                    error: e.to_string(),
                });
            }
        }
    }

    fn publish(&self, msg: SensorMessage) {
        // A closed receiver means the window is gone; the run flag ends the loop.
        self.tx.send(msg).ok();
        if let Some(notify) = &self.notify {
            notify();
        }
    }
}
