// src/simulator.rs
use crate::config::SensorConfig;
use crate::error::SensorError;
use crate::link::{Connector, Link};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

const MIN_CM: f64 = 2.0;
const MAX_CM: f64 = 400.0;

/// Stand-in for the HC-SR04 board: a random walk printed as `"{:.2}"` lines,
/// one every `period`, with the odd garbled line mixed in.
pub struct SimulatedLink {
    rng: StdRng,
    distance: f64,
    period: Duration,
    next_due: Instant,
    garble_rate: f64,
}

impl SimulatedLink {
    pub fn new(rng: StdRng, period: Duration) -> Self {
        Self {
            rng,
            distance: 50.0,
            period,
            next_due: Instant::now(),
            garble_rate: 0.02,
        }
    }

    fn next_text(&mut self) -> String {
        if self.rng.gen_bool(self.garble_rate) {
            return "ERR?".to_owned();
        }
        let step: f64 = self.rng.gen_range(-3.0..3.0);
        self.distance = (self.distance + step).clamp(MIN_CM, MAX_CM);
        format!("{:.2}", self.distance)
    }
}

impl Link for SimulatedLink {
    fn read_line(&mut self, _timeout: Duration) -> Result<Option<String>, SensorError> {
        let now = Instant::now();
        if now < self.next_due {
            return Ok(None);
        }
        self.next_due = now + self.period;
        Ok(Some(self.next_text()))
    }

    fn describe(&self) -> String {
        "simulated sensor".to_owned()
    }
}

pub struct SimulatedConnector {
    period: Duration,
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
        }
    }
}

impl Connector for SimulatedConnector {
    fn connect(&self, config: &SensorConfig) -> Result<Box<dyn Link>, SensorError> {
        log::info!("Simulation mode: ignoring {} @ {}", config.address, config.baud_rate);
        Ok(Box::new(SimulatedLink::new(StdRng::from_entropy(), self.period)))
    }
}
