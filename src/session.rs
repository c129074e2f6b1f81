// src/session.rs
use crate::types::Sample;
use std::time::Instant;

/// Samples collected since the last Clear, in arrival order.
///
/// Lives on the UI thread; the sampler reaches it only through the message
/// channel, so no lock is needed and a redraw never sees a half-cleared store.
#[derive(Default, Debug)]
pub struct SessionStore {
    samples: Vec<Sample>,
    epoch: Option<Instant>,
}

impl SessionStore {
    /// Sets the session epoch when the link is ready. A store that already
    /// holds samples keeps its epoch so a resumed run continues the same axis.
    pub fn begin(&mut self, now: Instant) {
        if self.epoch.is_none() || self.is_empty() {
            self.epoch = Some(now);
        }
    }

    /// Records a reading captured at `at`. Readings captured before the epoch
    /// (in flight across a Clear) are stamped 0.
    pub fn append(&mut self, value: f64, at: Instant) -> Sample {
        let epoch = *self.epoch.get_or_insert(at);
        let timestamp = at.saturating_duration_since(epoch).as_secs_f64();
        // Keep timestamps non-decreasing even if a stale reading arrives late.
        let timestamp = self
            .samples
            .last()
            .map_or(timestamp, |last| timestamp.max(last.timestamp));
        let sample = Sample { timestamp, value };
        self.samples.push(sample);
        sample
    }

    /// Empties the store. `rebase` restarts the epoch there (Clear while running);
    /// otherwise the next Start sets it.
    pub fn clear(&mut self, rebase: Option<Instant>) {
        self.samples.clear();
        self.epoch = rebase;
    }

    pub fn snapshot(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
