//! Tick timing statistics.

use std::time::Duration;

use serde::Serialize;

/// Interval between deadline-miss warnings, in missed ticks.
pub(crate) const OVERRUN_WARN_EVERY: u64 = 100;

/// Accumulated timing of executed ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TickStats {
    /// Ticks executed, including those run with `step`.
    pub ticks: u64,
    /// Deadlines missed by the scheduling loop.
    pub overruns: u64,
    /// Boundaries skipped to resynchronise after misses.
    pub skipped: u64,
    #[serde(serialize_with = "secs")]
    pub total: Duration,
    #[serde(serialize_with = "secs")]
    pub worst: Duration,
    #[serde(serialize_with = "secs")]
    pub last: Duration,
}

fn secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl TickStats {
    pub(crate) fn record(&mut self, elapsed: Duration) {
        self.ticks += 1;
        self.total += elapsed;
        self.last = elapsed;
        self.worst = self.worst.max(elapsed);
    }

    /// Record a miss; returns true when a summary warning is due.
    pub(crate) fn record_overrun(&mut self, skipped: u64) -> bool {
        self.overruns += 1;
        self.skipped += skipped;
        self.overruns % OVERRUN_WARN_EVERY == 1
    }

    pub fn average(&self) -> Duration {
        match u32::try_from(self.ticks) {
            Ok(0) => Duration::ZERO,
            Ok(n) => self.total / n,
            Err(_) => Duration::from_secs_f64(self.total.as_secs_f64() / self.ticks as f64),
        }
    }
}
