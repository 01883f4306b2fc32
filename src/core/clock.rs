use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of timestamps used to time a run.
///
/// The slice pipeline only ever subtracts two readings, so any monotonic
/// nanosecond counter works; tests substitute a scripted clock.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current timestamp in nanoseconds since the UNIX epoch.
    fn now(&self) -> u64;

    /// Time elapsed since an earlier `now()` reading.
    fn elapsed_since(&self, start_ns: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(start_ns))
    }
}

/// A clock that uses the CPU's Time-Stamp Counter (TSC) via the `quanta` crate.
///
/// Monotonic and cheap to read. It anchors to SystemTime at construction and
/// then uses TSC ticks to progress, so it never jumps backwards.
#[derive(Debug, Clone)]
pub struct QuantaClock {
    clock: quanta::Clock,
    start_wall_ns: u64,
    start_instant: quanta::Instant,
}

impl QuantaClock {
    pub fn new() -> Self {
        let clock = quanta::Clock::new();
        let start_instant = clock.now();
        Self {
            clock,
            start_wall_ns: wall_clock_ns(),
            start_instant,
        }
    }
}

impl Default for QuantaClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for QuantaClock {
    fn now(&self) -> u64 {
        let delta = self.clock.now().duration_since(self.start_instant);
        self.start_wall_ns
            .saturating_add(u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX))
    }
}

/// One-time process start-up for timekeeping.
///
/// Calibrates the TSC clock and returns it. Call once before constructing any
/// time window or opening any log, then pass the clock down explicitly.
pub fn initialize() -> QuantaClock {
    let clock = QuantaClock::new();
    log::debug!("clock initialized at {} ns", clock.now());
    clock
}

fn wall_clock_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
