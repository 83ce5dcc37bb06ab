use std::time::{Duration, Instant};

/// Master crystal frequency in Hz.
///
/// Everything else in the machine derives its rate from this by integer
/// division: the CPU and bus tick every 12th master tick, the PPU every 4th,
/// which keeps the two in a fixed 1:3 phase relationship.
pub const MASTER_CLOCK_HZ: u64 = 236_250_000;

/// Master clock driver.
///
/// Holds a list of `(period, callback)` divisor registrations. On every
/// master tick, each divisor whose period evenly divides the tick count fires,
/// in registration order. Real-time pacing sleeps to the absolute deadline of
/// each tick rather than a relative duration, so scheduling jitter never
/// accumulates across ticks.
pub struct Clock {
    frequency_hz: u64,
    ticks: u64,
    divisors: Vec<Divisor>,
}

struct Divisor {
    period: u64,
    callback: Box<dyn FnMut()>,
}

impl Clock {
    pub fn new() -> Self {
        Self::with_frequency(MASTER_CLOCK_HZ)
    }

    pub fn with_frequency(frequency_hz: u64) -> Self {
        Self {
            frequency_hz,
            ticks: 0,
            divisors: Vec::new(),
        }
    }

    /// Register a callback to fire once every `period` master ticks.
    ///
    /// Divisors registered first fire first within a tick.
    ///
    /// Panics if `period` is zero: a zero divisor has no firing schedule and
    /// would fault on the modulo at the first tick, so registration is the
    /// place the contract is enforced.
    pub fn add_divisor(&mut self, period: u64, callback: impl FnMut() + 'static) {
        assert!(period > 0, "divisor period must be non-zero");
        self.divisors.push(Divisor {
            period,
            callback: Box::new(callback),
        });
    }

    /// Number of master ticks executed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Execute one master tick without any real-time pacing.
    pub fn step(&mut self) {
        let tick = self.ticks;
        for div in &mut self.divisors {
            if tick % div.period == 0 {
                (div.callback)();
            }
        }
        self.ticks += 1;
    }

    /// Execute `count` master ticks without pacing.
    pub fn step_n(&mut self, count: u64) {
        for _ in 0..count {
            self.step();
        }
    }

    /// Run at the nominal rate while `keep_running` returns true.
    ///
    /// The predicate is checked before every master tick, so the driving loop
    /// can stop the machine when the CPU reports a halt.
    pub fn run_while(&mut self, mut keep_running: impl FnMut() -> bool) {
        let start = Instant::now();
        let first_tick = self.ticks;
        while keep_running() {
            self.step();
            let deadline = start + self.deadline_offset(self.ticks - first_tick);
            if let Some(remaining) = deadline.checked_duration_since(Instant::now()) {
                std::thread::sleep(remaining);
            }
        }
    }

    /// Run forever at the nominal rate.
    pub fn run(&mut self) {
        self.run_while(|| true);
    }

    /// Absolute offset of the deadline for the given tick count.
    ///
    /// Computed from the tick index each time (not accumulated) so rounding
    /// error stays bounded by one nanosecond no matter how long we run.
    fn deadline_offset(&self, elapsed_ticks: u64) -> Duration {
        let nanos = (u128::from(elapsed_ticks) * 1_000_000_000) / u128::from(self.frequency_hz);
        Duration::from_nanos(nanos as u64)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
