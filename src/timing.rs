//! Microsecond delays for the sensor driver.
//!
//! Two strategies: busy-waiting on a free-running 32-bit cycle counter, or a
//! coarse millisecond sleep when no usable counter exists. The strategy is
//! picked once when the time source is built and injected into the binding.

use std::fmt;
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use embedded_hal::delay::DelayNs;
use serde::Deserialize;

/// Core clock of the reference board; used when no counter frequency is configured.
pub const DEFAULT_COUNTER_HZ: u32 = 84_000_000;

/// Slowest counter that still resolves a microsecond.
const MIN_COUNTER_HZ: u32 = 1_000_000;

/// Largest wait done against a single start sample, so wraparound stays unambiguous.
const MAX_SPIN_TICKS: u64 = (u32::MAX / 2) as u64;

/// Free-running monotonic tick counter, wrapping at 2^32.
pub trait CycleCounter {
    /// Start the counter. Must be idempotent.
    fn enable(&self);
    fn cycles(&self) -> u32;
    fn frequency_hz(&self) -> u32;
}

/// Millisecond-resolution blocking sleep.
pub trait CoarseSleep {
    fn sleep_ms(&self, ms: u32);
}

/// Which delay strategy to use, as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingStrategy {
    /// Use the cycle counter when it resolves microseconds, else sleep
    #[default]
    Auto,
    CycleCounter,
    Coarse,
}

#[derive(Clone)]
pub enum TimeSource {
    CycleCounter(Rc<dyn CycleCounter>),
    Coarse(Rc<dyn CoarseSleep>),
}

impl fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSource::CycleCounter(c) => write!(f, "CycleCounter({} Hz)", c.frequency_hz()),
            TimeSource::Coarse(_) => write!(f, "Coarse"),
        }
    }
}

impl TimeSource {
    /// Prefer the counter when one is available.
    pub fn probe(counter: Option<Rc<dyn CycleCounter>>, fallback: Rc<dyn CoarseSleep>) -> Self {
        match counter {
            Some(counter) => TimeSource::CycleCounter(counter),
            None => TimeSource::Coarse(fallback),
        }
    }

    /// Host time source: an `Instant`-backed counter at `counter_hz`, or thread sleep.
    pub fn host(strategy: TimingStrategy, counter_hz: u32) -> Self {
        let counter: Option<Rc<dyn CycleCounter>> = match strategy {
            TimingStrategy::Coarse => None,
            TimingStrategy::CycleCounter => Some(Rc::new(InstantCounter::new(counter_hz.max(1)))),
            TimingStrategy::Auto if counter_hz >= MIN_COUNTER_HZ => {
                Some(Rc::new(InstantCounter::new(counter_hz)))
            }
            TimingStrategy::Auto => None,
        };
        Self::probe(counter, Rc::new(ThreadSleep))
    }

    /// One-time activation of the underlying counter. Safe to repeat.
    pub fn activate(&self) {
        if let TimeSource::CycleCounter(counter) = self {
            counter.enable();
        }
    }

    pub fn is_cycle_counter(&self) -> bool {
        matches!(self, TimeSource::CycleCounter(_))
    }

    /// Block for at least `duration_us` microseconds.
    pub fn delay_us(&self, duration_us: u32) {
        match self {
            TimeSource::CycleCounter(counter) => {
                let target = ticks_for(duration_us, counter.frequency_hz());
                if target > 0 {
                    // the start sample may land up to one tick late
                    spin(counter.as_ref(), target + 1);
                }
            }
            TimeSource::Coarse(sleeper) => {
                if duration_us == 0 {
                    return;
                }
                sleeper.sleep_ms(duration_us.div_ceil(1000));
            }
        }
    }
}

impl DelayNs for TimeSource {
    fn delay_ns(&mut self, ns: u32) {
        self.delay_us(ns.div_ceil(1000));
    }

    fn delay_us(&mut self, us: u32) {
        TimeSource::delay_us(self, us);
    }
}

/// Counter ticks covering `duration_us`, rounded up.
pub fn ticks_for(duration_us: u32, frequency_hz: u32) -> u64 {
    (duration_us as u64 * frequency_hz as u64).div_ceil(1_000_000)
}

fn spin(counter: &dyn CycleCounter, mut remaining: u64) {
    while remaining > 0 {
        let chunk = remaining.min(MAX_SPIN_TICKS) as u32;
        let start = counter.cycles();
        while counter.cycles().wrapping_sub(start) < chunk {
            std::hint::spin_loop();
        }
        remaining -= chunk as u64;
    }
}

static COUNTER_EPOCH: OnceLock<Instant> = OnceLock::new();

/// 32-bit cycle counter emulated from the process-wide monotonic clock.
///
/// Starts on first use, so `enable` only pins the epoch earlier.
pub struct InstantCounter {
    frequency_hz: u32,
}

impl InstantCounter {
    pub fn new(frequency_hz: u32) -> Self {
        Self { frequency_hz }
    }
}

impl CycleCounter for InstantCounter {
    fn enable(&self) {
        COUNTER_EPOCH.get_or_init(Instant::now);
    }

    fn cycles(&self) -> u32 {
        let epoch = COUNTER_EPOCH.get_or_init(Instant::now);
        let ticks = epoch.elapsed().as_nanos() * self.frequency_hz as u128 / 1_000_000_000;
        ticks as u32
    }

    fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }
}

pub struct ThreadSleep;

impl CoarseSleep for ThreadSleep {
    fn sleep_ms(&self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}
