// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Monotonic hardware time sources.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

/// A point on a host clock, in that clock's ticks.
pub type HostTime = u64;

/// A monotonic clock the scheduler anchors musical time to.
pub trait HostClock: Send + Sync {
    /// The current time. Never goes backwards.
    fn now(&self) -> HostTime;

    /// Tick resolution of this clock.
    fn ticks_per_second(&self) -> u64;

    fn ticks_to_duration(&self, ticks: HostTime) -> Duration {
        Duration::from_secs_f64(ticks as f64 / self.ticks_per_second() as f64)
    }

    fn duration_to_ticks(&self, duration: Duration) -> HostTime {
        (duration.as_secs_f64() * self.ticks_per_second() as f64).round() as HostTime
    }
}

/// Nanosecond clock backed by the operating system's monotonic clock.
#[cfg(not(feature = "quanta"))]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(not(feature = "quanta"))]
impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(not(feature = "quanta"))]
impl HostClock for MonotonicClock {
    #[inline]
    fn now(&self) -> HostTime {
        self.origin.elapsed().as_nanos() as HostTime
    }

    fn ticks_per_second(&self) -> u64 {
        1_000_000_000
    }
}

/// Nanosecond clock backed by the TSC through quanta.
#[cfg(feature = "quanta")]
pub struct MonotonicClock {
    clock: quanta::Clock,
    origin: quanta::Instant,
}

#[cfg(feature = "quanta")]
impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        let clock = quanta::Clock::new();
        let origin = clock.now();
        MonotonicClock { clock, origin }
    }
}

#[cfg(feature = "quanta")]
impl HostClock for MonotonicClock {
    #[inline]
    fn now(&self) -> HostTime {
        self.clock.now().duration_since(self.origin).as_nanos() as HostTime
    }

    fn ticks_per_second(&self) -> u64 {
        1_000_000_000
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    ticks: Arc<AtomicU64>,
    ticks_per_second: u64,
}

impl ManualClock {
    /// # Panics
    ///
    /// Panics if `ticks_per_second` is zero.
    pub fn new(ticks_per_second: u64) -> ManualClock {
        assert!(ticks_per_second > 0, "ticks per second must be non-zero");
        ManualClock {
            ticks: Arc::new(AtomicU64::new(0)),
            ticks_per_second,
        }
    }

    pub fn advance(&self, ticks: HostTime) {
        self.ticks.fetch_add(ticks, Ordering::AcqRel);
    }

    pub fn advance_by(&self, duration: Duration) {
        self.advance(self.duration_to_ticks(duration));
    }

    /// Moves the clock to `ticks`. Earlier values are ignored.
    pub fn set(&self, ticks: HostTime) {
        self.ticks.fetch_max(ticks, Ordering::AcqRel);
    }
}

impl HostClock for ManualClock {
    #[inline]
    fn now(&self) -> HostTime {
        self.ticks.load(Ordering::Acquire)
    }

    fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::*;

    #[test]
    fn test_monotonic_clock_moves_forward() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        thread::sleep(Duration::from_millis(5));
        let second = clock.now();
        assert!(second > first);
        assert!(second - first >= clock.duration_to_ticks(Duration::from_millis(4)));
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(48000);
        assert_eq!(clock.now(), 0);

        let shared = clock.clone();
        shared.advance(256);
        assert_eq!(clock.now(), 256);

        clock.advance_by(Duration::from_millis(500));
        assert_eq!(clock.now(), 24256);

        // Never backwards.
        clock.set(10);
        assert_eq!(clock.now(), 24256);
        clock.set(48000);
        assert_eq!(clock.now(), 48000);
        assert_eq!(clock.ticks_to_duration(48000), Duration::from_secs(1));
    }
}
