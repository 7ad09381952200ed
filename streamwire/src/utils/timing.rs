//! Clock sources and timestamp unit conversions.
//!
//! PTS values count a 90 kHz clock in 33 bits. PCR values split a 27 MHz
//! clock into a 33-bit base at 90 kHz and a 9-bit extension counting the
//! remaining 27 MHz ticks (0..300).

use std::time::Instant;

/// System time base of the transport layer.
pub const SYSTEM_CLOCK_HZ: u64 = 27_000_000;

/// Time base of PTS values and of the PCR base.
pub const PTS_CLOCK_HZ: u64 = 90_000;

/// PTS and PCR base values wrap at 33 bits.
pub const TIMESTAMP_MASK: u64 = (1 << 33) - 1;

const MICROS_PER_SECOND: u64 = 1_000_000;

/// Source of the reference clock written into adaptation fields.
pub trait ReferenceClock {
    /// Current reference time in microseconds.
    fn now_us(&self) -> u64;
}

/// Monotonic clock counting microseconds since its construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl ReferenceClock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

impl<F: Fn() -> u64> ReferenceClock for F {
    fn now_us(&self) -> u64 {
        self()
    }
}

/// Converts microseconds to 90 kHz ticks, wrapped to 33 bits.
pub fn micros_to_pts(us: u64) -> u64 {
    ((us as u128 * PTS_CLOCK_HZ as u128 / MICROS_PER_SECOND as u128) as u64) & TIMESTAMP_MASK
}

/// Program clock reference split into its wire fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pcr {
    /// 33-bit base at 90 kHz.
    pub base: u64,
    /// 9-bit extension at 27 MHz, always below 300.
    pub extension: u16,
}

impl Pcr {
    pub fn from_micros(us: u64) -> Self {
        let ticks = us as u128 * SYSTEM_CLOCK_HZ as u128 / MICROS_PER_SECOND as u128;
        Self {
            base: ((ticks / 300) as u64) & TIMESTAMP_MASK,
            extension: (ticks % 300) as u16,
        }
    }

    /// Total value in 27 MHz ticks.
    pub fn ticks(&self) -> u64 {
        self.base * 300 + self.extension as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_from_micros() {
        assert_eq!(micros_to_pts(0), 0);
        assert_eq!(micros_to_pts(1_000_000), 90_000);
        assert_eq!(micros_to_pts(23_219), 2_089);
    }

    #[test]
    fn pts_wraps_at_33_bits() {
        let wrap_us = (1u64 << 33) * 1_000_000 / 90_000;
        assert!(micros_to_pts(wrap_us + 1_000_000) < 100_000);
    }

    #[test]
    fn pcr_split() {
        let pcr = Pcr::from_micros(1_000_001);
        assert_eq!(pcr.base, 90_000);
        assert_eq!(pcr.extension, 27);
        assert_eq!(pcr.ticks(), 27_000_027);
    }

    #[test]
    fn closure_clock() {
        let clock = || 42u64;
        assert_eq!(clock.now_us(), 42);
    }
}
