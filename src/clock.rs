//! Time sources
//!
//! The pipeline and the NTP estimator read time through [`Clock`] so tests
//! can drive them with a [`SimulatedClock`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Milliseconds between the NTP epoch (1900) and the Unix epoch (1970)
pub const NTP_UNIX_OFFSET_MS: i64 = 2_208_988_800_000;

/// Millisecond clock
pub trait Clock: Send + Sync {
    /// Monotonic milliseconds
    fn now_ms(&self) -> i64;

    /// Offset to add to [`Clock::now_ms`] to get NTP milliseconds
    fn ntp_offset_ms(&self) -> i64;

    /// Current time in NTP milliseconds
    fn now_ntp_ms(&self) -> i64 {
        self.now_ms() + self.ntp_offset_ms()
    }
}

/// Wall clock backed by a monotonic [`Instant`]
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
    ntp_origin_ms: i64,
}

impl SystemClock {
    pub fn new() -> Self {
        let unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        Self {
            origin: Instant::now(),
            ntp_origin_ms: unix_ms + NTP_UNIX_OFFSET_MS,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        // Offset by one so a fresh clock never reports zero, which
        // statistics treat as "nothing received yet".
        self.origin.elapsed().as_millis() as i64 + 1
    }

    fn ntp_offset_ms(&self) -> i64 {
        self.ntp_origin_ms - 1
    }
}

/// Manually advanced clock
#[derive(Debug)]
pub struct SimulatedClock {
    now_ms: AtomicI64,
    ntp_offset_ms: i64,
}

impl SimulatedClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
            ntp_offset_ms: NTP_UNIX_OFFSET_MS,
        }
    }

    /// Move time forward
    pub fn advance_ms(&self, delta: i64) {
        self.now_ms.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn set_ms(&self, now: i64) {
        self.now_ms.store(now, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn ntp_offset_ms(&self) -> i64 {
        self.ntp_offset_ms
    }
}

/// Convert an NTP timestamp (seconds, 2^-32 fraction) to milliseconds
pub fn ntp_to_ms(seconds: u32, fraction: u32) -> i64 {
    let frac_ms = ((fraction as u64 * 1000 + (1 << 31)) >> 32) as i64;
    seconds as i64 * 1000 + frac_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_clock_advance() {
        let clock = SimulatedClock::new(1000);
        clock.advance_ms(250);
        assert_eq!(clock.now_ms(), 1250);
        assert_eq!(clock.now_ntp_ms(), 1250 + NTP_UNIX_OFFSET_MS);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn test_ntp_to_ms() {
        assert_eq!(ntp_to_ms(1, 0), 1000);
        // Half a second
        assert_eq!(ntp_to_ms(2, 1 << 31), 2500);
        // Rounds to nearest millisecond
        assert_eq!(ntp_to_ms(0, u32::MAX), 1000);
    }
}
