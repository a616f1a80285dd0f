//! Remote NTP time estimation
//!
//! Maps RTP timestamps of a remote stream to the local NTP clock using the
//! (NTP, RTP) pairs carried in RTCP sender reports and the measured RTT.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::{ntp_to_ms, Clock};

/// Sender reports needed before an estimate is available
const REQUIRED_REPORTS: usize = 2;

/// Smoothing factor for the sender-to-receiver offset
const OFFSET_SMOOTHING: i64 = 4;

/// Estimates the local NTP capture time of remote RTP timestamps
pub trait ClockOffsetEstimator: Send + Sync {
    /// Feed one sender report; returns false if it was rejected as stale
    fn update_rtcp_timestamp(&self, rtt_ms: i64, ntp_secs: u32, ntp_frac: u32, rtp_timestamp: u32) -> bool;

    /// Local NTP time in ms at which `rtp_timestamp` was captured
    fn estimate(&self, rtp_timestamp: u32) -> Option<i64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SenderReport {
    ntp_ms: i64,
    ntp_secs: u32,
    ntp_frac: u32,
    rtp_timestamp: u32,
}

#[derive(Debug, Default)]
struct EstimatorState {
    reports: VecDeque<SenderReport>,
    /// Receiver clock minus sender NTP clock
    offset_ms: Option<i64>,
}

impl EstimatorState {
    /// Sender NTP time of `rtp_timestamp`, interpolated from the two reports
    fn rtp_to_ntp_ms(&self, rtp_timestamp: u32) -> Option<i64> {
        let (older, newer) = match (self.reports.front(), self.reports.back()) {
            (Some(a), Some(b)) if self.reports.len() >= REQUIRED_REPORTS => (a, b),
            _ => return None,
        };

        let rtp_span = i64::from(newer.rtp_timestamp.wrapping_sub(older.rtp_timestamp));
        let ntp_span = newer.ntp_ms - older.ntp_ms;
        if rtp_span <= 0 || ntp_span <= 0 {
            return None;
        }

        let rtp_diff = i64::from(rtp_timestamp.wrapping_sub(newer.rtp_timestamp) as i32);
        Some(newer.ntp_ms + rtp_diff * ntp_span / rtp_span)
    }
}

/// Shipped [`ClockOffsetEstimator`]
pub struct RemoteNtpEstimator {
    clock: Arc<dyn Clock>,
    state: Mutex<EstimatorState>,
}

impl RemoteNtpEstimator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(EstimatorState::default()),
        }
    }

    /// Number of sender reports currently held
    pub fn report_count(&self) -> usize {
        self.state.lock().reports.len()
    }
}

impl ClockOffsetEstimator for RemoteNtpEstimator {
    fn update_rtcp_timestamp(&self, rtt_ms: i64, ntp_secs: u32, ntp_frac: u32, rtp_timestamp: u32) -> bool {
        let report = SenderReport {
            ntp_ms: ntp_to_ms(ntp_secs, ntp_frac),
            ntp_secs,
            ntp_frac,
            rtp_timestamp,
        };

        let mut state = self.state.lock();
        if let Some(last) = state.reports.back() {
            if last.ntp_secs == ntp_secs && last.ntp_frac == ntp_frac {
                // Same report seen again
                return true;
            }
            if report.ntp_ms <= last.ntp_ms {
                tracing::debug!(ntp_ms = report.ntp_ms, last_ntp_ms = last.ntp_ms, "Stale sender report");
                return false;
            }
        }

        state.reports.push_back(report);
        while state.reports.len() > REQUIRED_REPORTS {
            state.reports.pop_front();
        }

        let arrival_ms = self.clock.now_ms();
        let sample = arrival_ms - (report.ntp_ms + rtt_ms / 2);
        state.offset_ms = Some(match state.offset_ms {
            Some(offset) => offset + (sample - offset) / OFFSET_SMOOTHING,
            None => sample,
        });
        true
    }

    fn estimate(&self, rtp_timestamp: u32) -> Option<i64> {
        let state = self.state.lock();
        let sender_capture_ms = state.rtp_to_ntp_ms(rtp_timestamp)?;
        let receiver_capture_ms = sender_capture_ms + state.offset_ms?;
        Some(receiver_capture_ms + self.clock.ntp_offset_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;

    /// NTP seconds/fraction for a whole number of milliseconds
    fn ntp(ms: i64) -> (u32, u32) {
        let secs = (ms / 1000) as u32;
        let frac = (((ms % 1000) as u64) << 32) / 1000;
        (secs, frac as u32)
    }

    fn setup() -> (Arc<SimulatedClock>, RemoteNtpEstimator) {
        let clock = Arc::new(SimulatedClock::new(50_000));
        let estimator = RemoteNtpEstimator::new(clock.clone());
        (clock, estimator)
    }

    #[test]
    fn test_needs_two_reports() {
        let (_, estimator) = setup();
        assert_eq!(estimator.estimate(0), None);

        let (s, f) = ntp(1_000_000);
        assert!(estimator.update_rtcp_timestamp(100, s, f, 90_000));
        assert_eq!(estimator.estimate(90_000), None);
    }

    #[test]
    fn test_estimate_maps_to_local_ntp() {
        let (clock, estimator) = setup();

        // Sender clock runs 1_000_000 ms; arrives 50 ms later one-way
        let (s, f) = ntp(1_000_000);
        clock.set_ms(50_050);
        assert!(estimator.update_rtcp_timestamp(100, s, f, 90_000));

        let (s, f) = ntp(1_001_000);
        clock.set_ms(51_050);
        assert!(estimator.update_rtcp_timestamp(100, s, f, 180_000));
        assert_eq!(estimator.report_count(), 2);

        // Captured 500 ms after the second report on the sender
        let estimate = estimator.estimate(225_000).unwrap();
        assert_eq!(estimate, 51_500 + clock.ntp_offset_ms());
    }

    #[test]
    fn test_duplicate_and_stale_reports() {
        let (_, estimator) = setup();
        let (s, f) = ntp(2_000_000);
        assert!(estimator.update_rtcp_timestamp(10, s, f, 1000));
        assert!(estimator.update_rtcp_timestamp(10, s, f, 1000));
        assert_eq!(estimator.report_count(), 1);

        let (s, f) = ntp(1_999_000);
        assert!(!estimator.update_rtcp_timestamp(10, s, f, 500));
        assert_eq!(estimator.report_count(), 1);
    }
}
