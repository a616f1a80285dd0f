//! Per-SSRC receive statistics
//!
//! Tracks sequence-number progress, interarrival jitter (RFC 3550 A.8) and
//! data counters for every remote SSRC, and answers the two questions the
//! receive pipeline asks of each packet: is it in order, and is it a late
//! retransmission of something already played out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::protocol::constants::DEFAULT_MAX_REORDERING_THRESHOLD;
use crate::protocol::PacketHeader;

use super::metrics::StreamDataCounters;

/// Jitter updates are skipped above this many samples (5 s of video)
const MAX_JITTER_SAMPLES: i64 = 450_000;

/// Receive-side statistics consulted by the pipeline
pub trait StatisticsCollector: Send + Sync {
    /// Whether `sequence_number` is in order for `ssrc`; false without history
    fn is_packet_in_order(&self, ssrc: u32, sequence_number: u16) -> bool;

    /// Whether an out-of-order packet arrived too late to be a reordering
    fn is_retransmit_of_old_packet(&self, header: &PacketHeader, min_rtt_ms: i64) -> bool;

    /// Account a received media packet
    fn incoming_packet(&self, header: &PacketHeader, packet_length: usize, retransmitted: bool);

    /// Account a received ULPFEC packet
    fn fec_packet_received(&self, header: &PacketHeader, packet_length: usize);

    fn set_max_reordering_threshold(&self, threshold: u16);
}

/// RFC 1982 serial number comparison
pub fn is_newer_sequence_number(sequence_number: u16, previous: u16) -> bool {
    sequence_number != previous && sequence_number.wrapping_sub(previous) < 0x8000
}

/// Statistics for one remote SSRC
#[derive(Debug, Clone)]
pub struct StreamStatistician {
    max_reordering_threshold: u16,
    received_seq_first: u16,
    received_seq_max: u16,
    received_seq_wraps: u32,
    last_received_timestamp: u32,
    last_receive_time_ms: Option<i64>,
    jitter_q4: u32,
    counters: StreamDataCounters,
}

impl StreamStatistician {
    fn new(max_reordering_threshold: u16) -> Self {
        Self {
            max_reordering_threshold,
            received_seq_first: 0,
            received_seq_max: 0,
            received_seq_wraps: 0,
            last_received_timestamp: 0,
            last_receive_time_ms: None,
            jitter_q4: 0,
            counters: StreamDataCounters::default(),
        }
    }

    fn in_order(&self, sequence_number: u16) -> bool {
        if self.last_receive_time_ms.is_none() {
            return true;
        }
        if is_newer_sequence_number(sequence_number, self.received_seq_max) {
            return true;
        }
        // A remote restart far behind the window is still in order
        let window_start = self.received_seq_max.wrapping_sub(self.max_reordering_threshold);
        !is_newer_sequence_number(sequence_number, window_start)
    }

    fn is_retransmit_of_old_packet(&self, header: &PacketHeader, min_rtt_ms: i64, now_ms: i64) -> bool {
        if self.in_order(header.sequence_number) {
            return false;
        }

        let frequency_khz = i64::from((header.payload_type_frequency / 1000).max(1));
        let time_diff_ms = now_ms - self.last_receive_time_ms.unwrap_or(now_ms);
        let timestamp_diff = header.timestamp.wrapping_sub(self.last_received_timestamp) as i32;
        let rtp_timestamp_diff_ms = i64::from(timestamp_diff) / frequency_khz;

        let max_delay_ms = if min_rtt_ms == 0 {
            // Two standard deviations of jitter
            let jitter_std = f64::from(self.jitter_q4 >> 4).sqrt();
            ((2.0 * jitter_std) as i64 / frequency_khz).max(1)
        } else {
            min_rtt_ms / 3 + 1
        };

        time_diff_ms > rtp_timestamp_diff_ms + max_delay_ms
    }

    fn update(&mut self, header: &PacketHeader, packet_length: usize, retransmitted: bool, now_ms: i64) {
        let in_order = self.in_order(header.sequence_number);

        let counters = &mut self.counters;
        counters.packets += 1;
        counters.header_bytes += header.header_length as u64;
        counters.padding_bytes += header.padding_length as u64;
        counters.bytes +=
            packet_length.saturating_sub(header.header_length + header.padding_length) as u64;
        if counters.first_packet_ms.is_none() {
            counters.first_packet_ms = Some(now_ms);
        }
        counters.last_packet_ms = Some(now_ms);
        if !in_order && retransmitted {
            counters.retransmitted_packets += 1;
        }
        if counters.packets == 1 {
            self.received_seq_first = header.sequence_number;
        }

        if !in_order {
            return;
        }

        if self.counters.packets > 1 && self.received_seq_max > header.sequence_number {
            self.received_seq_wraps += 1;
        }
        self.received_seq_max = header.sequence_number;

        let in_order_packets = self.counters.packets - self.counters.retransmitted_packets;
        if header.timestamp != self.last_received_timestamp && in_order_packets > 1 {
            self.update_jitter(header, now_ms);
        }

        self.last_received_timestamp = header.timestamp;
        self.last_receive_time_ms = Some(now_ms);
    }

    fn update_jitter(&mut self, header: &PacketHeader, now_ms: i64) {
        let Some(last_ms) = self.last_receive_time_ms else {
            return;
        };
        let frequency_khz = i64::from(header.payload_type_frequency / 1000);
        let arrival_diff_samples = (now_ms - last_ms) * frequency_khz;
        let timestamp_diff_samples =
            i64::from(header.timestamp.wrapping_sub(self.last_received_timestamp) as i32);
        let diff = (arrival_diff_samples - timestamp_diff_samples).abs();

        if diff < MAX_JITTER_SAMPLES {
            let jitter_diff_q4 = (diff << 4) - i64::from(self.jitter_q4);
            self.jitter_q4 = (i64::from(self.jitter_q4) + ((jitter_diff_q4 + 8) >> 4)).max(0) as u32;
        }
    }

    /// Interarrival jitter in RTP timestamp units
    pub fn jitter(&self) -> u32 {
        self.jitter_q4 >> 4
    }

    /// Highest sequence number extended with the wrap count
    pub fn extended_max_sequence_number(&self) -> u32 {
        (self.received_seq_wraps << 16) | u32::from(self.received_seq_max)
    }

    pub fn first_sequence_number(&self) -> u16 {
        self.received_seq_first
    }

    pub fn data_counters(&self) -> StreamDataCounters {
        self.counters
    }
}

#[derive(Debug)]
struct StatisticsInner {
    statisticians: HashMap<u32, StreamStatistician>,
    max_reordering_threshold: u16,
}

/// Shipped [`StatisticsCollector`]
pub struct ReceiveStatistics {
    clock: Arc<dyn Clock>,
    inner: Mutex<StatisticsInner>,
}

impl ReceiveStatistics {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(StatisticsInner {
                statisticians: HashMap::new(),
                max_reordering_threshold: DEFAULT_MAX_REORDERING_THRESHOLD,
            }),
        }
    }

    /// Snapshot of the statistician for `ssrc`
    pub fn statistician(&self, ssrc: u32) -> Option<StreamStatistician> {
        self.inner.lock().statisticians.get(&ssrc).cloned()
    }

    pub fn data_counters(&self, ssrc: u32) -> Option<StreamDataCounters> {
        self.inner
            .lock()
            .statisticians
            .get(&ssrc)
            .map(StreamStatistician::data_counters)
    }

    pub fn max_reordering_threshold(&self) -> u16 {
        self.inner.lock().max_reordering_threshold
    }
}

impl StatisticsCollector for ReceiveStatistics {
    fn is_packet_in_order(&self, ssrc: u32, sequence_number: u16) -> bool {
        self.inner
            .lock()
            .statisticians
            .get(&ssrc)
            .map_or(false, |s| s.in_order(sequence_number))
    }

    fn is_retransmit_of_old_packet(&self, header: &PacketHeader, min_rtt_ms: i64) -> bool {
        let now_ms = self.clock.now_ms();
        self.inner
            .lock()
            .statisticians
            .get(&header.ssrc)
            .map_or(false, |s| s.is_retransmit_of_old_packet(header, min_rtt_ms, now_ms))
    }

    fn incoming_packet(&self, header: &PacketHeader, packet_length: usize, retransmitted: bool) {
        let now_ms = self.clock.now_ms();
        let mut inner = self.inner.lock();
        let threshold = inner.max_reordering_threshold;
        inner
            .statisticians
            .entry(header.ssrc)
            .or_insert_with(|| StreamStatistician::new(threshold))
            .update(header, packet_length, retransmitted, now_ms);
    }

    fn fec_packet_received(&self, header: &PacketHeader, _packet_length: usize) {
        let mut inner = self.inner.lock();
        if let Some(statistician) = inner.statisticians.get_mut(&header.ssrc) {
            statistician.counters.fec_packets += 1;
        }
    }

    fn set_max_reordering_threshold(&self, threshold: u16) {
        let mut inner = self.inner.lock();
        inner.max_reordering_threshold = threshold;
        for statistician in inner.statisticians.values_mut() {
            statistician.max_reordering_threshold = threshold;
        }
    }
}
