//! Statistics snapshots for calls, streams and transports

/// Call-level statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    /// Available send bandwidth (bits/sec)
    pub send_bandwidth_bps: u32,
    /// Estimated receive bandwidth (bits/sec)
    pub recv_bandwidth_bps: u32,
    /// Pacer queuing delay
    pub pacer_delay_ms: i64,
    /// Worst round-trip time across send streams, if any reported one
    pub rtt_ms: Option<i64>,
}

/// Per-SSRC receive counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamDataCounters {
    /// Packets received, retransmissions included
    pub packets: u64,
    /// Payload bytes received
    pub bytes: u64,
    /// Header bytes received
    pub header_bytes: u64,
    /// Padding bytes received
    pub padding_bytes: u64,
    /// Packets classified as retransmissions
    pub retransmitted_packets: u64,
    /// ULPFEC packets received
    pub fec_packets: u64,
    /// Arrival time of the first packet
    pub first_packet_ms: Option<i64>,
    /// Arrival time of the latest packet
    pub last_packet_ms: Option<i64>,
}

impl StreamDataCounters {
    /// Total bytes on the wire
    pub fn total_bytes(&self) -> u64 {
        self.bytes + self.header_bytes + self.padding_bytes
    }

    /// Average bitrate between the first and latest packet
    pub fn bitrate_bps(&self) -> u64 {
        match (self.first_packet_ms, self.last_packet_ms) {
            (Some(first), Some(last)) if last > first => {
                self.total_bytes() * 8 * 1000 / (last - first) as u64
            }
            _ => 0,
        }
    }
}

/// Delivery outcome counts for one transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Packets accepted by a stream
    pub delivered: u64,
    /// RTP packets for an unregistered SSRC
    pub unknown_ssrc: u64,
    /// Packets rejected as malformed or by the stream
    pub packet_errors: u64,
}

impl DeliveryStats {
    pub fn total(&self) -> u64 {
        self.delivered + self.unknown_ssrc + self.packet_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_stats_default() {
        let stats = CallStats::default();
        assert_eq!(stats.send_bandwidth_bps, 0);
        assert_eq!(stats.recv_bandwidth_bps, 0);
        assert_eq!(stats.rtt_ms, None);
    }

    #[test]
    fn test_stream_counters_bitrate() {
        let counters = StreamDataCounters {
            packets: 100,
            bytes: 90_000,
            header_bytes: 1_200,
            padding_bytes: 8_800,
            first_packet_ms: Some(1_000),
            last_packet_ms: Some(11_000),
            ..Default::default()
        };

        // 100,000 bytes * 8 bits / 10 seconds = 80,000 bps
        assert_eq!(counters.total_bytes(), 100_000);
        assert_eq!(counters.bitrate_bps(), 80_000);
    }

    #[test]
    fn test_stream_counters_bitrate_zero_duration() {
        let counters = StreamDataCounters {
            bytes: 1_000,
            first_packet_ms: Some(5),
            last_packet_ms: Some(5),
            ..Default::default()
        };
        assert_eq!(counters.bitrate_bps(), 0);
        assert_eq!(StreamDataCounters::default().bitrate_bps(), 0);
    }

    #[test]
    fn test_delivery_stats_total() {
        let stats = DeliveryStats {
            delivered: 7,
            unknown_ssrc: 2,
            packet_errors: 1,
        };
        assert_eq!(stats.total(), 10);
    }
}
