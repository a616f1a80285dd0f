//! Congestion controller interface

use crate::types::NetworkState;

/// A packet handed to the socket, reported for send-side estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentPacket {
    /// Transport-wide sequence number, if the packet carried one
    pub packet_id: Option<u16>,
    pub send_time_ms: i64,
}

/// Session-wide bandwidth estimation and pacing
pub trait CongestionController: Send + Sync {
    fn set_bwe_bitrates(&self, min_bps: u32, start_bps: Option<u32>, max_bps: Option<u32>);

    fn signal_network_state(&self, state: NetworkState);

    fn on_sent_packet(&self, packet: SentPacket);

    fn available_send_bandwidth_bps(&self) -> u32;

    fn receive_bandwidth_bps(&self) -> u32;

    fn pacer_queuing_delay_ms(&self) -> i64;
}
