//! Stream handles and the per-stream interface the router drives

use std::fmt;

use crate::error::PacketError;
use crate::types::{MediaKind, NetworkState, PacketTime};

/// Router-assigned stream identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which registry a stream lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Send,
    Receive,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Send => write!(f, "send"),
            Direction::Receive => write!(f, "receive"),
        }
    }
}

/// Handle returned by `create_stream`, consumed by `destroy_stream`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    pub id: StreamId,
    pub direction: Direction,
}

/// RTP sender state that outlives a send stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtpState {
    pub ssrc: u32,
    pub sequence_number: u16,
    pub start_timestamp: u32,
    pub timestamp: u32,
    pub capture_time_ms: i64,
    pub last_timestamp_time_ms: i64,
    pub media_has_been_sent: bool,
}

/// A stream registered with the router
///
/// Receive streams get RTP and RTCP; send streams get RTCP only. The router
/// holds no registry lock while calling these, except `signal_network_state`
/// on a stream created while the network is down: that call runs under the
/// registry write lock and must not call back into the router.
pub trait MediaStream: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn deliver_rtp(&self, packet: &[u8], packet_time: PacketTime) -> Result<(), PacketError>;

    fn deliver_rtcp(&self, packet: &[u8]) -> Result<(), PacketError>;

    fn signal_network_state(&self, state: NetworkState);

    /// Stop accepting packets; called before the stream is unregistered
    fn stop(&self);

    /// Audio stream this (video) stream synchronizes playout with
    fn set_sync_peer(&self, _audio: Option<StreamId>) {}

    /// Round-trip time, for send streams that measure one
    fn rtt_ms(&self) -> Option<i64> {
        None
    }

    /// RTP states to keep when a send stream is destroyed
    fn rtp_states(&self) -> Vec<RtpState> {
        Vec::new()
    }
}
