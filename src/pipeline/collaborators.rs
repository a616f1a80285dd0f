//! Collaborators of the receive pipeline
//!
//! Bandwidth estimation, decoding and RTCP processing live outside this
//! crate. The pipeline reaches them only through these traits.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::clock::Clock;
use crate::error::PacketError;
use crate::fec::FecRecoverer;
use crate::ntp::ClockOffsetEstimator;
use crate::payload::{PayloadRegistry, PayloadSpecifics};
use crate::protocol::{HeaderParser, PacketHeader, VideoRotation};
use crate::stats::StatisticsCollector;

/// Remote bandwidth estimator fed with every wire packet
pub trait BandwidthEstimator: Send + Sync {
    fn incoming_packet(&self, arrival_time_ms: i64, payload_size: usize, header: &PacketHeader);
}

/// Media packet handed to the decode buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub header: PacketHeader,
    /// Payload without header or padding; empty for a FEC placeholder
    pub payload: Bytes,
    pub specifics: PayloadSpecifics,
    pub in_order: bool,
    /// Local NTP capture time, once RTCP allows an estimate
    pub ntp_time_ms: Option<i64>,
    pub rotation: VideoRotation,
}

impl MediaPacket {
    /// Zero-length placeholder telling the decoder a FEC packet arrived
    pub fn is_fec_placeholder(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Decode buffer refusal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError(pub String);

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decode buffer error: {}", self.0)
    }
}

impl std::error::Error for SinkError {}

/// Jitter/decode buffer consuming media packets
pub trait DecodeBuffer: Send + Sync {
    fn insert_packet(&self, packet: MediaPacket) -> Result<(), SinkError>;
}

/// Round-trip time statistics from RTCP
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RttStats {
    pub last_ms: i64,
    pub avg_ms: i64,
    pub min_ms: i64,
    pub max_ms: i64,
}

/// NTP/RTP pair from the last remote sender report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteNtp {
    pub ntp_secs: u32,
    pub ntp_frac: u32,
    pub rtp_timestamp: u32,
}

/// RTCP processing module for one SSRC
pub trait RtcpModule: Send + Sync {
    fn incoming_rtcp_packet(&self, packet: &[u8]) -> Result<(), PacketError>;

    /// RTT towards `remote_ssrc`, once measured
    fn rtt(&self, remote_ssrc: u32) -> Option<RttStats>;

    /// Last sender report received from the remote side
    fn remote_ntp(&self) -> Option<RemoteNtp>;
}

/// Everything a [`ReceivePipeline`](super::ReceivePipeline) calls into
#[derive(Clone)]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub parser: Arc<dyn HeaderParser>,
    pub registry: Arc<dyn PayloadRegistry>,
    pub statistics: Arc<dyn StatisticsCollector>,
    pub bandwidth: Arc<dyn BandwidthEstimator>,
    pub decode_buffer: Arc<dyn DecodeBuffer>,
    pub fec: Arc<dyn FecRecoverer>,
    pub ntp: Arc<dyn ClockOffsetEstimator>,
    /// Primary RTCP module
    pub rtcp: Arc<dyn RtcpModule>,
}
