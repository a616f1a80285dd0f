//! RTP/RTCP protocol constants

use std::time::Duration;

/// RTP version carried in the top two bits of byte 0
pub const RTP_VERSION: u8 = 2;

/// Fixed RTP header length (no CSRCs, no extension)
pub const RTP_HEADER_MIN_LEN: usize = 12;

/// Byte offset of the SSRC field in the fixed header
pub const RTP_SSRC_OFFSET: usize = 8;

/// Smallest RTCP packet (common header only)
pub const RTCP_MIN_HEADER_LEN: usize = 4;

/// Marker bit in byte 1
pub const RTP_MARKER_BIT: u8 = 0x80;

/// One-byte header extension profile (RFC 5285)
pub const ONE_BYTE_EXTENSION_PROFILE: u16 = 0xBEDE;

/// Original sequence number prefix of an RTX payload (RFC 4588)
pub const RTX_HEADER_SIZE: usize = 2;

/// Capacity of the RTX restoration buffer (one IP packet)
pub const RESTORATION_BUFFER_CAPACITY: usize = 1500;

/// Default statistics reordering window, used whenever NACK is off
pub const DEFAULT_MAX_REORDERING_THRESHOLD: u16 = 50;

/// RTP clock rate of video payloads
pub const VIDEO_PAYLOAD_FREQUENCY: u32 = 90_000;

/// Minimum interval between periodic header logs on one pipeline
pub const PACKET_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Default start bitrate for the congestion controller
pub const DEFAULT_START_BITRATE_BPS: u32 = 300_000;
