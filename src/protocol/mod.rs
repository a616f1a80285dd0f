//! RTP/RTCP wire protocol
//!
//! This module provides:
//! - RTP header parsing with one-byte header extensions
//! - RTCP/RTP classification for shared transports
//! - RTP packet serialization

pub mod builder;
pub mod constants;
pub mod header;
pub mod rtcp;

pub use builder::RtpPacketBuilder;
pub use header::{
    read_ssrc, ExtensionMap, ExtensionType, HeaderExtensions, HeaderParser, PacketHeader,
    RtpHeaderParser, VideoRotation,
};
pub use rtcp::{is_rtcp, RtcpPacketType};
