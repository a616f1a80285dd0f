//! Error types
//!
//! Packet-level failures ([`PacketError`]) are absorbed at the pipeline
//! boundary and never affect other SSRCs. Registry and configuration errors
//! ([`RegistryError`], [`ConfigError`]) are caller contract violations.

use std::fmt;

use crate::router::StreamId;

/// Result alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Packet(PacketError),
    Registry(RegistryError),
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Packet(e) => write!(f, "packet error: {}", e),
            Error::Registry(e) => write!(f, "registry error: {}", e),
            Error::Config(e) => write!(f, "config error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Packet(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Config(e) => Some(e),
        }
    }
}

impl From<PacketError> for Error {
    fn from(e: PacketError) -> Self {
        Error::Packet(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

/// RTP header parse failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// Fewer bytes than the fixed header, CSRC list or extension require
    TooShort,
    /// Version field is not 2
    UnsupportedVersion(u8),
    /// Header extension length runs past the packet
    InvalidExtension,
    /// Padding count is zero or larger than the payload
    InvalidPadding,
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderError::TooShort => write!(f, "packet too short for RTP header"),
            HeaderError::UnsupportedVersion(v) => write!(f, "unsupported RTP version: {}", v),
            HeaderError::InvalidExtension => write!(f, "invalid header extension"),
            HeaderError::InvalidPadding => write!(f, "invalid padding length"),
        }
    }
}

impl std::error::Error for HeaderError {}

/// Per-packet failures, reported by the receive pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Pipeline is stopped
    NotReceiving,
    /// Header could not be parsed
    MalformedHeader(HeaderError),
    /// No codec registered for the payload type
    UnknownPayloadType(u8),
    /// Restored packet would not fit the restoration buffer
    ReconstructionOverflow { length: usize, capacity: usize },
    /// An RTX restoration is already in flight on this pipeline
    MultipleConcurrentRtx,
    /// RTX header is inconsistent with the container or RTX is misconfigured
    InvalidRtxHeader,
    /// FEC recoverer refused the RED container
    FecRejected,
    /// Decode buffer refused the packet
    DeliveryFailed,
    /// RTCP module reported an error
    Rtcp(String),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::NotReceiving => write!(f, "pipeline is not receiving"),
            PacketError::MalformedHeader(e) => write!(f, "malformed header: {}", e),
            PacketError::UnknownPayloadType(pt) => write!(f, "unknown payload type: {}", pt),
            PacketError::ReconstructionOverflow { length, capacity } => write!(
                f,
                "restored packet of {} bytes exceeds buffer capacity {}",
                length, capacity
            ),
            PacketError::MultipleConcurrentRtx => write!(f, "multiple concurrent RTX restorations"),
            PacketError::InvalidRtxHeader => write!(f, "invalid RTX header"),
            PacketError::FecRejected => write!(f, "FEC recoverer rejected RED packet"),
            PacketError::DeliveryFailed => write!(f, "decode buffer rejected packet"),
            PacketError::Rtcp(msg) => write!(f, "RTCP error: {}", msg),
        }
    }
}

impl std::error::Error for PacketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PacketError::MalformedHeader(e) => Some(e),
            _ => None,
        }
    }
}

impl From<HeaderError> for PacketError {
    fn from(e: HeaderError) -> Self {
        PacketError::MalformedHeader(e)
    }
}

/// Registry membership errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another stream already claims this SSRC in the same direction
    DuplicateSsrc(u32),
    /// Handle does not name a registered stream
    UnknownStream(StreamId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateSsrc(ssrc) => write!(f, "SSRC already registered: {:#010x}", ssrc),
            RegistryError::UnknownStream(id) => write!(f, "Stream not found: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Bitrate bounds are not ordered `min <= start <= max`
    InvalidBitrate {
        min_bps: u32,
        start_bps: Option<u32>,
        max_bps: Option<u32>,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidBitrate {
                min_bps,
                start_bps,
                max_bps,
            } => write!(
                f,
                "invalid bitrate config: min={} start={:?} max={:?}",
                min_bps, start_bps, max_bps
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
