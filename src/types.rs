//! Shared value types

use std::fmt;

/// Kind of media a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Media type hint supplied with a delivered packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaType {
    /// Transport carries both kinds
    #[default]
    Any,
    Audio,
    Video,
}

impl MediaType {
    /// Whether a stream of `kind` may receive packets carrying this hint
    pub fn matches(self, kind: MediaKind) -> bool {
        match self {
            MediaType::Any => true,
            MediaType::Audio => kind == MediaKind::Audio,
            MediaType::Video => kind == MediaKind::Video,
        }
    }
}

/// Network availability broadcast to every stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    Up,
    Down,
}

/// Arrival information attached to a packet by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketTime {
    /// Capture timestamp in microseconds, if the socket layer provided one
    pub timestamp_us: Option<i64>,
}

impl PacketTime {
    /// No capture timestamp; the receiver falls back to its own clock
    pub fn unknown() -> Self {
        Self { timestamp_us: None }
    }

    pub fn from_us(timestamp_us: i64) -> Self {
        Self {
            timestamp_us: Some(timestamp_us),
        }
    }

    /// Capture time rounded to milliseconds
    pub fn as_ms(&self) -> Option<i64> {
        self.timestamp_us.map(|us| (us + 500) / 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_matches() {
        assert!(MediaType::Any.matches(MediaKind::Audio));
        assert!(MediaType::Any.matches(MediaKind::Video));
        assert!(MediaType::Video.matches(MediaKind::Video));
        assert!(!MediaType::Video.matches(MediaKind::Audio));
        assert!(!MediaType::Audio.matches(MediaKind::Video));
    }

    #[test]
    fn test_packet_time_rounding() {
        assert_eq!(PacketTime::unknown().as_ms(), None);
        assert_eq!(PacketTime::from_us(1_499).as_ms(), Some(1));
        assert_eq!(PacketTime::from_us(1_500).as_ms(), Some(2));
    }
}
