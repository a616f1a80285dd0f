//! Receive pipeline configuration

use std::time::Duration;

use crate::protocol::constants::{
    PACKET_LOG_INTERVAL, RESTORATION_BUFFER_CAPACITY, VIDEO_PAYLOAD_FREQUENCY,
};
use crate::types::MediaKind;

/// Receive pipeline configuration options
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// SSRC of the remote media stream; RTX packets are restored onto it
    pub remote_ssrc: u32,

    /// Kind of media this pipeline receives
    pub kind: MediaKind,

    /// RTP clock rate stamped on every parsed header
    pub payload_frequency: u32,

    /// Minimum interval between periodic header logs
    pub packet_log_interval: Duration,

    /// Size of the RTX restoration buffer
    pub restoration_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remote_ssrc: 0,
            kind: MediaKind::Video,
            payload_frequency: VIDEO_PAYLOAD_FREQUENCY,
            packet_log_interval: PACKET_LOG_INTERVAL,
            restoration_capacity: RESTORATION_BUFFER_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Create a config receiving `remote_ssrc`
    pub fn with_remote_ssrc(remote_ssrc: u32) -> Self {
        Self {
            remote_ssrc,
            ..Default::default()
        }
    }

    /// Set the media kind; audio defaults to a 48 kHz clock
    pub fn kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        if kind == MediaKind::Audio && self.payload_frequency == VIDEO_PAYLOAD_FREQUENCY {
            self.payload_frequency = 48_000;
        }
        self
    }

    pub fn payload_frequency(mut self, hz: u32) -> Self {
        self.payload_frequency = hz;
        self
    }

    pub fn packet_log_interval(mut self, interval: Duration) -> Self {
        self.packet_log_interval = interval;
        self
    }

    pub fn restoration_capacity(mut self, capacity: usize) -> Self {
        self.restoration_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();

        assert_eq!(config.kind, MediaKind::Video);
        assert_eq!(config.payload_frequency, 90_000);
        assert_eq!(config.packet_log_interval, Duration::from_secs(10));
        assert_eq!(config.restoration_capacity, 1500);
    }

    #[test]
    fn test_builder_chaining() {
        let config = PipelineConfig::with_remote_ssrc(0xAAAA)
            .kind(MediaKind::Audio)
            .packet_log_interval(Duration::from_secs(1))
            .restoration_capacity(256);

        assert_eq!(config.remote_ssrc, 0xAAAA);
        assert_eq!(config.kind, MediaKind::Audio);
        assert_eq!(config.payload_frequency, 48_000);
        assert_eq!(config.packet_log_interval, Duration::from_secs(1));
        assert_eq!(config.restoration_capacity, 256);
    }

    #[test]
    fn test_explicit_frequency_kept() {
        let config = PipelineConfig::default()
            .payload_frequency(8_000)
            .kind(MediaKind::Audio);
        assert_eq!(config.payload_frequency, 8_000);
    }
}
