//! Router and stream configuration

use crate::error::ConfigError;
use crate::protocol::constants::DEFAULT_START_BITRATE_BPS;
use crate::types::MediaKind;

/// Bitrate limits handed to the congestion controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitrateConfig {
    /// Minimum bitrate (bits/sec)
    pub min_bitrate_bps: u32,

    /// Start bitrate; `None` keeps the current one
    pub start_bitrate_bps: Option<u32>,

    /// Maximum bitrate; `None` is unbounded
    pub max_bitrate_bps: Option<u32>,
}

impl Default for BitrateConfig {
    fn default() -> Self {
        Self {
            min_bitrate_bps: 0,
            start_bitrate_bps: Some(DEFAULT_START_BITRATE_BPS),
            max_bitrate_bps: None,
        }
    }
}

impl BitrateConfig {
    pub fn new(min_bitrate_bps: u32) -> Self {
        Self {
            min_bitrate_bps,
            start_bitrate_bps: None,
            max_bitrate_bps: None,
        }
    }

    pub fn start(mut self, bps: u32) -> Self {
        self.start_bitrate_bps = Some(bps);
        self
    }

    pub fn max(mut self, bps: u32) -> Self {
        self.max_bitrate_bps = Some(bps);
        self
    }

    /// Check `min <= start <= max`
    pub fn validate(&self) -> Result<(), ConfigError> {
        let max = self.max_bitrate_bps.unwrap_or(u32::MAX);
        let start_ok = self
            .start_bitrate_bps
            .map_or(true, |start| self.min_bitrate_bps <= start && start <= max);

        if self.min_bitrate_bps <= max && start_ok && max > 0 {
            Ok(())
        } else {
            Err(ConfigError::InvalidBitrate {
                min_bps: self.min_bitrate_bps,
                start_bps: self.start_bitrate_bps,
                max_bps: self.max_bitrate_bps,
            })
        }
    }
}

/// Which streams receive a broadcast RTCP packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtcpFanout {
    /// Receive and send streams
    #[default]
    All,
    /// Receive streams only
    ReceiveOnly,
}

/// Router configuration options
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Initial bitrate limits
    pub bitrate: BitrateConfig,

    /// RTCP fan-out policy
    pub rtcp_fanout: RtcpFanout,
}

impl RouterConfig {
    pub fn bitrate(mut self, bitrate: BitrateConfig) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn rtcp_fanout(mut self, fanout: RtcpFanout) -> Self {
        self.rtcp_fanout = fanout;
        self
    }
}

/// Registration parameters of one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub kind: MediaKind,

    /// Primary SSRC, the routing key
    pub ssrc: u32,

    /// Retransmission SSRC routed to the same stream
    pub rtx_ssrc: Option<u32>,

    /// Audio/video playout sync group
    pub sync_group: Option<String>,
}

impl StreamConfig {
    pub fn new(kind: MediaKind, ssrc: u32) -> Self {
        Self {
            kind,
            ssrc,
            rtx_ssrc: None,
            sync_group: None,
        }
    }

    pub fn audio(ssrc: u32) -> Self {
        Self::new(MediaKind::Audio, ssrc)
    }

    pub fn video(ssrc: u32) -> Self {
        Self::new(MediaKind::Video, ssrc)
    }

    pub fn rtx_ssrc(mut self, ssrc: u32) -> Self {
        self.rtx_ssrc = Some(ssrc);
        self
    }

    pub fn sync_group(mut self, group: impl Into<String>) -> Self {
        self.sync_group = Some(group.into());
        self
    }

    /// Primary SSRC followed by the RTX alias, if any
    pub fn ssrcs(&self) -> impl Iterator<Item = u32> + '_ {
        std::iter::once(self.ssrc).chain(self.rtx_ssrc)
    }
}
