//! Session-level stream routing
//!
//! This module provides:
//! - Send and receive stream registries keyed by SSRC
//! - RTP/RTCP demultiplexing to registered streams
//! - Network state broadcast and bitrate configuration
//! - Audio/video sync group resolution

pub mod config;
pub mod congestion;
pub mod registry;
pub mod session;
pub mod stream;
pub mod sync;

pub use config::{BitrateConfig, RouterConfig, RtcpFanout, StreamConfig};
pub use congestion::{CongestionController, SentPacket};
pub use registry::{Registration, StreamRegistry};
pub use session::{DeliveryStatus, SessionRouter};
pub use stream::{Direction, MediaStream, RtpState, StreamHandle, StreamId};
pub use sync::SyncGroupState;
