//! SSRC routing and RTP/RTCP receive pipeline for real-time media sessions
//!
//! Packets for many media flows share a transport. The [`SessionRouter`]
//! demultiplexes them by SSRC and hands RTP to the owning stream, usually a
//! [`ReceivePipeline`], which unwraps RTX and RED/ULPFEC, classifies
//! ordering and retransmission, and forwards media to a decode buffer.
//!
//! ```text
//! transport ─► DeliveryWorker ─► SessionRouter ─┬─► ReceivePipeline ─► DecodeBuffer
//!                                               ├─► ReceivePipeline ─► DecodeBuffer
//!                                               └─► send streams (RTCP only)
//! ```
//!
//! Codecs, jitter buffering, bandwidth estimation and RTCP parsing live
//! outside this crate and plug in through the traits in [`pipeline`] and
//! [`router`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rtp_router::{Direction, MediaType, PacketTime, RouterConfig, SessionRouter, StreamConfig};
//! # fn streams() -> (Arc<dyn rtp_router::router::CongestionController>, Arc<dyn rtp_router::MediaStream>) { unimplemented!() }
//!
//! let (congestion, stream) = streams();
//! let router = SessionRouter::new(RouterConfig::default(), congestion)?;
//! router.create_stream(Direction::Receive, StreamConfig::video(0x1234).rtx_ssrc(0x1235), stream)?;
//!
//! let packet = [0u8; 0];
//! let status = router.deliver_packet(MediaType::Video, &packet, PacketTime::unknown());
//! # Ok::<(), rtp_router::Error>(())
//! ```

pub mod clock;
pub mod error;
pub mod fec;
pub mod ntp;
pub mod payload;
pub mod pipeline;
pub mod protocol;
pub mod router;
pub mod stats;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use clock::{Clock, SimulatedClock, SystemClock};
pub use error::{ConfigError, Error, HeaderError, PacketError, RegistryError, Result};
pub use pipeline::{Collaborators, PipelineConfig, ReceivePipeline};
pub use router::{
    BitrateConfig, DeliveryStatus, Direction, MediaStream, RouterConfig, SessionRouter,
    StreamConfig, StreamHandle, StreamId,
};
pub use stats::CallStats;
pub use transport::{DeliveryWorker, InboundPacket};
pub use types::{MediaKind, MediaType, NetworkState, PacketTime};
