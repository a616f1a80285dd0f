//! Per-stream RTP/RTCP receive pipeline

pub mod collaborators;
pub mod config;
pub mod receiver;
pub mod state;

pub use collaborators::{
    BandwidthEstimator, Collaborators, DecodeBuffer, MediaPacket, RemoteNtp, RtcpModule, RttStats,
    SinkError,
};
pub use config::PipelineConfig;
pub use receiver::{FecSummary, ReceivePipeline};
pub use state::{ReceiveState, RestorationGuard};
