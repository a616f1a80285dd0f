//! Receive statistics and metric snapshots

pub mod metrics;
pub mod receive;

pub use metrics::{CallStats, DeliveryStats, StreamDataCounters};
pub use receive::{is_newer_sequence_number, ReceiveStatistics, StatisticsCollector, StreamStatistician};
