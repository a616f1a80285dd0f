//! Forward error correction
//!
//! RED containers (RFC 2198) are unwrapped and ULPFEC (RFC 5109) blocks are
//! used to rebuild single lost media packets. Both the unwrapped media and
//! any rebuilt packets come back to the caller as whole RTP packets to be
//! re-inserted into the receive path.

pub mod red;
pub mod ulpfec;

use std::fmt;

use bytes::Bytes;

use crate::protocol::PacketHeader;

pub use red::{parse_red_payload, RedBlock};
pub use ulpfec::UlpfecReceiver;

/// Running FEC counters for one receiver
///
/// `num_recovered_packets <= num_fec_packets` always holds since each FEC
/// packet rebuilds at most one media packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FecPacketCounter {
    /// RED packets received
    pub num_packets: u64,
    /// ULPFEC blocks received
    pub num_fec_packets: u64,
    /// Media packets rebuilt from ULPFEC
    pub num_recovered_packets: u64,
}

/// FEC processing failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecError {
    /// RED block headers run past the payload
    TruncatedRed,
    /// ULPFEC header is too short or inconsistent
    InvalidFecHeader,
}

impl fmt::Display for FecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FecError::TruncatedRed => write!(f, "truncated RED payload"),
            FecError::InvalidFecHeader => write!(f, "invalid ULPFEC header"),
        }
    }
}

impl std::error::Error for FecError {}

/// Recovers media from RED/ULPFEC containers
pub trait FecRecoverer: Send + Sync {
    /// Queue a RED packet for processing
    fn add_received_red_packet(
        &self,
        header: &PacketHeader,
        packet: &[u8],
        ulpfec_payload_type: Option<u8>,
    ) -> Result<(), FecError>;

    /// Process queued packets, returning every media packet they yield
    fn process_received_fec(&self) -> Vec<Bytes>;

    fn packet_counter(&self) -> FecPacketCounter;
}
