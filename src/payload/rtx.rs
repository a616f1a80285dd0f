//! RTX restoration (RFC 4588)
//!
//! An RTX packet carries the original sequence number as the first two
//! payload bytes, followed by the original payload:
//!
//! ```text
//! +----------------+------+-----------------+---------+
//! | RTX RTP header | OSN  | original payload| padding |
//! +----------------+------+-----------------+---------+
//!                  restored as
//! +----------------+-----------------+---------+
//! | header'        | original payload| padding |
//! +----------------+-----------------+---------+
//! ```
//!
//! header' is the RTX header with the original sequence number, SSRC and
//! associated payload type written back. The marker bit is preserved.

use bytes::{BufMut, BytesMut};

use crate::error::PacketError;
use crate::protocol::constants::{RTP_MARKER_BIT, RTP_SSRC_OFFSET, RTX_HEADER_SIZE};
use crate::protocol::PacketHeader;

/// Rebuild the original packet from an RTX packet
///
/// The restored packet is written into a buffer of `capacity` bytes and
/// fails with [`PacketError::ReconstructionOverflow`] if it would not fit.
pub fn restore_rtx_packet(
    packet: &[u8],
    header: &PacketHeader,
    original_ssrc: u32,
    associated_payload_type: u8,
    capacity: usize,
) -> Result<BytesMut, PacketError> {
    if RTX_HEADER_SIZE + header.header_length + header.padding_length > packet.len() {
        return Err(PacketError::InvalidRtxHeader);
    }

    let restored_len = packet.len() - RTX_HEADER_SIZE;
    if restored_len > capacity {
        return Err(PacketError::ReconstructionOverflow {
            length: restored_len,
            capacity,
        });
    }

    let osn_offset = header.header_length;
    let original_sequence_number = u16::from_be_bytes([packet[osn_offset], packet[osn_offset + 1]]);

    let mut restored = BytesMut::with_capacity(capacity);
    restored.put_slice(&packet[..header.header_length]);
    restored.put_slice(&packet[header.header_length + RTX_HEADER_SIZE..]);

    restored[1] = associated_payload_type & 0x7f;
    if header.marker {
        restored[1] |= RTP_MARKER_BIT;
    }
    restored[2..4].copy_from_slice(&original_sequence_number.to_be_bytes());
    restored[RTP_SSRC_OFFSET..RTP_SSRC_OFFSET + 4].copy_from_slice(&original_ssrc.to_be_bytes());

    Ok(restored)
}
