//! RED container parsing (RFC 2198)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |F|   block PT  |  timestamp offset         |   block length    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0|   block PT  |  primary block ...
//! +-+-+-+-+-+-+-+-+
//! ```
//!
//! Redundant blocks carry F=1 and a 4-byte header; the final (primary)
//! block has F=0 and a 1-byte header and runs to the end of the payload.

use super::FecError;

const FOLLOW_BIT: u8 = 0x80;
const REDUNDANT_HEADER_LEN: usize = 4;
const PRIMARY_HEADER_LEN: usize = 1;

/// One block of a RED payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedBlock<'a> {
    pub payload_type: u8,
    /// Timestamp offset from the RTP header (0 for the primary block)
    pub timestamp_offset: u16,
    pub data: &'a [u8],
}

/// Split a RED payload into its blocks, primary block last
pub fn parse_red_payload(payload: &[u8]) -> Result<Vec<RedBlock<'_>>, FecError> {
    let mut headers = Vec::new();
    let mut offset = 0;

    loop {
        let first = *payload.get(offset).ok_or(FecError::TruncatedRed)?;

        if first & FOLLOW_BIT == 0 {
            headers.push((first & 0x7f, 0u16, None));
            offset += PRIMARY_HEADER_LEN;
            break;
        }

        if offset + REDUNDANT_HEADER_LEN > payload.len() {
            return Err(FecError::TruncatedRed);
        }
        let h = &payload[offset..offset + REDUNDANT_HEADER_LEN];
        let timestamp_offset = (u16::from(h[1]) << 6) | (u16::from(h[2]) >> 2);
        let block_length = (usize::from(h[2] & 0x03) << 8) | usize::from(h[3]);
        headers.push((first & 0x7f, timestamp_offset, Some(block_length)));
        offset += REDUNDANT_HEADER_LEN;
    }

    let mut blocks = Vec::with_capacity(headers.len());
    for (payload_type, timestamp_offset, length) in headers {
        let end = match length {
            Some(len) => offset + len,
            None => payload.len(),
        };
        if end > payload.len() {
            return Err(FecError::TruncatedRed);
        }
        blocks.push(RedBlock {
            payload_type,
            timestamp_offset,
            data: &payload[offset..end],
        });
        offset = end;
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_only() {
        let blocks = parse_red_payload(&[96, 1, 2, 3]).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].payload_type, 96);
        assert_eq!(blocks[0].data, &[1, 2, 3]);
    }

    #[test]
    fn test_redundant_and_primary() {
        // Redundant header (pt 117, offset 0, length 2), primary header, then data
        let payload = [0x80 | 117, 0x00, 0x00, 0x02, 96, 0xAA, 0xBB, 0x01];
        let blocks = parse_red_payload(&payload).unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].payload_type, 117);
        assert_eq!(blocks[0].data, &[0xAA, 0xBB]);
        assert_eq!(blocks[1].payload_type, 96);
        assert_eq!(blocks[1].data, &[0x01]);
    }

    #[test]
    fn test_timestamp_offset_decoded() {
        // offset 0x0123 (14 bits), length 0
        let payload = [0x80 | 100, 0x04, 0x8C, 0x00, 96];
        let blocks = parse_red_payload(&payload).unwrap();
        assert_eq!(blocks[0].timestamp_offset, 0x0123);
        assert!(blocks[0].data.is_empty());
        assert!(blocks[1].data.is_empty());
    }

    #[test]
    fn test_truncated() {
        assert_eq!(parse_red_payload(&[]), Err(FecError::TruncatedRed));
        assert_eq!(parse_red_payload(&[0x80 | 117, 0x00]), Err(FecError::TruncatedRed));
        // Block length runs past the payload
        assert_eq!(
            parse_red_payload(&[0x80 | 117, 0x00, 0x00, 0x08, 96, 0x01]),
            Err(FecError::TruncatedRed)
        );
    }
}
