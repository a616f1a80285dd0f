//! RTP packet serialization
//!
//! Used to synthesize packets for loopback demos and tests. Header
//! extensions are written with the one-byte profile.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::*;

/// Builder for a serialized RTP packet
#[derive(Debug, Clone)]
pub struct RtpPacketBuilder {
    payload_type: u8,
    sequence_number: u16,
    timestamp: u32,
    ssrc: u32,
    marker: bool,
    csrcs: Vec<u32>,
    extensions: Vec<(u8, Vec<u8>)>,
    payload: Vec<u8>,
    padding: u8,
}

impl RtpPacketBuilder {
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            payload_type: payload_type & 0x7f,
            sequence_number,
            timestamp,
            ssrc,
            marker: false,
            csrcs: Vec::new(),
            extensions: Vec::new(),
            payload: Vec::new(),
            padding: 0,
        }
    }

    pub fn marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Set the CSRC list (at most 15 entries are written)
    pub fn csrcs(mut self, csrcs: &[u32]) -> Self {
        self.csrcs = csrcs.iter().take(15).copied().collect();
        self
    }

    /// Add a one-byte extension element (id 1-14, 1-16 bytes of data)
    pub fn extension(mut self, id: u8, data: &[u8]) -> Self {
        if (1..=14).contains(&id) && !data.is_empty() && data.len() <= 16 {
            self.extensions.push((id, data.to_vec()));
        }
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    /// Append `count` padding bytes; the last byte carries the count
    pub fn padding(mut self, count: u8) -> Self {
        self.padding = count;
        self
    }

    pub fn build(self) -> Bytes {
        let ext_body_len: usize = self.extensions.iter().map(|(_, d)| 1 + d.len()).sum();
        let ext_words = ext_body_len.div_ceil(4);

        let mut buf = BytesMut::with_capacity(
            RTP_HEADER_MIN_LEN
                + self.csrcs.len() * 4
                + if self.extensions.is_empty() { 0 } else { 4 + ext_words * 4 }
                + self.payload.len()
                + self.padding as usize,
        );

        let mut b0 = RTP_VERSION << 6 | self.csrcs.len() as u8;
        if self.padding > 0 {
            b0 |= 0x20;
        }
        if !self.extensions.is_empty() {
            b0 |= 0x10;
        }
        buf.put_u8(b0);
        buf.put_u8(if self.marker {
            RTP_MARKER_BIT | self.payload_type
        } else {
            self.payload_type
        });
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for csrc in &self.csrcs {
            buf.put_u32(*csrc);
        }

        if !self.extensions.is_empty() {
            buf.put_u16(ONE_BYTE_EXTENSION_PROFILE);
            buf.put_u16(ext_words as u16);
            for (id, data) in &self.extensions {
                buf.put_u8(id << 4 | (data.len() as u8 - 1));
                buf.put_slice(data);
            }
            buf.put_bytes(0, ext_words * 4 - ext_body_len);
        }

        buf.put_slice(&self.payload);

        if self.padding > 0 {
            buf.put_bytes(0, self.padding as usize - 1);
            buf.put_u8(self.padding);
        }

        buf.freeze()
    }
}
