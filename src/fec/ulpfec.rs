//! ULPFEC receiver (RFC 5109)
//!
//! FEC header layout, followed by one level-0 ULP header:
//!
//! ```text
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |E|L|P|X|  CC   |M| PT recovery |            SN base            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                          TS recovery                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        length recovery        |       protection length       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |        mask (16 bits, or 48 bits when L is set) ...           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Only single-loss recovery is supported: a FEC packet rebuilds its one
//! missing protected packet once every other protected packet is present.

use std::collections::{HashMap, VecDeque};

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use super::red::parse_red_payload;
use super::{FecError, FecPacketCounter, FecRecoverer};
use crate::protocol::constants::{RTP_HEADER_MIN_LEN, RTP_MARKER_BIT, RTP_VERSION};
use crate::protocol::PacketHeader;

const FEC_HEADER_LEN: usize = 10;
const ULP_HEADER_LEN: usize = 2;
const LONG_MASK_BIT: u8 = 0x40;
const PADDING_BIT: u8 = 0x20;

/// Media packets kept around as FEC recovery inputs
const MAX_MEDIA_PACKETS: usize = 192;
/// FEC packets waiting for a single loss
const MAX_FEC_PACKETS: usize = 48;

#[derive(Debug, Clone)]
struct FecPacket {
    ssrc: u32,
    protected: Vec<u16>,
    header: [u8; FEC_HEADER_LEN],
    payload: Vec<u8>,
}

impl FecPacket {
    fn parse(ssrc: u32, data: &[u8]) -> Result<Self, FecError> {
        if data.len() < FEC_HEADER_LEN + ULP_HEADER_LEN {
            return Err(FecError::InvalidFecHeader);
        }

        let mask_len = if data[0] & LONG_MASK_BIT != 0 { 6 } else { 2 };
        let payload_offset = FEC_HEADER_LEN + ULP_HEADER_LEN + mask_len;
        if data.len() < payload_offset {
            return Err(FecError::InvalidFecHeader);
        }

        let protection_length = usize::from(u16::from_be_bytes([data[10], data[11]]));
        if data.len() - payload_offset < protection_length {
            return Err(FecError::InvalidFecHeader);
        }

        let seq_base = u16::from_be_bytes([data[2], data[3]]);
        let mask = &data[FEC_HEADER_LEN + ULP_HEADER_LEN..payload_offset];
        let protected: Vec<u16> = (0..mask_len * 8)
            .filter(|bit| mask[bit / 8] & (0x80 >> (bit % 8)) != 0)
            .map(|bit| seq_base.wrapping_add(bit as u16))
            .collect();
        if protected.is_empty() {
            return Err(FecError::InvalidFecHeader);
        }

        let mut header = [0u8; FEC_HEADER_LEN];
        header.copy_from_slice(&data[..FEC_HEADER_LEN]);

        Ok(Self {
            ssrc,
            protected,
            header,
            payload: data[payload_offset..payload_offset + protection_length].to_vec(),
        })
    }

    /// XOR the present packets back out of the FEC payload
    fn recover(&self, sequence_number: u16, present: &[&Bytes]) -> Option<Bytes> {
        let mut first = self.header[0] & 0x3f;
        let mut second = self.header[1];
        let mut timestamp = [self.header[4], self.header[5], self.header[6], self.header[7]];
        let mut length = u16::from_be_bytes([self.header[8], self.header[9]]);
        let mut payload = self.payload.clone();

        for packet in present {
            first ^= packet[0] & 0x3f;
            second ^= packet[1];
            for (t, b) in timestamp.iter_mut().zip(&packet[4..8]) {
                *t ^= b;
            }
            length ^= (packet.len() - RTP_HEADER_MIN_LEN) as u16;
            for (p, b) in payload.iter_mut().zip(&packet[RTP_HEADER_MIN_LEN..]) {
                *p ^= b;
            }
        }

        let length = usize::from(length);
        if length > payload.len() {
            return None;
        }

        let mut restored = BytesMut::with_capacity(RTP_HEADER_MIN_LEN + length);
        restored.put_u8((RTP_VERSION << 6) | first);
        restored.put_u8(second);
        restored.put_u16(sequence_number);
        restored.put_slice(&timestamp);
        restored.put_u32(self.ssrc);
        restored.put_slice(&payload[..length]);
        Some(restored.freeze())
    }
}

#[derive(Debug)]
enum Received {
    Media(Bytes),
    Fec(FecPacket),
}

#[derive(Debug, Default)]
struct ReceiverState {
    pending: Vec<Received>,
    media: HashMap<u16, Bytes>,
    media_order: VecDeque<u16>,
    fec: VecDeque<FecPacket>,
    counter: FecPacketCounter,
}

impl ReceiverState {
    fn store_media(&mut self, packet: Bytes) {
        let sequence_number = u16::from_be_bytes([packet[2], packet[3]]);
        if self.media.insert(sequence_number, packet).is_none() {
            self.media_order.push_back(sequence_number);
        }
        while self.media_order.len() > MAX_MEDIA_PACKETS {
            if let Some(old) = self.media_order.pop_front() {
                self.media.remove(&old);
            }
        }
    }

    fn store_fec(&mut self, packet: FecPacket) {
        self.fec.push_back(packet);
        if self.fec.len() > MAX_FEC_PACKETS {
            self.fec.pop_front();
        }
    }

    /// Run recovery until no FEC packet makes progress
    fn attempt_recovery(&mut self, out: &mut Vec<Bytes>) {
        loop {
            let mut progress = false;
            let mut i = 0;

            while i < self.fec.len() {
                let fec = &self.fec[i];
                let missing: Vec<u16> = fec
                    .protected
                    .iter()
                    .copied()
                    .filter(|seq| !self.media.contains_key(seq))
                    .collect();

                match missing.as_slice() {
                    [] => {
                        self.fec.remove(i);
                    }
                    [seq] => {
                        let present: Vec<&Bytes> = fec
                            .protected
                            .iter()
                            .filter_map(|s| self.media.get(s))
                            .collect();
                        let recovered = fec.recover(*seq, &present);
                        self.fec.remove(i);

                        match recovered {
                            Some(packet) => {
                                self.counter.num_recovered_packets += 1;
                                self.store_media(packet.clone());
                                out.push(packet);
                                progress = true;
                            }
                            None => {
                                tracing::debug!(sequence_number = *seq, "FEC recovery failed");
                            }
                        }
                    }
                    _ => i += 1,
                }
            }

            if !progress {
                break;
            }
        }
    }
}

/// Shipped [`FecRecoverer`]
#[derive(Debug, Default)]
pub struct UlpfecReceiver {
    state: Mutex<ReceiverState>,
}

impl UlpfecReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Media packet carried as the primary block, with the RED header removed
    fn unwrap_media(header: &PacketHeader, packet: &[u8], payload_type: u8, data: &[u8]) -> Bytes {
        let mut media = BytesMut::with_capacity(header.header_length + data.len());
        media.put_slice(&packet[..header.header_length]);
        media[0] &= !PADDING_BIT;
        media[1] = payload_type & 0x7f;
        if header.marker {
            media[1] |= RTP_MARKER_BIT;
        }
        media.put_slice(data);
        media.freeze()
    }
}

impl FecRecoverer for UlpfecReceiver {
    fn add_received_red_packet(
        &self,
        header: &PacketHeader,
        packet: &[u8],
        ulpfec_payload_type: Option<u8>,
    ) -> Result<(), FecError> {
        let mut state = self.state.lock();
        state.counter.num_packets += 1;

        let end = packet.len().saturating_sub(header.padding_length);
        if end < header.header_length {
            return Err(FecError::TruncatedRed);
        }
        let blocks = parse_red_payload(&packet[header.header_length..end])?;
        let primary = blocks.len() - 1;

        for (index, block) in blocks.iter().enumerate() {
            if Some(block.payload_type) == ulpfec_payload_type {
                state.counter.num_fec_packets += 1;
                let fec = FecPacket::parse(header.ssrc, block.data)?;
                state.pending.push(Received::Fec(fec));
            } else if index == primary {
                let media = Self::unwrap_media(header, packet, block.payload_type, block.data);
                state.pending.push(Received::Media(media));
            } else {
                tracing::trace!(
                    ssrc = header.ssrc,
                    payload_type = block.payload_type,
                    "Skipping redundant RED block"
                );
            }
        }

        Ok(())
    }

    fn process_received_fec(&self) -> Vec<Bytes> {
        let mut state = self.state.lock();
        let mut out = Vec::new();

        for received in std::mem::take(&mut state.pending) {
            match received {
                Received::Media(packet) => {
                    state.store_media(packet.clone());
                    out.push(packet);
                }
                Received::Fec(fec) => state.store_fec(fec),
            }
        }

        state.attempt_recovery(&mut out);
        out
    }

    fn packet_counter(&self) -> FecPacketCounter {
        self.state.lock().counter
    }
}

/// Build a level-0 ULPFEC block protecting `packets` (RTP packets, same SSRC)
#[cfg(test)]
pub(crate) fn encode_ulpfec(packets: &[Bytes]) -> Vec<u8> {
    let seq_base = u16::from_be_bytes([packets[0][2], packets[0][3]]);
    let protection_length = packets
        .iter()
        .map(|p| p.len() - RTP_HEADER_MIN_LEN)
        .max()
        .unwrap_or(0);

    let mut header = [0u8; FEC_HEADER_LEN];
    let mut length = 0u16;
    let mut mask = 0u16;
    let mut payload = vec![0u8; protection_length];

    for packet in packets {
        header[0] ^= packet[0] & 0x3f;
        header[1] ^= packet[1];
        for i in 4..8 {
            header[i] ^= packet[i];
        }
        length ^= (packet.len() - RTP_HEADER_MIN_LEN) as u16;
        for (p, b) in payload.iter_mut().zip(&packet[RTP_HEADER_MIN_LEN..]) {
            *p ^= b;
        }
        let seq = u16::from_be_bytes([packet[2], packet[3]]);
        mask |= 0x8000 >> seq.wrapping_sub(seq_base);
    }
    header[2..4].copy_from_slice(&seq_base.to_be_bytes());
    header[8..10].copy_from_slice(&length.to_be_bytes());

    let mut out = header.to_vec();
    out.extend_from_slice(&(protection_length as u16).to_be_bytes());
    out.extend_from_slice(&mask.to_be_bytes());
    out.extend_from_slice(&payload);
    out
}
