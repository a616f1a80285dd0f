//! RTP header parsing
//!
//! Fixed header layout (RFC 3550 §5.1):
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |                    CSRC list (0-15 items)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   profile (0xBEDE)            |   length (32-bit words)       |
//! |   one-byte extension elements (RFC 5285) ...                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Only extensions registered in the parser's [`ExtensionMap`] are decoded;
//! unknown ids are skipped.

use parking_lot::RwLock;

use crate::error::HeaderError;

use super::constants::*;

/// Header extensions understood by the receive path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtensionType {
    TransmissionTimeOffset,
    AbsoluteSendTime,
    VideoRotation,
    TransportSequenceNumber,
}

impl ExtensionType {
    /// Element data length in bytes
    fn data_len(self) -> usize {
        match self {
            ExtensionType::TransmissionTimeOffset => 3,
            ExtensionType::AbsoluteSendTime => 3,
            ExtensionType::VideoRotation => 1,
            ExtensionType::TransportSequenceNumber => 2,
        }
    }
}

/// Coordination of video orientation (CVO) rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl VideoRotation {
    /// Decode the rotation bits of a CVO byte
    pub fn from_cvo_byte(byte: u8) -> Self {
        match byte & 0x03 {
            0 => VideoRotation::Deg0,
            1 => VideoRotation::Deg90,
            2 => VideoRotation::Deg180,
            _ => VideoRotation::Deg270,
        }
    }

    pub fn to_cvo_byte(self) -> u8 {
        match self {
            VideoRotation::Deg0 => 0,
            VideoRotation::Deg90 => 1,
            VideoRotation::Deg180 => 2,
            VideoRotation::Deg270 => 3,
        }
    }
}

/// Decoded header extension values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderExtensions {
    /// Transmission time offset in RTP ticks (signed 24-bit)
    pub transmission_time_offset: Option<i32>,
    /// Absolute send time, 6.18 fixed point seconds
    pub absolute_send_time: Option<u32>,
    /// Video rotation
    pub video_rotation: Option<VideoRotation>,
    /// Transport-wide sequence number
    pub transport_sequence_number: Option<u16>,
}

/// Parsed RTP header
///
/// The parsed view never owns the packet bytes; `header_length` and
/// `padding_length` locate the payload inside the original buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrcs: Vec<u32>,
    pub extensions: HeaderExtensions,
    /// Fixed header + CSRCs + extension block
    pub header_length: usize,
    /// Trailing padding bytes (including the count byte)
    pub padding_length: usize,
    /// RTP clock rate, filled in by the receive pipeline
    pub payload_type_frequency: u32,
}

impl PacketHeader {
    /// Payload length of a packet of `total_length` bytes, excluding padding
    pub fn payload_length(&self, total_length: usize) -> usize {
        total_length.saturating_sub(self.header_length + self.padding_length)
    }
}

/// Mapping of one-byte extension ids (1-14) to extension types
#[derive(Debug, Clone, Default)]
pub struct ExtensionMap {
    ids: [Option<ExtensionType>; 15],
}

impl ExtensionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `kind` under `id`
    ///
    /// Fails if the id is out of range or already names a different type.
    pub fn register(&mut self, kind: ExtensionType, id: u8) -> bool {
        if !(1..=14).contains(&id) {
            return false;
        }
        match self.ids[id as usize] {
            Some(existing) if existing != kind => false,
            _ => {
                self.deregister(kind);
                self.ids[id as usize] = Some(kind);
                true
            }
        }
    }

    /// Remove `kind`; returns whether it was registered
    pub fn deregister(&mut self, kind: ExtensionType) -> bool {
        let mut found = false;
        for slot in self.ids.iter_mut() {
            if *slot == Some(kind) {
                *slot = None;
                found = true;
            }
        }
        found
    }

    pub fn get(&self, id: u8) -> Option<ExtensionType> {
        self.ids.get(id as usize).copied().flatten()
    }

    pub fn id_of(&self, kind: ExtensionType) -> Option<u8> {
        self.ids
            .iter()
            .position(|slot| *slot == Some(kind))
            .map(|pos| pos as u8)
    }
}

/// Turns raw bytes into a [`PacketHeader`]
pub trait HeaderParser: Send + Sync {
    fn parse(&self, packet: &[u8]) -> Result<PacketHeader, HeaderError>;

    /// Start decoding `kind` under extension id `id`
    fn register_extension(&self, kind: ExtensionType, id: u8) -> bool;

    /// Stop decoding `kind`
    fn deregister_extension(&self, kind: ExtensionType) -> bool;
}

/// RFC 3550 header parser with RFC 5285 one-byte extensions
#[derive(Debug, Default)]
pub struct RtpHeaderParser {
    extensions: RwLock<ExtensionMap>,
}

impl RtpHeaderParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_one_byte_extensions(&self, data: &[u8], out: &mut HeaderExtensions) {
        let map = self.extensions.read();
        let mut pos = 0;

        while pos < data.len() {
            let byte = data[pos];
            if byte == 0 {
                // Padding between elements
                pos += 1;
                continue;
            }

            let id = byte >> 4;
            let len = (byte & 0x0f) as usize + 1;
            if id == 15 {
                break;
            }
            let start = pos + 1;
            let end = start + len;
            if end > data.len() {
                tracing::debug!(id = id, len = len, "Truncated header extension element");
                break;
            }

            if let Some(kind) = map.get(id) {
                if kind.data_len() != len {
                    tracing::debug!(id = id, len = len, kind = ?kind, "Unexpected extension length");
                } else {
                    let value = &data[start..end];
                    match kind {
                        ExtensionType::TransmissionTimeOffset => {
                            let raw = u32::from_be_bytes([0, value[0], value[1], value[2]]);
                            // Sign-extend 24 bits
                            out.transmission_time_offset = Some(((raw << 8) as i32) >> 8);
                        }
                        ExtensionType::AbsoluteSendTime => {
                            out.absolute_send_time =
                                Some(u32::from_be_bytes([0, value[0], value[1], value[2]]));
                        }
                        ExtensionType::VideoRotation => {
                            out.video_rotation = Some(VideoRotation::from_cvo_byte(value[0]));
                        }
                        ExtensionType::TransportSequenceNumber => {
                            out.transport_sequence_number =
                                Some(u16::from_be_bytes([value[0], value[1]]));
                        }
                    }
                }
            }

            pos = end;
        }
    }
}

impl HeaderParser for RtpHeaderParser {
    fn parse(&self, packet: &[u8]) -> Result<PacketHeader, HeaderError> {
        if packet.len() < RTP_HEADER_MIN_LEN {
            return Err(HeaderError::TooShort);
        }

        let version = packet[0] >> 6;
        if version != RTP_VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }

        let has_padding = packet[0] & 0x20 != 0;
        let has_extension = packet[0] & 0x10 != 0;
        let csrc_count = (packet[0] & 0x0f) as usize;

        let marker = packet[1] & RTP_MARKER_BIT != 0;
        let payload_type = packet[1] & 0x7f;
        let sequence_number = u16::from_be_bytes([packet[2], packet[3]]);
        let timestamp = u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]);
        let ssrc = read_ssrc(packet).ok_or(HeaderError::TooShort)?;

        let mut header_length = RTP_HEADER_MIN_LEN + csrc_count * 4;
        if packet.len() < header_length {
            return Err(HeaderError::TooShort);
        }

        let csrcs = packet[RTP_HEADER_MIN_LEN..header_length]
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        let mut extensions = HeaderExtensions::default();
        if has_extension {
            if packet.len() < header_length + 4 {
                return Err(HeaderError::InvalidExtension);
            }
            let profile = u16::from_be_bytes([packet[header_length], packet[header_length + 1]]);
            let words =
                u16::from_be_bytes([packet[header_length + 2], packet[header_length + 3]]) as usize;
            let start = header_length + 4;
            let end = start + words * 4;
            if packet.len() < end {
                return Err(HeaderError::InvalidExtension);
            }
            if profile == ONE_BYTE_EXTENSION_PROFILE {
                self.parse_one_byte_extensions(&packet[start..end], &mut extensions);
            }
            header_length = end;
        }

        let padding_length = if has_padding {
            packet[packet.len() - 1] as usize
        } else {
            0
        };
        if header_length + padding_length > packet.len() {
            return Err(HeaderError::InvalidPadding);
        }

        Ok(PacketHeader {
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrcs,
            extensions,
            header_length,
            padding_length,
            payload_type_frequency: 0,
        })
    }

    fn register_extension(&self, kind: ExtensionType, id: u8) -> bool {
        self.extensions.write().register(kind, id)
    }

    fn deregister_extension(&self, kind: ExtensionType) -> bool {
        self.extensions.write().deregister(kind)
    }
}

/// Read the SSRC from its fixed offset without parsing the rest
pub fn read_ssrc(packet: &[u8]) -> Option<u32> {
    let bytes = packet.get(RTP_SSRC_OFFSET..RTP_SSRC_OFFSET + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::builder::RtpPacketBuilder;

    #[test]
    fn test_parse_fixed_header() {
        let packet = RtpPacketBuilder::new(96, 100, 3000, 0x1234)
            .marker(true)
            .payload(&[1, 2, 3, 4])
            .build();

        let header = RtpHeaderParser::new().parse(&packet).unwrap();
        assert!(header.marker);
        assert_eq!(header.payload_type, 96);
        assert_eq!(header.sequence_number, 100);
        assert_eq!(header.timestamp, 3000);
        assert_eq!(header.ssrc, 0x1234);
        assert_eq!(header.header_length, 12);
        assert_eq!(header.padding_length, 0);
        assert_eq!(header.payload_length(packet.len()), 4);
    }

    #[test]
    fn test_parse_csrcs_and_padding() {
        let packet = RtpPacketBuilder::new(111, 7, 0, 42)
            .csrcs(&[0xAAAA, 0xBBBB])
            .payload(&[9; 10])
            .padding(4)
            .build();

        let header = RtpHeaderParser::new().parse(&packet).unwrap();
        assert_eq!(header.csrcs, vec![0xAAAA, 0xBBBB]);
        assert_eq!(header.header_length, 20);
        assert_eq!(header.padding_length, 4);
        assert_eq!(header.payload_length(packet.len()), 10);
    }

    #[test]
    fn test_registered_extensions_decoded() {
        let parser = RtpHeaderParser::new();
        assert!(parser.register_extension(ExtensionType::TransmissionTimeOffset, 1));
        assert!(parser.register_extension(ExtensionType::AbsoluteSendTime, 3));
        assert!(parser.register_extension(ExtensionType::VideoRotation, 4));
        assert!(parser.register_extension(ExtensionType::TransportSequenceNumber, 5));

        let packet = RtpPacketBuilder::new(96, 1, 0, 1)
            .extension(1, &[0xFF, 0xFF, 0xFE]) // -2
            .extension(3, &[0x12, 0x34, 0x56])
            .extension(4, &[0x01])
            .extension(5, &[0x01, 0x02])
            .payload(&[0; 8])
            .build();

        let header = parser.parse(&packet).unwrap();
        assert_eq!(header.extensions.transmission_time_offset, Some(-2));
        assert_eq!(header.extensions.absolute_send_time, Some(0x123456));
        assert_eq!(header.extensions.video_rotation, Some(VideoRotation::Deg90));
        assert_eq!(header.extensions.transport_sequence_number, Some(0x0102));
        assert_eq!(header.payload_length(packet.len()), 8);
    }

    #[test]
    fn test_unregistered_extension_skipped() {
        let parser = RtpHeaderParser::new();
        let packet = RtpPacketBuilder::new(96, 1, 0, 1)
            .extension(4, &[0x02])
            .payload(&[0; 2])
            .build();

        let header = parser.parse(&packet).unwrap();
        assert_eq!(header.extensions, HeaderExtensions::default());
        assert_eq!(header.payload_length(packet.len()), 2);

        parser.register_extension(ExtensionType::VideoRotation, 4);
        let header = parser.parse(&packet).unwrap();
        assert_eq!(header.extensions.video_rotation, Some(VideoRotation::Deg180));

        assert!(parser.deregister_extension(ExtensionType::VideoRotation));
        let header = parser.parse(&packet).unwrap();
        assert_eq!(header.extensions.video_rotation, None);
    }

    #[test]
    fn test_extension_map_id_conflicts() {
        let mut map = ExtensionMap::new();
        assert!(!map.register(ExtensionType::VideoRotation, 0));
        assert!(!map.register(ExtensionType::VideoRotation, 15));
        assert!(map.register(ExtensionType::VideoRotation, 2));
        assert!(!map.register(ExtensionType::AbsoluteSendTime, 2));

        // Moving a type to a new id frees the old one
        assert!(map.register(ExtensionType::VideoRotation, 6));
        assert_eq!(map.get(2), None);
        assert_eq!(map.id_of(ExtensionType::VideoRotation), Some(6));
    }

    #[test]
    fn test_malformed_headers() {
        let parser = RtpHeaderParser::new();

        assert_eq!(parser.parse(&[0x80; 11]), Err(HeaderError::TooShort));

        let mut packet = RtpPacketBuilder::new(96, 1, 0, 1).payload(&[0; 4]).build().to_vec();
        packet[0] = 0x40; // version 1
        assert_eq!(parser.parse(&packet), Err(HeaderError::UnsupportedVersion(1)));

        let mut packet = RtpPacketBuilder::new(96, 1, 0, 1).build().to_vec();
        packet[0] |= 0x02; // two CSRCs that are not there
        assert_eq!(parser.parse(&packet), Err(HeaderError::TooShort));

        let mut packet = RtpPacketBuilder::new(96, 1, 0, 1).payload(&[0; 4]).build().to_vec();
        packet[0] |= 0x10; // extension flag, but only 4 payload bytes claiming 16 words
        packet[14] = 0x00;
        packet[15] = 0x10;
        assert_eq!(parser.parse(&packet), Err(HeaderError::InvalidExtension));

        let mut packet = RtpPacketBuilder::new(96, 1, 0, 1).payload(&[0; 3]).build().to_vec();
        packet[0] |= 0x20;
        *packet.last_mut().unwrap() = 200;
        assert_eq!(parser.parse(&packet), Err(HeaderError::InvalidPadding));
    }

    #[test]
    fn test_read_ssrc() {
        let packet = RtpPacketBuilder::new(0, 0, 0, 0xDEADBEEF).build();
        assert_eq!(read_ssrc(&packet), Some(0xDEADBEEF));
        assert_eq!(read_ssrc(&packet[..11]), None);
    }
}
