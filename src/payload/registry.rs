//! Payload type registry
//!
//! Maps RTP payload types to codec metadata and tracks the encapsulation
//! configuration (RED/ULPFEC payload types, RTX payload mapping and SSRC)
//! needed to classify each incoming packet.

use std::collections::HashMap;

use bytes::BytesMut;
use parking_lot::Mutex;

use crate::error::PacketError;
use crate::protocol::PacketHeader;
use crate::types::MediaKind;

use super::encapsulation::EncapsulationKind;

/// Codec metadata for one payload type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSpecifics {
    /// Codec name as negotiated ("VP8", "opus", "red", "ulpfec")
    pub name: String,
    pub kind: MediaKind,
    /// RTP clock rate in Hz
    pub clock_rate: u32,
    /// Audio channel count (0 for video)
    pub channels: u8,
    /// Maximum bitrate in kbps (0 = unspecified)
    pub max_bitrate_kbps: u32,
}

impl PayloadSpecifics {
    pub fn video(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: MediaKind::Video,
            clock_rate: crate::protocol::constants::VIDEO_PAYLOAD_FREQUENCY,
            channels: 0,
            max_bitrate_kbps: 0,
        }
    }

    pub fn audio(name: impl Into<String>, clock_rate: u32, channels: u8) -> Self {
        Self {
            name: name.into(),
            kind: MediaKind::Audio,
            clock_rate,
            channels,
            max_bitrate_kbps: 0,
        }
    }

    pub fn max_bitrate_kbps(mut self, kbps: u32) -> Self {
        self.max_bitrate_kbps = kbps;
        self
    }

    fn is_red(&self) -> bool {
        self.name.eq_ignore_ascii_case("red")
    }

    fn is_ulpfec(&self) -> bool {
        self.name.eq_ignore_ascii_case("ulpfec")
    }

    fn same_codec(&self, other: &PayloadSpecifics) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.clock_rate == other.clock_rate
            && self.channels == other.channels
    }
}

/// Payload metadata lookups used by the receive pipeline
pub trait PayloadRegistry: Send + Sync {
    /// Classify the encapsulation of `header` against the current state
    fn classify(&self, header: &PacketHeader) -> EncapsulationKind;

    fn payload_specifics(&self, payload_type: u8) -> Option<PayloadSpecifics>;

    /// Remember the payload type of a non-RTX packet
    fn set_incoming_payload_type(&self, header: &PacketHeader);

    /// Last payload type forwarded as media
    fn last_media_payload_type(&self) -> Option<u8>;

    fn set_last_media_payload_type(&self, payload_type: u8);

    fn rtx_enabled(&self) -> bool;

    fn ulpfec_payload_type(&self) -> Option<u8>;

    /// Rebuild the original packet carried by an RTX packet
    fn restore_rtx_packet(
        &self,
        packet: &[u8],
        header: &PacketHeader,
        original_ssrc: u32,
        associated_payload_type: u8,
        capacity: usize,
    ) -> Result<BytesMut, PacketError> {
        super::rtx::restore_rtx_packet(
            packet,
            header,
            original_ssrc,
            associated_payload_type,
            capacity,
        )
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    payloads: HashMap<u8, PayloadSpecifics>,
    red_payload_type: Option<u8>,
    ulpfec_payload_type: Option<u8>,
    rtx_ssrc: Option<u32>,
    rtx_payload_types: HashMap<u8, u8>,
    use_rtx_payload_mapping_on_restore: bool,
    incoming_payload_type: Option<u8>,
    last_media_payload_type: Option<u8>,
}

impl RegistryInner {
    fn is_rtx(&self, header: &PacketHeader) -> bool {
        self.rtx_ssrc == Some(header.ssrc)
    }

    fn associated_payload_type(&self, rtx_payload_type: u8) -> Option<u8> {
        if self.rtx_payload_types.is_empty() {
            return None;
        }
        match self.rtx_payload_types.get(&rtx_payload_type) {
            Some(apt) if self.use_rtx_payload_mapping_on_restore => Some(*apt),
            _ => self.incoming_payload_type,
        }
    }
}

/// In-memory [`PayloadRegistry`]
#[derive(Debug, Default)]
pub struct PayloadTypeRegistry {
    inner: Mutex<RegistryInner>,
}

impl PayloadTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a receive payload type
    ///
    /// Fails if the payload type is already taken by a different codec.
    pub fn register_receive_payload(&self, payload_type: u8, specifics: PayloadSpecifics) -> bool {
        let mut inner = self.inner.lock();

        if let Some(existing) = inner.payloads.get(&payload_type) {
            if !existing.same_codec(&specifics) {
                tracing::warn!(
                    payload_type = payload_type,
                    existing = %existing.name,
                    requested = %specifics.name,
                    "Payload type already registered"
                );
                return false;
            }
        }

        if specifics.is_red() {
            inner.red_payload_type = Some(payload_type);
        } else if specifics.is_ulpfec() {
            inner.ulpfec_payload_type = Some(payload_type);
        }
        inner.payloads.insert(payload_type, specifics);
        true
    }

    /// Remove a receive payload type; returns whether it was registered
    pub fn deregister_receive_payload(&self, payload_type: u8) -> bool {
        let mut inner = self.inner.lock();

        if inner.red_payload_type == Some(payload_type) {
            inner.red_payload_type = None;
        }
        if inner.ulpfec_payload_type == Some(payload_type) {
            inner.ulpfec_payload_type = None;
        }
        inner.payloads.remove(&payload_type).is_some()
    }

    /// Find the payload type registered for a codec
    pub fn receive_payload_type(&self, specifics: &PayloadSpecifics) -> Option<u8> {
        let inner = self.inner.lock();
        inner
            .payloads
            .iter()
            .find(|(_, s)| s.same_codec(specifics))
            .map(|(pt, _)| *pt)
    }

    /// Replace whatever payload type the codec used before with `payload_type`
    pub fn set_receive_codec(&self, payload_type: u8, specifics: PayloadSpecifics) -> bool {
        if let Some(old) = self.receive_payload_type(&specifics) {
            self.deregister_receive_payload(old);
        }
        self.register_receive_payload(payload_type, specifics)
    }

    /// Map an RTX payload type to the payload type it retransmits
    pub fn set_rtx_payload_type(&self, payload_type: u8, associated_payload_type: u8) {
        self.inner
            .lock()
            .rtx_payload_types
            .insert(payload_type, associated_payload_type);
    }

    /// Use the RTX payload map when restoring, instead of the last media type
    pub fn set_use_rtx_payload_mapping_on_restore(&self, enabled: bool) {
        self.inner.lock().use_rtx_payload_mapping_on_restore = enabled;
    }

    /// Enable RTX on `ssrc`
    pub fn set_rtx_ssrc(&self, ssrc: u32) {
        self.inner.lock().rtx_ssrc = Some(ssrc);
    }

    pub fn rtx_ssrc(&self) -> Option<u32> {
        self.inner.lock().rtx_ssrc
    }

    pub fn red_payload_type(&self) -> Option<u8> {
        self.inner.lock().red_payload_type
    }
}

impl PayloadRegistry for PayloadTypeRegistry {
    fn classify(&self, header: &PacketHeader) -> EncapsulationKind {
        let inner = self.inner.lock();

        if inner.red_payload_type == Some(header.payload_type) {
            EncapsulationKind::Red {
                fec_payload_type: inner.ulpfec_payload_type,
            }
        } else if inner.is_rtx(header) {
            EncapsulationKind::Rtx {
                associated_payload_type: inner.associated_payload_type(header.payload_type),
            }
        } else {
            EncapsulationKind::Plain
        }
    }

    fn payload_specifics(&self, payload_type: u8) -> Option<PayloadSpecifics> {
        self.inner.lock().payloads.get(&payload_type).cloned()
    }

    fn set_incoming_payload_type(&self, header: &PacketHeader) {
        let mut inner = self.inner.lock();
        if !inner.is_rtx(header) {
            inner.incoming_payload_type = Some(header.payload_type);
        }
    }

    fn last_media_payload_type(&self) -> Option<u8> {
        self.inner.lock().last_media_payload_type
    }

    fn set_last_media_payload_type(&self, payload_type: u8) {
        self.inner.lock().last_media_payload_type = Some(payload_type);
    }

    fn rtx_enabled(&self) -> bool {
        self.inner.lock().rtx_ssrc.is_some()
    }

    fn ulpfec_payload_type(&self) -> Option<u8> {
        self.inner.lock().ulpfec_payload_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HeaderParser, RtpHeaderParser, RtpPacketBuilder};

    fn header(pt: u8, ssrc: u32) -> PacketHeader {
        let packet = RtpPacketBuilder::new(pt, 1, 0, ssrc).build();
        RtpHeaderParser::new().parse(&packet).unwrap()
    }

    fn video_registry() -> PayloadTypeRegistry {
        let registry = PayloadTypeRegistry::new();
        assert!(registry.register_receive_payload(96, PayloadSpecifics::video("VP8")));
        assert!(registry.register_receive_payload(116, PayloadSpecifics::video("red")));
        assert!(registry.register_receive_payload(117, PayloadSpecifics::video("ulpfec")));
        registry
    }

    #[test]
    fn test_classify_plain_and_red() {
        let registry = video_registry();

        assert_eq!(registry.classify(&header(96, 1)), EncapsulationKind::Plain);
        assert_eq!(
            registry.classify(&header(116, 1)),
            EncapsulationKind::Red {
                fec_payload_type: Some(117)
            }
        );
        assert_eq!(registry.ulpfec_payload_type(), Some(117));
    }

    #[test]
    fn test_classify_rtx_by_ssrc() {
        let registry = video_registry();
        registry.set_rtx_payload_type(97, 96);
        assert!(!registry.rtx_enabled());
        assert_eq!(registry.classify(&header(97, 0xBBBB)), EncapsulationKind::Plain);

        registry.set_rtx_ssrc(0xBBBB);
        assert!(registry.rtx_enabled());

        // Without the mapping flag the last incoming media type is used
        registry.set_incoming_payload_type(&header(96, 0xAAAA));
        assert_eq!(
            registry.classify(&header(97, 0xBBBB)),
            EncapsulationKind::Rtx {
                associated_payload_type: Some(96)
            }
        );
    }

    #[test]
    fn test_rtx_mapping_on_restore() {
        let registry = video_registry();
        registry.register_receive_payload(98, PayloadSpecifics::video("H264"));
        registry.set_rtx_ssrc(0xBBBB);
        registry.set_rtx_payload_type(97, 96);
        registry.set_rtx_payload_type(99, 98);
        registry.set_use_rtx_payload_mapping_on_restore(true);

        registry.set_incoming_payload_type(&header(96, 0xAAAA));
        assert_eq!(
            registry.classify(&header(99, 0xBBBB)),
            EncapsulationKind::Rtx {
                associated_payload_type: Some(98)
            }
        );
    }

    #[test]
    fn test_rtx_without_payload_mapping_has_no_associated_type() {
        let registry = video_registry();
        registry.set_rtx_ssrc(0xBBBB);
        registry.set_incoming_payload_type(&header(96, 0xAAAA));

        assert_eq!(
            registry.classify(&header(97, 0xBBBB)),
            EncapsulationKind::Rtx {
                associated_payload_type: None
            }
        );
    }

    #[test]
    fn test_incoming_payload_type_ignores_rtx() {
        let registry = video_registry();
        registry.set_rtx_ssrc(0xBBBB);
        registry.set_rtx_payload_type(97, 96);

        registry.set_incoming_payload_type(&header(96, 0xAAAA));
        registry.set_incoming_payload_type(&header(97, 0xBBBB));
        assert_eq!(
            registry.classify(&header(97, 0xBBBB)),
            EncapsulationKind::Rtx {
                associated_payload_type: Some(96)
            }
        );
    }

    #[test]
    fn test_register_conflict_and_codec_replace() {
        let registry = video_registry();
        assert!(!registry.register_receive_payload(96, PayloadSpecifics::video("H264")));
        // Same codec again is fine
        assert!(registry.register_receive_payload(96, PayloadSpecifics::video("VP8")));

        assert!(registry.set_receive_codec(100, PayloadSpecifics::video("VP8")));
        assert!(registry.payload_specifics(96).is_none());
        assert_eq!(registry.payload_specifics(100).unwrap().name, "VP8");
    }

    #[test]
    fn test_deregister_clears_fec_types() {
        let registry = video_registry();
        assert!(registry.deregister_receive_payload(117));
        assert_eq!(registry.ulpfec_payload_type(), None);
        assert!(registry.deregister_receive_payload(116));
        assert_eq!(registry.red_payload_type(), None);
        assert_eq!(registry.classify(&header(116, 1)), EncapsulationKind::Plain);
        assert!(!registry.deregister_receive_payload(116));
    }
}
