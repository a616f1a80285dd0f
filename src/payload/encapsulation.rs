//! Encapsulation classification

/// How an incoming RTP packet wraps its media
///
/// Derived once per packet from the live registry state, since codec
/// renegotiation can change the classification mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncapsulationKind {
    /// Bare media payload
    Plain,
    /// RED container (RFC 2198), possibly carrying ULPFEC
    Red { fec_payload_type: Option<u8> },
    /// RTX retransmission (RFC 4588) of a packet with the associated type
    Rtx { associated_payload_type: Option<u8> },
}

impl EncapsulationKind {
    pub fn is_encapsulated(&self) -> bool {
        !matches!(self, EncapsulationKind::Plain)
    }
}
