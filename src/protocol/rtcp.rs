//! RTCP/RTP demultiplexing
//!
//! RTP and RTCP share a transport, so the packet type byte decides which path
//! a datagram takes. Only the common header is inspected.

use super::constants::{RTCP_MIN_HEADER_LEN, RTP_VERSION};

/// RTCP packet types recognized on the shared transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcpPacketType {
    /// Full intra request (RFC 2032)
    Fir,
    /// Extended inter-arrival jitter report
    Ij,
    SenderReport,
    ReceiverReport,
    Sdes,
    Bye,
    App,
    /// Transport-layer feedback (NACK, TWCC)
    Rtpfb,
    /// Payload-specific feedback (PLI, REMB)
    Psfb,
    /// Extended report
    Xr,
}

impl RtcpPacketType {
    /// Map the second header byte to a packet type
    ///
    /// 193 (NACK, RFC 2032) is deliberately absent: it collides with RTP
    /// payload type 65 with the marker bit set.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            192 => Some(RtcpPacketType::Fir),
            195 => Some(RtcpPacketType::Ij),
            200 => Some(RtcpPacketType::SenderReport),
            201 => Some(RtcpPacketType::ReceiverReport),
            202 => Some(RtcpPacketType::Sdes),
            203 => Some(RtcpPacketType::Bye),
            204 => Some(RtcpPacketType::App),
            205 => Some(RtcpPacketType::Rtpfb),
            206 => Some(RtcpPacketType::Psfb),
            207 => Some(RtcpPacketType::Xr),
            _ => None,
        }
    }
}

/// Whether `packet` should be routed as RTCP
pub fn is_rtcp(packet: &[u8]) -> bool {
    if packet.len() < RTCP_MIN_HEADER_LEN {
        return false;
    }
    if packet[0] >> 6 != RTP_VERSION {
        return false;
    }
    RtcpPacketType::from_byte(packet[1]).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_report_is_rtcp() {
        let sr = [0x80, 200, 0x00, 0x06, 0, 0, 0, 1];
        assert!(is_rtcp(&sr));
    }

    #[test]
    fn test_rtp_is_not_rtcp() {
        // Payload type 96 without marker
        assert!(!is_rtcp(&[0x80, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1]));
        // Payload type 72 with marker bit collides with 200, so it is treated as RTCP
        assert!(is_rtcp(&[0x80, 0x80 | 72, 0, 1]));
        // 193 is never treated as RTCP
        assert!(!is_rtcp(&[0x80, 193, 0, 1]));
    }

    #[test]
    fn test_short_or_wrong_version() {
        assert!(!is_rtcp(&[0x80, 200, 0]));
        assert!(!is_rtcp(&[0x40, 200, 0, 1]));
    }

    #[test]
    fn test_all_feedback_types() {
        for pt in [192u8, 195, 200, 201, 202, 203, 204, 205, 206, 207] {
            assert!(RtcpPacketType::from_byte(pt).is_some(), "pt {}", pt);
        }
        assert_eq!(RtcpPacketType::from_byte(194), None);
        assert_eq!(RtcpPacketType::from_byte(208), None);
    }
}
