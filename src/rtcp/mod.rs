//! RTCP wire format. RFC 3550 for SR, RR and BYE. RFC 3611 for XR.

mod header;
pub use header::{RtcpHeader, RtcpType};
pub(crate) use header::LEN_HEADER;

mod list;
pub use list::ReportList;

mod sr;
pub use sr::{SenderInfo, SenderReport};

mod rr;
pub use rr::{ReceiverReport, ReceptionReport};

mod xr;
pub use xr::{Dlrr, DlrrItem, ExtendedReport, ReportBlock, Rrtr};
pub use xr::{JitterBufferAdaptive, PacketLossConcealment, UnknownBlock, VoipMetrics};
pub use xr::UNAVAILABLE;

mod bb;
pub use bb::Goodbye;

use crate::error::RtcpError;
use crate::id::Ssrc;

/// RTP/RTCP version.
pub const VERSION: u8 = 2;

/// Serialization of one RTCP packet.
pub trait RtcpPacket {
    /// The header of this packet.
    fn header(&self) -> RtcpHeader;

    /// Length of entire RTCP packet (including header) in words (4 bytes).
    fn length_words(&self) -> usize;

    /// Write this packet to the buffer.
    ///
    /// Panics if the buffer doesn't have capacity to hold length_words * 4 bytes.
    fn write_to(&self, buf: &mut [u8]) -> usize;
}

/// Declared length in bytes of the RTCP packet starting `buf`.
///
/// `None` when `buf` is not RTCP: shorter than a header, the version is
/// not 2, the packet type is outside the RTCP range of RFC 5761, or the
/// declared length runs past the end of `buf`.
pub fn length_if_rtcp(buf: &[u8]) -> Option<usize> {
    if buf.len() < LEN_HEADER {
        return None;
    }

    let version = (buf[0] & 0b1100_0000) >> 6;
    if version != VERSION {
        return None;
    }

    // RTP and RTCP multiplexed on one port tell apart by this byte.
    if !(192..=223).contains(&buf[1]) {
        return None;
    }

    let words_less_one = u16::from_be_bytes([buf[2], buf[3]]) as usize;
    let len = (words_less_one + 1) * 4;

    (len <= buf.len()).then_some(len)
}

/// Tells if `buf` starts with an RTCP packet.
pub fn is_rtcp(buf: &[u8]) -> bool {
    length_if_rtcp(buf).is_some()
}

/// RTCP packets understood by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rtcp {
    /// Sender report. Also known as SR.
    SenderReport(SenderReport),
    /// Receiver report. Also known as RR.
    ReceiverReport(ReceiverReport),
    /// Extended report. Also known as XR.
    ExtendedReport(ExtendedReport),
    /// BYE. When a stream is over.
    Goodbye(Goodbye),
}

impl Rtcp {
    /// Parse every packet of a compound RTCP packet.
    ///
    /// Packets that fail to parse, or that are of a type not modelled by
    /// [`Rtcp`], are skipped. Parsing stops at the first packet whose
    /// declared length runs past the buffer.
    pub fn read_packet(buf: &[u8]) -> Vec<Rtcp> {
        let mut out = vec![];
        let mut buf = buf;

        while let Some(full_length) = length_if_rtcp(buf) {
            let has_padding = buf[0] & 0b0010_0000 > 0;

            let unpadded_length = if has_padding {
                let pad = buf[full_length - 1] as usize;
                if full_length < LEN_HEADER + pad {
                    debug!("RTCP padding exceeds length: {} < {}", full_length, pad);
                    break;
                }
                full_length - pad
            } else {
                full_length
            };

            match Rtcp::try_from(&buf[..unpadded_length]) {
                Ok(v) => out.push(v),
                Err(e) => trace!("Skip RTCP packet: {}", e),
            }

            buf = &buf[full_length..];
        }

        out
    }

    /// Parse the single RTCP packet at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Rtcp, RtcpError> {
        let header: RtcpHeader = buf.try_into()?;

        match header.rtcp_type() {
            RtcpType::SenderReport
            | RtcpType::ReceiverReport
            | RtcpType::ExtendedReport
            | RtcpType::Goodbye => Ok(Rtcp::try_from(buf)?),
            t => Err(RtcpError::UnexpectedType(t as u8)),
        }
    }

    /// Serialize packets into one compound packet.
    pub fn write_packet(packets: &[Rtcp]) -> Vec<u8> {
        let len = packets.iter().map(|p| p.length_words() * 4).sum();
        let mut buf = vec![0; len];

        let mut offset = 0;
        for p in packets {
            offset += p.write_to(&mut buf[offset..]);
        }

        buf
    }

    /// SSRC of the originator.
    pub fn ssrc(&self) -> Option<Ssrc> {
        match self {
            Rtcp::SenderReport(v) => Some(v.sender_info.ssrc),
            Rtcp::ReceiverReport(v) => Some(v.sender_ssrc),
            Rtcp::ExtendedReport(v) => Some(v.ssrc),
            Rtcp::Goodbye(v) => v.reports.get(0).copied(),
        }
    }
}

impl RtcpPacket for Rtcp {
    fn header(&self) -> RtcpHeader {
        match self {
            Rtcp::SenderReport(v) => v.header(),
            Rtcp::ReceiverReport(v) => v.header(),
            Rtcp::ExtendedReport(v) => v.header(),
            Rtcp::Goodbye(v) => v.header(),
        }
    }

    fn length_words(&self) -> usize {
        match self {
            Rtcp::SenderReport(v) => v.length_words(),
            Rtcp::ReceiverReport(v) => v.length_words(),
            Rtcp::ExtendedReport(v) => v.length_words(),
            Rtcp::Goodbye(v) => v.length_words(),
        }
    }

    fn write_to(&self, buf: &mut [u8]) -> usize {
        match self {
            Rtcp::SenderReport(v) => v.write_to(buf),
            Rtcp::ReceiverReport(v) => v.write_to(buf),
            Rtcp::ExtendedReport(v) => v.write_to(buf),
            Rtcp::Goodbye(v) => v.write_to(buf),
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for Rtcp {
    type Error = &'static str;

    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        let header: RtcpHeader = buf.try_into()?;

        // By constraining the length, all subparsing can go
        // until they exhaust the buffer length.
        let end = header.length_bytes().min(buf.len());
        let body = &buf[LEN_HEADER..end];
        let count = header.count();

        Ok(match header.rtcp_type() {
            RtcpType::SenderReport => Rtcp::SenderReport((count, body).try_into()?),
            RtcpType::ReceiverReport => Rtcp::ReceiverReport((count, body).try_into()?),
            RtcpType::ExtendedReport => Rtcp::ExtendedReport(body.try_into()?),
            RtcpType::Goodbye => Rtcp::Goodbye((count, body).try_into()?),
            _ => return Err("Ignore RTCP type"),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn report(ssrc: u32) -> ReceptionReport {
        ReceptionReport {
            ssrc: ssrc.into(),
            fraction_lost: 3,
            packets_lost: 1234,
            max_seq: 4000,
            jitter: 5,
            last_sr_time: 12,
            last_sr_delay: 1,
        }
    }

    #[test]
    fn is_rtcp_checks_version_and_length() {
        // RR with no reports, 2 words.
        let rr = [0x80, 0xc9, 0x00, 0x01, 0, 0, 0, 1];
        assert!(is_rtcp(&rr));
        assert_eq!(length_if_rtcp(&rr), Some(8));

        // truncated.
        assert!(!is_rtcp(&rr[..6]));
        assert!(!is_rtcp(&rr[..3]));

        // version 1.
        let mut v1 = rr;
        v1[0] = 0x40;
        assert!(!is_rtcp(&v1));

        // RTP, payload type 96 and sequence number 1.
        assert!(!is_rtcp(&[0x80, 96, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 1]));
    }

    #[test]
    fn roundtrip_compound() {
        let sr = Rtcp::SenderReport(SenderReport {
            sender_info: SenderInfo {
                ssrc: 1.into(),
                ntp_time: 0xe000_0000_8000_0000,
                rtp_time: 160,
                sender_packet_count: 50,
                sender_octet_count: 8000,
            },
            reports: ReportList::lists_from_iter([report(2), report(3)]).remove(0),
        });
        let rr = Rtcp::ReceiverReport(ReceiverReport {
            sender_ssrc: 1.into(),
            reports: report(4).into(),
        });
        let bye = Rtcp::Goodbye(Goodbye {
            reports: Ssrc::from(1).into(),
        });

        let packets = vec![sr, rr, bye];
        let buf = Rtcp::write_packet(&packets);
        assert_eq!(buf.len(), (7 + 12 + 8 + 2) * 4);
        assert_eq!(buf[0], 0x82);

        let parsed = Rtcp::read_packet(&buf);
        assert_eq!(parsed, packets);
        assert_eq!(parsed[2].ssrc(), Some(1.into()));
    }

    #[test]
    fn parse_single() {
        let rr = [0x80, 0xc9, 0x00, 0x01, 0, 0, 0, 1];
        assert!(matches!(Rtcp::parse(&rr), Ok(Rtcp::ReceiverReport(_))));

        let sdes = [0x81, 0xca, 0x00, 0x01, 0, 0, 0, 9];
        assert_eq!(Rtcp::parse(&sdes), Err(RtcpError::UnexpectedType(202)));

        assert!(matches!(Rtcp::parse(&rr[..2]), Err(RtcpError::Parse(_))));
    }

    #[test]
    fn skip_unmodelled_types() {
        let mut buf = vec![0x81, 0xca, 0x00, 0x01, 0, 0, 0, 9]; // SDES
        buf.extend_from_slice(&[0x80, 0xcb, 0x00, 0x00]); // BYE, zero sources
        let parsed = Rtcp::read_packet(&buf);
        assert_eq!(parsed.len(), 1);
        assert!(matches!(parsed[0], Rtcp::Goodbye(_)));
    }
}
