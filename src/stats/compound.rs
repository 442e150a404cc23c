//! Splicing XR packets in and out of compound RTCP packets.
//!
//! All offsets here are absolute offsets into the packet buffer.

use crate::id::Ssrc;
use crate::packet::{rebase, Packet};
use crate::rtcp::{length_if_rtcp, ExtendedReport, Goodbye, Rtcp, RtcpPacket, RtcpType};
use crate::rtcp::LEN_HEADER;

const SR: u8 = RtcpType::SenderReport as u8;
const RR: u8 = RtcpType::ReceiverReport as u8;
const XR: u8 = RtcpType::ExtendedReport as u8;
const BYE: u8 = RtcpType::Goodbye as u8;

// Sender info of an SR, after the originator SSRC.
const LEN_SENDER_INFO: usize = 20;
// One reception report block.
const LEN_REPORT_BLOCK: usize = 24;

/// Sub-packets of the compound packet in `pkt` as `(absolute offset, length)`.
///
/// Stops at the first sub-packet that is not RTCP.
fn sub_packets(pkt: &Packet) -> Vec<(usize, usize)> {
    let start = pkt.offset();
    let end = start + pkt.len();
    let buf = pkt.buffer();

    let mut out = vec![];
    let mut off = start;

    while off < end {
        let Some(len) = length_if_rtcp(&buf[off..end]) else {
            break;
        };
        out.push((off, len));
        off += len;
    }

    out
}

/// Cut every XR out of the compound packet in `pkt`.
///
/// XRs that fail to parse stay in the packet. `None` when nothing was cut.
pub fn remove_extended_reports(pkt: &mut Packet) -> Option<Vec<ExtendedReport>> {
    let mut removed = vec![];
    let mut off = pkt.offset();

    loop {
        let end = pkt.offset() + pkt.len();
        if off >= end {
            break;
        }

        let buf = pkt.buffer();
        let Some(len) = length_if_rtcp(&buf[off..end]) else {
            break;
        };

        if buf[off + 1] != XR {
            off += len;
            continue;
        }

        match Rtcp::parse(&buf[off..off + len]) {
            Ok(Rtcp::ExtendedReport(xr)) => {
                pkt.buffer_mut().copy_within(off + len..end, off);
                let delta = pkt.shrink(len);
                off = rebase(off, delta);
                removed.push(xr);
            }
            Ok(_) => off += len,
            Err(e) => {
                debug!("Keep unparsable XR: {}", e);
                off += len;
            }
        }
    }

    (!removed.is_empty()).then_some(removed)
}

/// Where an XR from `ssrc` goes: before a BYE of `ssrc`, else after the
/// last RTCP sub-packet.
///
/// A malformed BYE also gets the XR in front of it. Trailing bytes that are
/// not RTCP stay after the XR.
fn insertion_offset(pkt: &Packet, ssrc: Ssrc) -> usize {
    let buf = pkt.buffer();
    let mut rtcp_end = pkt.offset();

    for (off, len) in sub_packets(pkt) {
        rtcp_end = off + len;

        if buf[off + 1] != BYE {
            continue;
        }

        match Goodbye::lists(&buf[off..off + len], ssrc) {
            Ok(true) => return off,
            Ok(false) => {}
            Err(e) => {
                debug!("Insert XR before malformed BYE: {}", e);
                return off;
            }
        }
    }

    rtcp_end
}

/// Splice `xr` into the compound packet in `pkt`.
///
/// Returns false and leaves the packet contents as they were if the XR
/// did not serialize to its declared length.
pub fn add_extended_report(pkt: &mut Packet, xr: &ExtendedReport) -> bool {
    let xr_len = xr.length_words() * 4;
    let at = insertion_offset(pkt, xr.ssrc);

    let delta = pkt.grow(xr_len);
    let at = rebase(at, delta);

    let len = pkt.len();
    let end = pkt.offset() + len;
    let buf = pkt.buffer_mut();

    buf.copy_within(at..end, at + xr_len);
    let written = xr.write_to(&mut buf[at..at + xr_len]);

    if written != xr_len {
        warn!("XR wrote {} bytes, expected {}", written, xr_len);
        buf.copy_within(at + xr_len..end + xr_len, at);
        return false;
    }

    pkt.set_len(len + xr_len);
    true
}

/// One SR or RR of a compound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReportSources {
    /// Originator of the report.
    pub sender_ssrc: Ssrc,
    /// Sources the report gives feedback on.
    pub sources: Vec<Ssrc>,
}

/// Originator and reported on sources of each SR and RR in `pkt`.
///
/// `None` when any SR or RR is too short for its report count.
pub(crate) fn report_sources(pkt: &Packet) -> Option<Vec<ReportSources>> {
    let buf = pkt.buffer();
    let mut out = vec![];

    for (off, len) in sub_packets(pkt) {
        let pt = buf[off + 1];
        if pt != SR && pt != RR {
            continue;
        }

        let count = (buf[off] & 0b0001_1111) as usize;

        // header, sender ssrc, report blocks
        let mut min_len = LEN_HEADER + 4 + count * LEN_REPORT_BLOCK;
        let mut first_block = off + 8;
        if pt == SR {
            min_len += LEN_SENDER_INFO;
            first_block += LEN_SENDER_INFO;
        }

        if len < min_len {
            error!("RTCP packet type {} too short: {} < {}", pt, len, min_len);
            return None;
        }

        let sender_ssrc = read_ssrc(&buf[off + 4..]);
        let sources = (0..count)
            .map(|i| read_ssrc(&buf[first_block + i * LEN_REPORT_BLOCK..]))
            .collect();

        out.push(ReportSources {
            sender_ssrc,
            sources,
        });
    }

    Some(out)
}

fn read_ssrc(buf: &[u8]) -> Ssrc {
    u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]).into()
}

#[cfg(test)]
mod test {
    use rand::Rng;

    use super::*;
    use crate::rtcp::{ReceiverReport, ReceptionReport, ReportBlock, ReportList};
    use crate::rtcp::{SenderInfo, SenderReport, UnknownBlock, VoipMetrics};

    fn reception(ssrc: u32) -> ReceptionReport {
        ReceptionReport {
            ssrc: ssrc.into(),
            fraction_lost: 1,
            packets_lost: 2,
            max_seq: 3,
            jitter: 4,
            last_sr_time: 5,
            last_sr_delay: 6,
        }
    }

    fn compound(with_bye: bool) -> Vec<u8> {
        let mut packets = vec![
            Rtcp::SenderReport(SenderReport {
                sender_info: SenderInfo {
                    ssrc: 1.into(),
                    ntp_time: 99,
                    rtp_time: 160,
                    sender_packet_count: 10,
                    sender_octet_count: 1600,
                },
                reports: ReportList::lists_from_iter([reception(7), reception(8)]).remove(0),
            }),
            Rtcp::ReceiverReport(ReceiverReport {
                sender_ssrc: 2.into(),
                reports: reception(9).into(),
            }),
        ];
        if with_bye {
            packets.push(Rtcp::Goodbye(Goodbye {
                reports: Ssrc::from(1).into(),
            }));
        }
        Rtcp::write_packet(&packets)
    }

    fn random_xr(rng: &mut impl Rng, ssrc: u32) -> ExtendedReport {
        let mut blocks = vec![];
        for _ in 0..rng.random_range(1..4) {
            let block = if rng.random_bool(0.7) {
                ReportBlock::VoipMetrics(VoipMetrics {
                    ssrc: rng.random::<u32>().into(),
                    loss_rate: rng.random(),
                    round_trip_delay: rng.random(),
                    mos_cq: rng.random_range(10..=45),
                    ..Default::default()
                })
            } else {
                ReportBlock::Unknown(UnknownBlock {
                    block_type: 42,
                    type_specific: rng.random(),
                    body: vec![rng.random(); 4 * rng.random_range(0..3)],
                })
            };
            blocks.push(block);
        }
        ExtendedReport {
            ssrc: ssrc.into(),
            blocks,
        }
    }

    #[test]
    fn xr_roundtrip_restores_packet() {
        let mut rng = rand::rng();

        for with_bye in [false, true] {
            let original = compound(with_bye);

            // leading garbage so the packet does not start at 0.
            let mut buf = vec![0xff; 6];
            buf.extend_from_slice(&original);
            let mut pkt = Packet::new(buf, 6, original.len());

            let n = rng.random_range(1..5);
            let xrs: Vec<_> = (0..n).map(|i| random_xr(&mut rng, 1 + i % 2)).collect();

            for xr in &xrs {
                assert!(add_extended_report(&mut pkt, xr));
            }
            assert!(pkt.len() > original.len());

            let mut removed = remove_extended_reports(&mut pkt).unwrap();
            assert_eq!(pkt.as_slice(), &original[..]);

            let mut expected = xrs.clone();
            removed.sort_by_key(|x| format!("{:?}", x));
            expected.sort_by_key(|x| format!("{:?}", x));
            assert_eq!(removed, expected);
        }
    }

    #[test]
    fn xr_goes_before_bye_of_same_ssrc() {
        let mut pkt = Packet::from_slice(&compound(true));
        let xr = random_xr(&mut rand::rng(), 1);
        assert!(add_extended_report(&mut pkt, &xr));

        let parsed = Rtcp::read_packet(pkt.as_slice());
        assert!(matches!(parsed[2], Rtcp::ExtendedReport(_)));
        assert!(matches!(parsed[3], Rtcp::Goodbye(_)));

        // BYE of another source, XR goes last.
        let mut pkt = Packet::from_slice(&compound(true));
        let xr = random_xr(&mut rand::rng(), 5);
        assert!(add_extended_report(&mut pkt, &xr));
        let parsed = Rtcp::read_packet(pkt.as_slice());
        assert!(matches!(parsed[3], Rtcp::ExtendedReport(_)));
    }

    #[test]
    fn xr_goes_before_malformed_bye() {
        let mut buf = compound(false);
        // BYE claiming 3 sources in 2 words.
        buf.extend_from_slice(&[0x83, 0xcb, 0x00, 0x01, 0, 0, 0, 9]);
        let mut pkt = Packet::from_slice(&buf);

        let xr = random_xr(&mut rand::rng(), 1);
        let at = buf.len() - 8;
        assert!(add_extended_report(&mut pkt, &xr));
        assert_eq!(pkt.as_slice()[at + 1], XR);
        assert_eq!(&pkt.as_slice()[pkt.len() - 8..], &buf[at..]);
    }

    #[test]
    fn xr_goes_before_trailing_bytes() {
        let rr = Rtcp::write_packet(&[Rtcp::ReceiverReport(ReceiverReport {
            sender_ssrc: 1.into(),
            reports: reception(9).into(),
        })]);
        let mut original = rr.clone();
        original.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 0xaa, 0xbb]);

        let mut pkt = Packet::from_slice(&original);
        let xr = random_xr(&mut rand::rng(), 1);
        assert!(add_extended_report(&mut pkt, &xr));

        assert_eq!(pkt.as_slice()[rr.len() + 1], XR);
        assert!(pkt.as_slice().ends_with(&[0x00, 0x00, 0x00, 0x01, 0xaa, 0xbb]));

        let removed = remove_extended_reports(&mut pkt).unwrap();
        assert_eq!(removed, vec![xr]);
        assert_eq!(pkt.as_slice(), &original[..]);
    }

    #[test]
    fn nothing_removed_is_none() {
        let original = compound(true);
        let mut pkt = Packet::from_slice(&original);
        assert_eq!(remove_extended_reports(&mut pkt), None);
        assert_eq!(pkt.as_slice(), &original[..]);
    }

    #[test]
    fn unparsable_xr_is_skipped() {
        let mut buf = compound(false);
        // XR with a VoIP metrics block header but a truncated body.
        buf.extend_from_slice(&[0x80, 0xcf, 0x00, 0x02, 0, 0, 0, 1, 7, 0, 0, 8]);
        let good = random_xr(&mut rand::rng(), 1);
        let mut pkt = Packet::from_slice(&buf);
        assert!(add_extended_report(&mut pkt, &good));

        let removed = remove_extended_reports(&mut pkt).unwrap();
        assert_eq!(removed, vec![good]);
        assert_eq!(pkt.as_slice(), &buf[..]);
    }

    #[test]
    fn report_sources_of_sr_and_rr() {
        let pkt = Packet::from_slice(&compound(true));
        let sources = report_sources(&pkt).unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].sender_ssrc, 1.into());
        assert_eq!(sources[0].sources, vec![7.into(), 8.into()]);
        assert_eq!(sources[1].sender_ssrc, 2.into());
        assert_eq!(sources[1].sources, vec![9.into()]);
    }

    #[test]
    fn report_sources_rejects_short_report() {
        // RR claiming 2 report blocks with none present.
        let pkt = Packet::from_slice(&[0x82, 0xc9, 0x00, 0x01, 0, 0, 0, 1]);
        assert_eq!(report_sources(&pkt), None);
    }
}
