use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

use crate::config::StatisticsConfig;
use crate::id::Ssrc;
use crate::packet::Packet;
use crate::rtcp::{is_rtcp, ExtendedReport, ReportBlock, Rtcp};

use super::compound::{add_extended_report, remove_extended_reports, report_sources};
use super::compound::ReportSources;
use super::metrics::{build_voip_metrics, BlockContext, ReceiveStatsProvider};
use super::store::{RtcpReport, RtcpReportStore};

/// A stage in the packet pipeline.
///
/// `transform` works on outgoing packets, `reverse_transform` on incoming.
/// Returning `None` drops the packet.
pub trait PacketTransformer: Send + Sync {
    /// Process an outgoing packet.
    fn transform(&self, pkt: Packet) -> Option<Packet>;

    /// Process an incoming packet.
    fn reverse_transform(&self, pkt: Packet) -> Option<Packet>;
}

#[derive(Debug, Default)]
struct Indicators {
    lost: u32,
    min_jitter: Option<u32>,
    max_jitter: Option<u32>,
}

/// RTCP statistics of one media stream.
///
/// Records sent and received reports in a [`RtcpReportStore`], removes XR
/// packets from incoming RTCP and adds VoIP Metrics XR packets to outgoing
/// RTCP when they were negotiated.
pub struct StatisticsEngine {
    config: RwLock<StatisticsConfig>,
    store: Arc<RtcpReportStore>,
    provider: Arc<dyn ReceiveStatsProvider>,
    last_sent_seq: Mutex<HashMap<Ssrc, u16>>,
    indicators: Mutex<Indicators>,
}

impl StatisticsEngine {
    /// Engine recording into `store`, reading receive statistics from `provider`.
    pub fn new(
        config: StatisticsConfig,
        store: Arc<RtcpReportStore>,
        provider: Arc<dyn ReceiveStatsProvider>,
    ) -> Self {
        StatisticsEngine {
            config: RwLock::new(config),
            store,
            provider,
            last_sent_seq: Mutex::new(HashMap::new()),
            indicators: Mutex::new(Indicators::default()),
        }
    }

    /// The store reports are recorded in.
    pub fn store(&self) -> &Arc<RtcpReportStore> {
        &self.store
    }

    /// Current config.
    pub fn config(&self) -> StatisticsConfig {
        self.config.read().clone()
    }

    /// Change the active codec, for example after renegotiation.
    pub fn set_encoding(&self, encoding: Option<&str>) {
        self.config.write().encoding = encoding.map(|e| e.to_string());
    }

    /// Turn VoIP Metrics XR on or off, for example after renegotiation.
    pub fn set_voip_metrics(&self, enabled: bool) {
        self.config.write().voip_metrics = enabled;
    }

    /// Cumulative packets lost as last reported by the remote.
    pub fn lost(&self) -> u32 {
        self.indicators.lock().lost
    }

    /// Smallest interarrival jitter reported by the remote.
    pub fn min_interarrival_jitter(&self) -> Option<u32> {
        self.indicators.lock().min_jitter
    }

    /// Largest interarrival jitter reported by the remote.
    pub fn max_interarrival_jitter(&self) -> Option<u32> {
        self.indicators.lock().max_jitter
    }

    fn update_received(&self, buf: &[u8]) {
        let packet_time = self.config.read().packet_time.as_millis() as i64;

        for rtcp in Rtcp::read_packet(buf) {
            let report = match &rtcp {
                Rtcp::SenderReport(v) => {
                    if let Some(first) = v.reports.get(0) {
                        self.update_rtt_via_seq(first.ssrc, first.max_seq, packet_time);
                    }
                    RtcpReport::from(v)
                }
                Rtcp::ReceiverReport(v) => RtcpReport::from(v),
                _ => continue,
            };

            self.update_indicators(&report);
            self.store.report_received(report);
        }
    }

    fn update_rtt_via_seq(&self, ssrc: Ssrc, max_seq: u32, packet_time: i64) {
        let Some(last) = self.last_sent_seq.lock().get(&ssrc).copied() else {
            return;
        };

        let mut diff = last as i64 - (max_seq & 0xffff) as i64;
        if diff < 0 {
            error!(
                "Last sent seq {} behind reported seq {} for {}",
                last,
                max_seq & 0xffff,
                ssrc
            );
            diff = 0;
        }

        let rtt = (diff * packet_time).min(u32::MAX as i64) as u32;
        trace!("RTT via seq for {}: {}ms", ssrc, rtt);
        self.store.set_rtt_via_seq(ssrc, rtt);
    }

    fn update_indicators(&self, report: &RtcpReport) {
        let mut ind = self.indicators.lock();

        for f in &report.feedback {
            ind.lost = f.packets_lost;
            ind.min_jitter = Some(ind.min_jitter.map_or(f.jitter, |j| j.min(f.jitter)));
            ind.max_jitter = Some(ind.max_jitter.map_or(f.jitter, |j| j.max(f.jitter)));
        }
    }

    fn record_sent(&self, buf: &[u8]) {
        for rtcp in Rtcp::read_packet(buf) {
            match &rtcp {
                Rtcp::SenderReport(v) => self.store.report_sent(v.into()),
                Rtcp::ReceiverReport(v) => self.store.report_sent(v.into()),
                _ => continue,
            };
        }
    }

    /// Add one VoIP Metrics XR per SR or RR of `pkt`.
    ///
    /// Adds nothing if any SR or RR is malformed.
    fn add_extended_reports(&self, pkt: &mut Packet) -> Vec<ExtendedReport> {
        let Some(reports) = report_sources(pkt) else {
            return vec![];
        };

        let mut added = vec![];

        for r in reports {
            let Some(xr) = self.create_extended_report(&r) else {
                continue;
            };

            if add_extended_report(pkt, &xr) {
                added.push(xr);
            }
        }

        added
    }

    fn create_extended_report(&self, r: &ReportSources) -> Option<ExtendedReport> {
        if r.sources.is_empty() {
            return None;
        }

        let config = self.config.read();
        let cx = BlockContext {
            encoding: config.encoding.as_deref(),
            rtt_via_seq: self.store.rtt_via_seq(r.sender_ssrc),
            rendering_delay: config.rendering_delay.as_millis() as u32,
        };

        let blocks: Vec<_> = r
            .sources
            .iter()
            .filter_map(|ssrc| {
                let stats = self.provider.receive_stream(*ssrc, r.sender_ssrc)?;
                Some(ReportBlock::VoipMetrics(build_voip_metrics(
                    *ssrc, &stats, &cx,
                )))
            })
            .collect();

        if blocks.is_empty() {
            return None;
        }

        Some(ExtendedReport {
            ssrc: r.sender_ssrc,
            blocks,
        })
    }
}

impl PacketTransformer for StatisticsEngine {
    fn transform(&self, mut pkt: Packet) -> Option<Packet> {
        if is_rtcp(pkt.as_slice()) {
            self.record_sent(pkt.as_slice());

            if self.config.read().sends_voip_metrics() {
                for xr in self.add_extended_reports(&mut pkt) {
                    self.store.extended_report_sent(xr);
                }
            }
        } else if let (Some(ssrc), Some(seq)) = (pkt.ssrc(), pkt.sequence_number()) {
            self.last_sent_seq.lock().insert(ssrc, seq);
            self.store.set_first_packet_sent(ssrc, SystemTime::now());
        }

        Some(pkt)
    }

    fn reverse_transform(&self, mut pkt: Packet) -> Option<Packet> {
        if !is_rtcp(pkt.as_slice()) {
            if let Some(ssrc) = pkt.ssrc() {
                self.store.set_first_packet_received(ssrc, SystemTime::now());
            }
            return Some(pkt);
        }

        let removed = remove_extended_reports(&mut pkt);

        if is_rtcp(pkt.as_slice()) {
            self.update_received(pkt.as_slice());
        }

        let Some(removed) = removed else {
            return Some(pkt);
        };

        for xr in removed {
            self.store.extended_report_received(xr);
        }

        if pkt.is_empty() {
            trace!("Consumed XR only RTCP packet");
            return None;
        }

        Some(pkt)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::MediaKind;
    use crate::rtcp::{JitterBufferAdaptive, ReceiverReport, ReceptionReport, ReportList};
    use crate::rtcp::{SenderInfo, SenderReport, VoipMetrics, UNAVAILABLE};
    use crate::stats::{JitterBufferStats, ReceiveStreamStats, ReceptionStats};

    const LOCAL: u32 = 100;
    const REMOTE: u32 = 200;

    struct FakeStats;

    impl ReceiveStatsProvider for FakeStats {
        fn receive_stream(&self, ssrc: Ssrc, _sender: Ssrc) -> Option<ReceiveStreamStats> {
            if *ssrc != REMOTE {
                return None;
            }
            Some(ReceiveStreamStats {
                reception: Some(ReceptionStats {
                    expected: 1000,
                    lost: 10,
                    processed: 990,
                    invalid: 0,
                    fec_decoded: 0,
                }),
                round_trip_delay: Some(60),
                jitter_buffer: Some(JitterBufferStats {
                    discarded: 0,
                    nominal_delay: 40,
                    maximum_delay: 80,
                    absolute_maximum_delay: 200,
                    adaptive: true,
                }),
                burst: None,
            })
        }
    }

    fn engine(config: StatisticsConfig) -> StatisticsEngine {
        StatisticsEngine::new(config, Arc::new(RtcpReportStore::new()), Arc::new(FakeStats))
    }

    fn reception(ssrc: u32, max_seq: u32, jitter: u32) -> ReceptionReport {
        ReceptionReport {
            ssrc: ssrc.into(),
            fraction_lost: 0,
            packets_lost: 3,
            max_seq,
            jitter,
            last_sr_time: 0,
            last_sr_delay: 0,
        }
    }

    fn rr(sender: u32, sources: &[u32]) -> Rtcp {
        Rtcp::ReceiverReport(ReceiverReport {
            sender_ssrc: sender.into(),
            reports: ReportList::lists_from_iter(sources.iter().map(|s| reception(*s, 0, 5)))
                .pop()
                .unwrap_or_default(),
        })
    }

    fn sr(sender: u32, report: ReceptionReport) -> Rtcp {
        Rtcp::SenderReport(SenderReport {
            sender_info: SenderInfo {
                ssrc: sender.into(),
                ntp_time: 1,
                rtp_time: 2,
                sender_packet_count: 3,
                sender_octet_count: 4,
            },
            reports: report.into(),
        })
    }

    fn rtp(ssrc: u32, seq: u16) -> Packet {
        let mut buf = vec![0x80, 111];
        buf.extend_from_slice(&seq.to_be_bytes());
        buf.extend_from_slice(&[0, 0, 0, 0]);
        buf.extend_from_slice(&ssrc.to_be_bytes());
        buf.extend_from_slice(&[0; 20]);
        Packet::from_slice(&buf)
    }

    fn audio() -> StatisticsConfig {
        StatisticsConfig::new()
            .set_encoding("opus")
            .set_voip_metrics(true)
    }

    #[test]
    fn outgoing_rtcp_gets_voip_metrics() {
        let engine = engine(audio());
        let buf = Rtcp::write_packet(&[rr(LOCAL, &[REMOTE, 300])]);

        let pkt = engine.transform(Packet::from_slice(&buf)).unwrap();
        let parsed = Rtcp::read_packet(pkt.as_slice());
        assert_eq!(parsed.len(), 2);

        let Rtcp::ExtendedReport(xr) = &parsed[1] else {
            panic!("Expected XR");
        };
        assert_eq!(xr.ssrc, LOCAL.into());

        // only the source with a live receive stream.
        let blocks: Vec<&VoipMetrics> = xr.voip_metrics().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].ssrc, REMOTE.into());
        assert_eq!(blocks[0].round_trip_delay, 60);
        assert_eq!(blocks[0].jitter_buffer_adaptive, JitterBufferAdaptive::Adaptive);
        assert_ne!(blocks[0].mos_cq, UNAVAILABLE);

        let store = engine.store();
        assert!(store.sent().report(LOCAL.into()).is_some());
        assert!(store.sent().extended_report(LOCAL.into()).is_some());
        assert!(store.sent().voip_metrics(REMOTE.into()).is_some());
    }

    #[test]
    fn no_voip_metrics_unless_negotiated_audio() {
        let buf = Rtcp::write_packet(&[rr(LOCAL, &[REMOTE])]);

        for config in [
            StatisticsConfig::new().set_encoding("opus"),
            audio().set_media_kind(MediaKind::Video),
        ] {
            let engine = engine(config);
            let pkt = engine.transform(Packet::from_slice(&buf)).unwrap();
            assert_eq!(pkt.as_slice(), &buf[..]);
            assert!(engine.store().sent().report(LOCAL.into()).is_some());
        }
    }

    #[test]
    fn no_xr_without_sources() {
        let engine = engine(audio());
        let buf = Rtcp::write_packet(&[rr(LOCAL, &[]), rr(LOCAL, &[300])]);
        let pkt = engine.transform(Packet::from_slice(&buf)).unwrap();
        assert_eq!(pkt.as_slice(), &buf[..]);
    }

    #[test]
    fn malformed_report_adds_nothing() {
        let engine = engine(audio());
        let mut buf = Rtcp::write_packet(&[rr(LOCAL, &[REMOTE])]);
        // RR claiming 2 report blocks with room for 1.
        let mut bad = Rtcp::write_packet(&[rr(LOCAL, &[REMOTE])]);
        bad[0] = 0x82;
        buf.extend_from_slice(&bad);

        let pkt = engine.transform(Packet::from_slice(&buf)).unwrap();
        assert_eq!(pkt.as_slice(), &buf[..]);
    }

    #[test]
    fn incoming_xr_only_is_consumed() {
        let sender = engine(audio());
        let receiver = engine(audio());

        let buf = Rtcp::write_packet(&[rr(LOCAL, &[REMOTE])]);
        let out = sender.transform(Packet::from_slice(&buf)).unwrap();

        // receiver sees the RR with the XR stripped.
        let pkt = receiver.reverse_transform(out.clone()).unwrap();
        assert_eq!(pkt.as_slice(), &buf[..]);
        assert!(receiver.store().received().report(LOCAL.into()).is_some());
        assert!(receiver
            .store()
            .received()
            .voip_metrics(REMOTE.into())
            .is_some());

        // the XR alone is consumed.
        let xr = &out.as_slice()[buf.len()..];
        assert!(receiver.reverse_transform(Packet::from_slice(xr)).is_none());
    }

    #[test]
    fn rtt_via_seq_from_sender_report() {
        let engine = engine(audio());

        engine.transform(rtp(LOCAL, 1005)).unwrap();
        assert!(engine
            .store()
            .sent()
            .first_packet_time(LOCAL.into())
            .is_some());

        // remote has seen up to 1000, 5 packets of 20ms in flight.
        let buf = Rtcp::write_packet(&[sr(REMOTE, reception(LOCAL, 0x1_0000 + 1000, 7))]);
        engine.reverse_transform(Packet::from_slice(&buf)).unwrap();
        assert_eq!(engine.store().rtt_via_seq(LOCAL.into()), 100);

        // remote ahead of us clamps to 0.
        let buf = Rtcp::write_packet(&[sr(REMOTE, reception(LOCAL, 1010, 9))]);
        engine.reverse_transform(Packet::from_slice(&buf)).unwrap();
        assert_eq!(engine.store().rtt_via_seq(LOCAL.into()), 0);

        assert_eq!(engine.lost(), 3);
        assert_eq!(engine.min_interarrival_jitter(), Some(7));
        assert_eq!(engine.max_interarrival_jitter(), Some(9));
    }

    #[test]
    fn incoming_rtp_sets_first_received() {
        let engine = engine(audio());
        let pkt = engine.reverse_transform(rtp(REMOTE, 1)).unwrap();
        assert_eq!(pkt.sequence_number(), Some(1));
        assert!(engine
            .store()
            .received()
            .first_packet_time(REMOTE.into())
            .is_some());
    }

    #[test]
    fn encoding_change_applies_to_next_xr() {
        let engine = engine(audio());
        engine.set_encoding(None);

        let buf = Rtcp::write_packet(&[rr(LOCAL, &[REMOTE])]);
        engine.transform(Packet::from_slice(&buf)).unwrap();
        let m = engine.store().sent().voip_metrics(REMOTE.into()).unwrap();
        assert_eq!(m.mos_cq, UNAVAILABLE);

        engine.set_voip_metrics(false);
        assert!(!engine.config().sends_voip_metrics());
    }
}
