//! VoIP Metrics report blocks built from receive stream statistics.

use crate::id::Ssrc;
use crate::rtcp::{JitterBufferAdaptive, PacketLossConcealment, VoipMetrics};

use super::mos::{mos_cq, MosInputs};

/// Reception counters of one receive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceptionStats {
    /// Packets expected from the sequence number range seen.
    pub expected: u64,
    /// Packets lost.
    pub lost: u64,
    /// Packets received and processed.
    pub processed: u64,
    /// Packets received but invalid.
    pub invalid: u64,
    /// Lost packets recovered by FEC.
    pub fec_decoded: u64,
}

/// State of the jitter buffer of one receive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JitterBufferStats {
    /// Packets discarded for arriving too late or too early.
    pub discarded: u64,
    /// Nominal delay in milliseconds.
    pub nominal_delay: u16,
    /// Maximum delay in milliseconds.
    pub maximum_delay: u16,
    /// Absolute maximum delay in milliseconds, when the buffer is adaptive.
    pub absolute_maximum_delay: u16,
    /// Whether the buffer adapts its size.
    pub adaptive: bool,
}

/// Burst and gap metrics of one receive stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BurstMetrics {
    /// Fraction of packets lost within bursts, in 1/256.
    pub burst_density: u8,
    /// Fraction of packets lost within gaps, in 1/256.
    pub gap_density: u8,
    /// Mean burst duration in milliseconds.
    pub burst_duration: u16,
    /// Mean gap duration in milliseconds.
    pub gap_duration: u16,
    /// Gap threshold.
    pub gmin: u8,
}

/// What is known about a live receive stream.
///
/// Fields are `None` where the media engine cannot tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveStreamStats {
    /// Reception counters.
    pub reception: Option<ReceptionStats>,
    /// Round trip delay in milliseconds as seen from the reporting sender.
    pub round_trip_delay: Option<u16>,
    /// Jitter buffer state.
    pub jitter_buffer: Option<JitterBufferStats>,
    /// Burst and gap metrics.
    pub burst: Option<BurstMetrics>,
}

/// Source of receive statistics owned by the media engine.
///
/// The statistics engine only reads through this.
pub trait ReceiveStatsProvider: Send + Sync {
    /// Statistics of the receive stream for `ssrc`, as reported by local `sender`.
    ///
    /// `None` when there is no live receive stream for `ssrc`.
    fn receive_stream(&self, ssrc: Ssrc, sender: Ssrc) -> Option<ReceiveStreamStats>;
}

/// Loss rate in 1/256 after subtracting FEC recovered packets.
///
/// Also returns the lost count after the subtraction.
pub fn loss_rate(expected: u64, lost: u64, fec_decoded: u64) -> (u8, u64) {
    if expected == 0 || lost == 0 {
        return (0, lost);
    }

    if lost > expected {
        error!("More lost packets than expected: lost={lost}, expected={expected}");
    }

    if fec_decoded > lost {
        error!("More FEC decoded than lost: FEC={fec_decoded}, lost={lost}");
    }

    let lost = if fec_decoded > 0 && fec_decoded <= lost {
        lost - fec_decoded
    } else {
        lost
    };

    (scale_256(lost, expected), lost)
}

/// Jitter buffer discard rate in 1/256.
pub fn discard_rate(expected: u64, discarded: u64) -> u8 {
    if expected == 0 {
        return 0;
    }
    scale_256(discarded, expected)
}

fn scale_256(n: u64, of: u64) -> u8 {
    let v = (n as f64 / of as f64) * 256.0;
    v.clamp(0.0, 255.0) as u8
}

/// Inputs for one VoIP Metrics block besides the receive stream itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockContext<'a> {
    /// Encoding name of the active codec.
    pub encoding: Option<&'a str>,
    /// RTT from sequence numbers in milliseconds.
    pub rtt_via_seq: u32,
    /// Audio rendering delay in milliseconds.
    pub rendering_delay: u32,
}

/// Build the VoIP Metrics block for source `ssrc`.
///
/// Missing statistics leave their fields at the unavailable default. If any
/// of reception counters, RTT, encoding or jitter buffer is missing, MOS-CQ
/// is left unavailable.
pub(crate) fn build_voip_metrics(
    ssrc: Ssrc,
    stats: &ReceiveStreamStats,
    cx: &BlockContext,
) -> VoipMetrics {
    let mut m = VoipMetrics {
        ssrc,
        ..Default::default()
    };
    let mut output_mos_cq = true;

    let mut expected = 0;
    let mut lost = 0;
    let mut processed = 0;
    let mut invalid = 0;
    let mut fec_decoded = 0;

    if let Some(r) = &stats.reception {
        expected = r.expected;
        processed = r.processed;
        invalid = r.invalid;
        fec_decoded = r.fec_decoded;

        let (rate, lost_after_fec) = loss_rate(r.expected, r.lost, r.fec_decoded);
        m.loss_rate = rate;
        lost = lost_after_fec;
    } else {
        warn!("No reception stats for {}, no MOS-CQ", ssrc);
        output_mos_cq = false;
    }

    let rtt_via_seq = cx.rtt_via_seq as i64;
    let mut rtt = 0;

    if let Some(v) = stats.round_trip_delay {
        rtt = v as i64;
        m.round_trip_delay = v;

        let esd = (rtt_via_seq - rtt / 2 + cx.rendering_delay as i64).max(0);
        m.end_system_delay = esd.min(u16::MAX as i64) as u16;
    } else {
        warn!("No RTT for {}, no MOS-CQ", ssrc);
        output_mos_cq = false;
    }

    // Silence replaces lost packets unless the codec conceals loss itself.
    // Encoding names may carry a clock rate, as in `SILK/16000`.
    let encoding = cx.encoding.map(|e| e.to_ascii_lowercase());
    let is_silk = encoding.as_deref().is_some_and(|e| e.contains("silk"));
    let is_opus = encoding.as_deref().is_some_and(|e| e.contains("opus"));

    m.plc = if is_opus || is_silk {
        PacketLossConcealment::Standard
    } else {
        PacketLossConcealment::Disabled
    };

    if encoding.is_none() {
        warn!("No encoding for {}, no MOS-CQ", ssrc);
        output_mos_cq = false;
    }

    let mut jb_discards = 0;
    let mut jb_nominal = 0;

    if let Some(jb) = &stats.jitter_buffer {
        if expected > 0 {
            jb_discards = jb.discarded;
            m.discard_rate = discard_rate(expected, jb.discarded);
        } else {
            warn!("No expected packets for {}, no MOS-CQ", ssrc);
            output_mos_cq = false;
        }

        jb_nominal = jb.nominal_delay;
        m.jitter_buffer_nominal_delay = jb.nominal_delay;
        m.jitter_buffer_maximum_delay = jb.maximum_delay;

        if jb.adaptive {
            m.jitter_buffer_adaptive = JitterBufferAdaptive::Adaptive;
            m.jitter_buffer_absolute_maximum_delay = jb.absolute_maximum_delay;
        } else {
            // A fixed buffer has its maximum as absolute maximum.
            m.jitter_buffer_adaptive = JitterBufferAdaptive::NonAdaptive;
            m.jitter_buffer_absolute_maximum_delay = jb.maximum_delay;
        }
    } else {
        warn!("No jitter buffer for {}, no MOS-CQ", ssrc);
        m.jitter_buffer_adaptive = JitterBufferAdaptive::Unknown;
        output_mos_cq = false;
    }

    if let Some(b) = &stats.burst {
        m.burst_density = b.burst_density;
        m.gap_density = b.gap_density;
        m.burst_duration = b.burst_duration;
        m.gap_duration = b.gap_duration;
        m.gmin = b.gmin;
    }

    if output_mos_cq {
        m.mos_cq = mos_cq(&MosInputs {
            is_silk,
            rtt,
            rtt_via_seq,
            jitter_buffer_latency: jb_nominal as i64,
            jitter_buffer_discards: jb_discards as i64,
            received: processed as i64,
            lost: lost as i64,
            discarded: invalid as i64,
            fec_corrected: fec_decoded as i64,
        });
    }

    m
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::rtcp::UNAVAILABLE;

    fn full_stats() -> ReceiveStreamStats {
        ReceiveStreamStats {
            reception: Some(ReceptionStats {
                expected: 1100,
                lost: 100,
                processed: 1000,
                invalid: 0,
                fec_decoded: 0,
            }),
            round_trip_delay: Some(0),
            jitter_buffer: Some(JitterBufferStats {
                discarded: 2,
                nominal_delay: 500,
                maximum_delay: 600,
                absolute_maximum_delay: 1000,
                adaptive: true,
            }),
            burst: None,
        }
    }

    fn cx(encoding: Option<&str>) -> BlockContext<'_> {
        BlockContext {
            encoding,
            rtt_via_seq: 0,
            rendering_delay: 100,
        }
    }

    #[test]
    fn loss_rate_subtracts_fec() {
        assert_eq!(loss_rate(1000, 100, 0), (25, 100));
        assert_eq!(loss_rate(1000, 100, 50), (12, 50));
        // more FEC than lost is logged and not subtracted.
        assert_eq!(loss_rate(1000, 100, 300), (25, 100));
        assert_eq!(loss_rate(0, 100, 0), (0, 100));
        assert_eq!(loss_rate(1000, 0, 10), (0, 0));
    }

    #[test]
    fn rates_clamp_to_255() {
        assert_eq!(loss_rate(10, 1000, 0).0, 255);
        assert_eq!(loss_rate(1, 1, 0).0, 255);
        assert_eq!(discard_rate(10, 1000), 255);
        assert_eq!(discard_rate(0, 1000), 0);
        assert_eq!(discard_rate(256, 1), 1);
    }

    #[test]
    fn rates_stay_in_range_for_random_counters() {
        use rand::Rng;
        let mut rng = rand::rng();
        for _ in 0..1000 {
            let expected = rng.random_range(0..5000_u64);
            let lost = rng.random_range(0..10000_u64);
            let fec = rng.random_range(0..10000_u64);
            let (rate, after) = loss_rate(expected, lost, fec);
            assert!(after <= lost);
            if expected > 0 && after >= expected {
                assert_eq!(rate, 255);
            }

            let discarded = rng.random_range(0..10000);
            if expected > 0 && discarded >= expected {
                assert_eq!(discard_rate(expected, discarded), 255);
            }
        }
    }

    #[test]
    fn full_block() {
        let m = build_voip_metrics(7.into(), &full_stats(), &cx(Some("PCMU")));
        assert_eq!(m.ssrc, 7.into());
        assert_eq!(m.loss_rate, 23);
        assert_eq!(m.discard_rate, 0);
        assert_eq!(m.end_system_delay, 100);
        assert_eq!(m.plc, PacketLossConcealment::Disabled);
        assert_eq!(m.jitter_buffer_adaptive, JitterBufferAdaptive::Adaptive);
        assert_eq!(m.jitter_buffer_absolute_maximum_delay, 1000);
        assert_ne!(m.mos_cq, UNAVAILABLE);
        assert_eq!(m.gmin, 16);
    }

    #[test]
    fn opus_and_silk_conceal_loss() {
        let m = build_voip_metrics(7.into(), &full_stats(), &cx(Some("opus")));
        assert_eq!(m.plc, PacketLossConcealment::Standard);
        let m = build_voip_metrics(7.into(), &full_stats(), &cx(Some("SILK")));
        assert_eq!(m.plc, PacketLossConcealment::Standard);
    }

    #[test]
    fn silk_with_clock_rate_is_silk() {
        let plain = build_voip_metrics(7.into(), &full_stats(), &cx(Some("silk")));
        let rated = build_voip_metrics(7.into(), &full_stats(), &cx(Some("SILK/16000")));
        assert_eq!(rated.plc, PacketLossConcealment::Standard);
        assert_eq!(rated.mos_cq, plain.mos_cq);

        let m = build_voip_metrics(7.into(), &full_stats(), &cx(Some("opus/48000/2")));
        assert_eq!(m.plc, PacketLossConcealment::Standard);
    }

    #[test]
    fn fixed_jitter_buffer_abs_max_is_max() {
        let mut stats = full_stats();
        if let Some(jb) = stats.jitter_buffer.as_mut() {
            jb.adaptive = false;
        }
        let m = build_voip_metrics(7.into(), &stats, &cx(Some("opus")));
        assert_eq!(m.jitter_buffer_adaptive, JitterBufferAdaptive::NonAdaptive);
        assert_eq!(m.jitter_buffer_absolute_maximum_delay, 600);
    }

    #[test]
    fn missing_stats_disable_only_mos_cq() {
        let mut stats = full_stats();
        stats.jitter_buffer = None;
        let m = build_voip_metrics(7.into(), &stats, &cx(Some("opus")));
        assert_eq!(m.mos_cq, UNAVAILABLE);
        assert_eq!(m.loss_rate, 23);
        assert_eq!(m.jitter_buffer_adaptive, JitterBufferAdaptive::Unknown);

        let mut stats = full_stats();
        stats.round_trip_delay = None;
        let m = build_voip_metrics(7.into(), &stats, &cx(Some("opus")));
        assert_eq!(m.mos_cq, UNAVAILABLE);
        assert_eq!(m.end_system_delay, 0);

        let m = build_voip_metrics(7.into(), &full_stats(), &cx(None));
        assert_eq!(m.mos_cq, UNAVAILABLE);
        assert_eq!(m.plc, PacketLossConcealment::Disabled);

        let mut stats = full_stats();
        stats.reception = None;
        let m = build_voip_metrics(7.into(), &stats, &cx(Some("opus")));
        assert_eq!(m.mos_cq, UNAVAILABLE);
    }

    #[test]
    fn end_system_delay_clamps_at_zero() {
        let mut stats = full_stats();
        stats.round_trip_delay = Some(1000);
        let m = build_voip_metrics(7.into(), &stats, &cx(Some("opus")));
        // 0 - 1000 / 2 + 100
        assert_eq!(m.end_system_delay, 0);
    }

    #[test]
    fn burst_metrics_copied() {
        let mut stats = full_stats();
        stats.burst = Some(BurstMetrics {
            burst_density: 40,
            gap_density: 2,
            burst_duration: 120,
            gap_duration: 5000,
            gmin: 16,
        });
        let m = build_voip_metrics(7.into(), &stats, &cx(Some("opus")));
        assert_eq!(m.burst_density, 40);
        assert_eq!(m.gap_duration, 5000);
    }
}
