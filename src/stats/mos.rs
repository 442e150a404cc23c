//! Conversational quality (MOS-CQ) from the ITU-T G.107 E-model.
//!
//! Everything the client cannot measure uses the G.107 default values.
//! Only delay and packet loss vary between calls.

// Send loudness rating, dB.
const SLR: f64 = 8.0;
// Receive loudness rating, dB.
const RLR: f64 = 2.0;
// Overall loudness rating, dB.
const OLR: f64 = SLR + RLR;
// Circuit noise referred to the 0 dBr point, dBm0p.
const NC: f64 = -70.0;
// Room noise at sender, dB(A).
const PS: f64 = 35.0;
// D-value of telephone at sender.
const DS: f64 = 3.0;
// Room noise at receiver, dB(A).
const PR: f64 = 35.0;
// Listener sidetone rating, dB.
const LSTR: f64 = 18.0;
// Noise floor at receive side, dBm0p.
const NFOR: f64 = -64.0;
// Sidetone masking rating, dB.
const STMR: f64 = 15.0;
// Talker echo loudness rating, dB.
const TELR: f64 = 65.0;
// Number of quantization distortion units.
const QDU: f64 = 1.0;
// Weighted echo path loss, dB.
const WEPL: f64 = 110.0;
// Equipment impairment factor. G.113 value for G.711.
const IE: f64 = 0.0;
// Burst ratio. 1 is random loss.
const BURST_R: f64 = 1.0;
// Packet loss robustness factor. G.113 value for G.711.
const BPL: f64 = 25.1;
// Advantage factor.
const A: f64 = 1.0;

/// Counters the MOS-CQ estimate is computed from.
///
/// Delays are in milliseconds, the rest are packet counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MosInputs {
    /// The active codec is SILK, which has its own loss impairment curve.
    pub is_silk: bool,
    /// Round trip time from RTCP.
    pub rtt: i64,
    /// Round trip time estimated from sequence numbers.
    pub rtt_via_seq: i64,
    /// Jitter buffer latency.
    pub jitter_buffer_latency: i64,
    /// Packets discarded by the jitter buffer.
    pub jitter_buffer_discards: i64,
    /// Packets received.
    pub received: i64,
    /// Packets lost, after FEC recovery.
    pub lost: i64,
    /// Packets discarded as invalid.
    pub discarded: i64,
    /// Packets recovered by FEC.
    pub fec_corrected: i64,
}

/// MOS-CQ times ten, in `10..=45`.
///
/// A pure function of `input`. The same input gives the same score.
pub fn mos_cq(input: &MosInputs) -> u8 {
    let r = r_factor(input);

    let mos = if r < 0.0 {
        10.0
    } else if r < 100.0 {
        10.0 * (1.0 + 0.035 * r + r * (r - 60.0) * (100.0 - r) * 7.0 * 10_f64.powf(-6.0))
    } else {
        45.0
    };

    let mos = mos as u8;

    debug!(
        mos_cq = mos,
        is_silk = input.is_silk,
        rtt = input.rtt,
        rtt_via_seq = input.rtt_via_seq,
        jb_latency = input.jitter_buffer_latency,
        jb_discards = input.jitter_buffer_discards,
        received = input.received,
        lost = input.lost,
        discarded = input.discarded,
        fec_corrected = input.fec_corrected,
        "MOS-CQ"
    );

    mos
}

/// Transmission rating R = Ro - Is - Id - Ie,eff + A.
fn r_factor(input: &MosInputs) -> f64 {
    // The two RTT figures are updated at different times.
    let rtt_via_seq = input.rtt_via_seq.max(input.rtt);

    // Delay from talker to echo source, approximated by the sequence number
    // RTT minus the one way network delay plus rendering.
    let t = (rtt_via_seq - input.rtt / 2 + 100) as f64;
    // Round trip delay in the 4-wire loop.
    let tr = rtt_via_seq as f64;
    // One way delay from sender to receiver.
    let ta = (input.rtt / 2 + input.jitter_buffer_latency) as f64;

    let ppl = packet_loss_percent(input);

    // Basic signal to noise ratio.
    let nos = PS - SLR - DS - 100.0 + 0.004 * (PS - OLR - DS - 14.0).powi(2);
    let pre = PR + 10.0 * (1.0 + 10_f64.powf((10.0 - LSTR) / 10.0)).log10();
    let nor = RLR - 121.0 + pre + 0.008 * (pre - 35.0).powi(2);
    let nfo = NFOR + RLR;
    let no = 10.0
        * (10_f64.powf(NC / 10.0)
            + 10_f64.powf(nos / 10.0)
            + 10_f64.powf(nor / 10.0)
            + 10_f64.powf(nfo / 10.0))
        .log10();
    let ro = 15.0 - 1.5 * (SLR + no);

    // Simultaneous impairment.
    let q = 37.0 - 15.0 * QDU.log10();
    let g = 1.07 + 0.258 * q + 0.0602 * q.powi(2);
    let y = ((ro - 100.0) / 15.0) + (46.0 / 8.4) - (g / 9.0);
    let z = (46.0 / 30.0) - (g / 40.0);
    let iq = 15.0 * (1.0 + 10_f64.powf(y) + 10_f64.powf(z)).log10();
    let stmro = -10.0 * (10_f64.powf(-STMR / 10.0) + (-t / 4.0).exp() * 10_f64.powf(-TELR / 10.0)).log10();
    let ist = 12.0 * (1.0 + ((stmro - 13.0) / 6.0).powi(8)).powf(1.0 / 8.0)
        - 28.0 * (1.0 + ((stmro + 1.0) / 19.4).powi(35)).powf(1.0 / 35.0)
        - 13.0 * (1.0 + ((stmro - 3.0) / 33.0).powi(13)).powf(1.0 / 13.0)
        + 29.0;
    let xolr = OLR + 0.2 * (64.0 + no - RLR);
    let iolr = 20.0 * ((1.0 + (xolr / 8.0).powi(8)).powf(1.0 / 8.0) - (xolr / 8.0));
    let is = iolr + ist + iq;

    // Delay impairment: talker echo, listener echo and too long absolute delay.
    let roe = -1.5 * (no - RLR);
    let terv = TELR - 40.0 * ((1.0 + t / 10.0) / (1.0 + t / 150.0)).log10()
        + 6.0 * (-0.3 * t.powi(2)).exp();
    let re = 80.0 + 2.5 * (terv - 14.0);
    let idte = ((roe - re) / 2.0 + ((roe - re).powi(2) / 4.0 + 100.0).sqrt() - 1.0) * (1.0 - (-t).exp());
    let rle = 10.5 * (WEPL + 7.0) * (tr + 1.0).powf(-0.25);
    let idle = (ro - rle) / 2.0 + ((ro - rle).powi(2) / 4.0 + 169.0).sqrt();
    let x = if ta == 0.0 {
        0.0
    } else {
        (ta / 100.0).log10() / 2_f64.log10()
    };
    let idd = if ta < 100.0 {
        0.0
    } else {
        25.0 * ((1.0 + x.powi(6)).powf(1.0 / 6.0) - 3.0 * (1.0 + (x / 3.0).powi(6)).powf(1.0 / 6.0) + 2.0)
    };
    let id = idte + idle + idd;

    // Effective equipment impairment under packet loss.
    let ie_eff = if input.is_silk {
        18.3442 * (1.0 + 1.54894 * ppl).log10() + 1.31953
    } else {
        IE + (95.0 - IE) * (ppl / (ppl / BURST_R + BPL))
    };

    ro - is - id - ie_eff + A
}

/// Whole percent of packets lost or discarded. Never negative.
fn packet_loss_percent(input: &MosInputs) -> f64 {
    if input.received == 0 {
        return 0.0;
    }

    let impaired = input.lost + input.discarded + input.jitter_buffer_discards;
    let total = input.received + input.lost + input.fec_corrected;
    if total == 0 {
        return 0.0;
    }

    ((impaired * 100) / total).max(0) as f64
}
