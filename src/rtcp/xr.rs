use super::{RtcpHeader, RtcpPacket, RtcpType, Ssrc};

//   0                   1                   2                   3
//   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//   |V=2|P|reserved |   PT=XR=207   |             length            |
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//   |                              SSRC                             |
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//   :                         report blocks                         :
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

/// Extended report (XR).
///
/// RFC 3611: <https://datatracker.ietf.org/doc/html/rfc3611#page-21>
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedReport {
    /// The SSRC of the originator of this report.
    pub ssrc: Ssrc,
    /// The blocks reported.
    pub blocks: Vec<ReportBlock>,
}

/// Parts of an extended report XR.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ReportBlock {
    Rrtr(Rrtr),
    Dlrr(Dlrr),
    VoipMetrics(VoipMetrics),
    /// A block type this crate does not interpret, kept as is.
    Unknown(UnknownBlock),
}

//   0                   1                   2                   3
//   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//   |     BT=4      |   reserved    |       block length = 2        |
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//   |              NTP timestamp, most significant word              |
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//   |             NTP timestamp, least significant word              |
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

/// Receiver Reference Time Report Block.
///
/// <https://datatracker.ietf.org/doc/html/rfc3611#section-4.4>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Rrtr {
    pub ntp_time: u64,
}

//   0                   1                   2                   3
//   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//   |     BT=5      |   reserved    |         block length          |
//   +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//   |                 SSRC_1 (SSRC of first receiver)                | sub-
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+ block
//   |                         last RR (LRR)                         |   1
//   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//   |                   delay since last RR (DLRR)                  |
//   +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+

/// DLRR Report Block
///
/// <https://datatracker.ietf.org/doc/html/rfc3611#section-4.5>
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Dlrr {
    pub items: Vec<DlrrItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DlrrItem {
    pub ssrc: Ssrc,
    pub last_rr_time: u32,
    pub last_rr_delay: u32,
}

//   0                   1                   2                   3
//   0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |     BT=7      |   reserved    |       block length = 8        |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |                        SSRC of source                         |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |   loss rate   | discard rate  | burst density |  gap density  |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |       burst duration          |         gap duration          |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |     round trip delay          |       end system delay        |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  | signal level  |  noise level  |     RERL      |     Gmin      |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |   R factor    | ext. R factor |    MOS-LQ     |    MOS-CQ     |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |   RX config   |   reserved    |          JB nominal           |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//  |          JB maximum           |          JB abs max           |
//  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+

/// Value of a one byte metric that could not be computed.
pub const UNAVAILABLE: u8 = 127;

/// VoIP Metrics Report Block.
///
/// <https://datatracker.ietf.org/doc/html/rfc3611#section-4.7>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoipMetrics {
    /// The source these metrics are about.
    pub ssrc: Ssrc,
    /// Fraction of packets lost, in 1/256.
    pub loss_rate: u8,
    /// Fraction of packets discarded by the jitter buffer, in 1/256.
    pub discard_rate: u8,
    /// Fraction of packets lost or discarded within bursts, in 1/256.
    pub burst_density: u8,
    /// Fraction of packets lost or discarded within gaps, in 1/256.
    pub gap_density: u8,
    /// Mean burst duration in milliseconds.
    pub burst_duration: u16,
    /// Mean gap duration in milliseconds.
    pub gap_duration: u16,
    /// Most recent round trip delay in milliseconds.
    pub round_trip_delay: u16,
    /// Most recent end system delay in milliseconds.
    pub end_system_delay: u16,
    /// Voice signal level in dBm0.
    pub signal_level: i8,
    /// Noise level in dBm0.
    pub noise_level: i8,
    /// Residual echo return loss in dB.
    pub rerl: u8,
    /// Gap threshold.
    pub gmin: u8,
    /// Listening and conversational quality R factor.
    pub r_factor: u8,
    /// External R factor.
    pub ext_r_factor: u8,
    /// Listening quality MOS, times 10.
    pub mos_lq: u8,
    /// Conversational quality MOS, times 10.
    pub mos_cq: u8,
    /// Packet loss concealment in use.
    pub plc: PacketLossConcealment,
    /// Whether the jitter buffer is adaptive.
    pub jitter_buffer_adaptive: JitterBufferAdaptive,
    /// Jitter buffer adjustment rate. 4 bit.
    pub jitter_buffer_rate: u8,
    /// Current nominal jitter buffer delay in milliseconds.
    pub jitter_buffer_nominal_delay: u16,
    /// Current maximum jitter buffer delay in milliseconds.
    pub jitter_buffer_maximum_delay: u16,
    /// Absolute maximum jitter buffer delay in milliseconds.
    pub jitter_buffer_absolute_maximum_delay: u16,
}

/// Packet loss concealment method. Bits 7-6 of RX config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PacketLossConcealment {
    /// Not specified.
    #[default]
    Unspecified = 0,
    /// Silence or no concealment.
    Disabled = 1,
    /// Enhanced interpolation.
    Enhanced = 2,
    /// Simple replay or interpolation.
    Standard = 3,
}

/// Jitter buffer adaptiveness. Bits 5-4 of RX config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JitterBufferAdaptive {
    /// Not known.
    #[default]
    Unknown = 0,
    /// Value 1 is reserved.
    Reserved = 1,
    /// Fixed size buffer.
    NonAdaptive = 2,
    /// Buffer adapts to conditions.
    Adaptive = 3,
}

/// Report block of a type not interpreted by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBlock {
    /// Block type (BT).
    pub block_type: u8,
    /// The type specific byte following the block type.
    pub type_specific: u8,
    /// Body after the block header. A multiple of 4 bytes.
    pub body: Vec<u8>,
}

impl Default for VoipMetrics {
    fn default() -> Self {
        VoipMetrics {
            ssrc: 0.into(),
            loss_rate: 0,
            discard_rate: 0,
            burst_density: 0,
            gap_density: 0,
            burst_duration: 0,
            gap_duration: 0,
            round_trip_delay: 0,
            end_system_delay: 0,
            signal_level: UNAVAILABLE as i8,
            noise_level: UNAVAILABLE as i8,
            rerl: UNAVAILABLE,
            gmin: 16,
            r_factor: UNAVAILABLE,
            ext_r_factor: UNAVAILABLE,
            mos_lq: UNAVAILABLE,
            mos_cq: UNAVAILABLE,
            plc: PacketLossConcealment::Unspecified,
            jitter_buffer_adaptive: JitterBufferAdaptive::Unknown,
            jitter_buffer_rate: 0,
            jitter_buffer_nominal_delay: 0,
            jitter_buffer_maximum_delay: 0,
            jitter_buffer_absolute_maximum_delay: 0,
        }
    }
}

impl ExtendedReport {
    /// The VoIP Metrics blocks of this report.
    pub fn voip_metrics(&self) -> impl Iterator<Item = &VoipMetrics> {
        self.blocks.iter().filter_map(|b| match b {
            ReportBlock::VoipMetrics(v) => Some(v),
            _ => None,
        })
    }
}

impl RtcpPacket for ExtendedReport {
    fn header(&self) -> RtcpHeader {
        RtcpHeader {
            rtcp_type: RtcpType::ExtendedReport,
            has_padding: false,
            count: 0,
            words_less_one: (self.length_words() - 1) as u16,
        }
    }

    fn length_words(&self) -> usize {
        let header = 1;
        let ssrc = 1;
        let blocks: usize = self.blocks.iter().map(|b| b.len() / 4).sum();
        header + ssrc + blocks
    }

    fn write_to(&self, buf: &mut [u8]) -> usize {
        let mut len = self.header().write_to(buf);

        buf[4..8].copy_from_slice(&self.ssrc.to_be_bytes());
        len += 4;

        for block in self.blocks.iter() {
            len += match block {
                ReportBlock::Rrtr(b) => b.write_to(&mut buf[len..]),
                ReportBlock::Dlrr(b) => b.write_to(&mut buf[len..]),
                ReportBlock::VoipMetrics(b) => b.write_to(&mut buf[len..]),
                ReportBlock::Unknown(b) => b.write_to(&mut buf[len..]),
            };
        }

        len
    }
}

impl ReportBlock {
    /// Length of this block in bytes, block header included.
    pub fn len(&self) -> usize {
        match self {
            Self::Rrtr(_) => Rrtr::LEN,
            Self::Dlrr(v) => v.len(),
            Self::VoipMetrics(_) => VoipMetrics::LEN,
            Self::Unknown(v) => 4 + v.body.len(),
        }
    }

    /// Never true, every block has at least a block header.
    pub fn is_empty(&self) -> bool {
        false
    }
}

fn write_block_header(buf: &mut [u8], block_type: u8, type_specific: u8, words: u16) {
    buf[0] = block_type;
    buf[1] = type_specific;
    buf[2..4].copy_from_slice(&words.to_be_bytes());
}

impl Rrtr {
    const LEN: usize = 12;

    fn write_to(&self, buf: &mut [u8]) -> usize {
        write_block_header(buf, 4, 0, 2);
        buf[4..12].copy_from_slice(&self.ntp_time.to_be_bytes());
        Self::LEN
    }
}

impl Dlrr {
    fn write_to(&self, buf: &mut [u8]) -> usize {
        let words = self.items.len() as u16 * 3;
        write_block_header(buf, 5, 0, words);

        for (item, buf) in self.items.iter().zip(buf[4..].chunks_exact_mut(12)) {
            buf[0..4].copy_from_slice(&item.ssrc.to_be_bytes());
            buf[4..8].copy_from_slice(&item.last_rr_time.to_be_bytes());
            buf[8..12].copy_from_slice(&item.last_rr_delay.to_be_bytes());
        }

        self.len()
    }

    fn len(&self) -> usize {
        4 + self.items.len() * 12
    }
}

impl VoipMetrics {
    const LEN: usize = 36;

    fn rx_config(&self) -> u8 {
        (self.plc as u8) << 6
            | (self.jitter_buffer_adaptive as u8) << 4
            | (self.jitter_buffer_rate & 0b0000_1111)
    }

    fn write_to(&self, buf: &mut [u8]) -> usize {
        write_block_header(buf, 7, 0, 8);

        buf[4..8].copy_from_slice(&self.ssrc.to_be_bytes());
        buf[8] = self.loss_rate;
        buf[9] = self.discard_rate;
        buf[10] = self.burst_density;
        buf[11] = self.gap_density;
        buf[12..14].copy_from_slice(&self.burst_duration.to_be_bytes());
        buf[14..16].copy_from_slice(&self.gap_duration.to_be_bytes());
        buf[16..18].copy_from_slice(&self.round_trip_delay.to_be_bytes());
        buf[18..20].copy_from_slice(&self.end_system_delay.to_be_bytes());
        buf[20] = self.signal_level as u8;
        buf[21] = self.noise_level as u8;
        buf[22] = self.rerl;
        buf[23] = self.gmin;
        buf[24] = self.r_factor;
        buf[25] = self.ext_r_factor;
        buf[26] = self.mos_lq;
        buf[27] = self.mos_cq;
        buf[28] = self.rx_config();
        buf[29] = 0;
        buf[30..32].copy_from_slice(&self.jitter_buffer_nominal_delay.to_be_bytes());
        buf[32..34].copy_from_slice(&self.jitter_buffer_maximum_delay.to_be_bytes());
        buf[34..36].copy_from_slice(&self.jitter_buffer_absolute_maximum_delay.to_be_bytes());

        Self::LEN
    }
}

impl UnknownBlock {
    fn write_to(&self, buf: &mut [u8]) -> usize {
        let words = (self.body.len() / 4) as u16;
        write_block_header(buf, self.block_type, self.type_specific, words);
        buf[4..4 + self.body.len()].copy_from_slice(&self.body);
        4 + self.body.len()
    }
}

impl<'a> TryFrom<&'a [u8]> for ExtendedReport {
    type Error = &'static str;

    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        if buf.len() < 4 {
            return Err("Less than 4 bytes for ExtendedReport");
        }

        let ssrc = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]).into();

        let mut blocks: Vec<ReportBlock> = Vec::new();
        let mut buf = &buf[4..];

        while !buf.is_empty() {
            let block: ReportBlock = buf.try_into()?;
            buf = &buf[block.len()..];
            blocks.push(block);
        }

        Ok(ExtendedReport { ssrc, blocks })
    }
}

impl<'a> TryFrom<&'a [u8]> for ReportBlock {
    type Error = &'static str;

    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        if buf.len() < 4 {
            return Err("Less than 4 bytes for XR block header");
        }

        let block_type = buf[0];
        let words = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        let len = 4 + words * 4;

        if buf.len() < len {
            return Err("XR block length exceeds packet");
        }
        let buf = &buf[..len];

        Ok(match (block_type, words) {
            (4, 2) => Self::Rrtr(buf.try_into()?),
            (5, w) if w % 3 == 0 => Self::Dlrr(buf.try_into()?),
            (7, 8) => Self::VoipMetrics(buf.try_into()?),
            _ => Self::Unknown(UnknownBlock {
                block_type,
                type_specific: buf[1],
                body: buf[4..].to_vec(),
            }),
        })
    }
}

impl<'a> TryFrom<&'a [u8]> for Rrtr {
    type Error = &'static str;

    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        if buf.len() < Self::LEN {
            return Err("Less than 12 bytes for Rrtr");
        }
        let ntp_time = u64::from_be_bytes([
            buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
        ]);

        Ok(Rrtr { ntp_time })
    }
}

impl<'a> TryFrom<&'a [u8]> for Dlrr {
    type Error = &'static str;

    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        if buf.len() < 4 {
            return Err("Less than 4 bytes for Dlrr");
        }

        let items = buf[4..]
            .chunks_exact(12)
            .map(|b| DlrrItem {
                ssrc: u32::from_be_bytes([b[0], b[1], b[2], b[3]]).into(),
                last_rr_time: u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
                last_rr_delay: u32::from_be_bytes([b[8], b[9], b[10], b[11]]),
            })
            .collect();

        Ok(Dlrr { items })
    }
}

impl<'a> TryFrom<&'a [u8]> for VoipMetrics {
    type Error = &'static str;

    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        if buf.len() < Self::LEN {
            return Err("Less than 36 bytes for VoipMetrics");
        }

        let u16_at = |i: usize| u16::from_be_bytes([buf[i], buf[i + 1]]);
        let rx_config = buf[28];

        Ok(VoipMetrics {
            ssrc: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]).into(),
            loss_rate: buf[8],
            discard_rate: buf[9],
            burst_density: buf[10],
            gap_density: buf[11],
            burst_duration: u16_at(12),
            gap_duration: u16_at(14),
            round_trip_delay: u16_at(16),
            end_system_delay: u16_at(18),
            signal_level: buf[20] as i8,
            noise_level: buf[21] as i8,
            rerl: buf[22],
            gmin: buf[23],
            r_factor: buf[24],
            ext_r_factor: buf[25],
            mos_lq: buf[26],
            mos_cq: buf[27],
            plc: PacketLossConcealment::from_bits(rx_config >> 6),
            jitter_buffer_adaptive: JitterBufferAdaptive::from_bits(rx_config >> 4),
            jitter_buffer_rate: rx_config & 0b0000_1111,
            jitter_buffer_nominal_delay: u16_at(30),
            jitter_buffer_maximum_delay: u16_at(32),
            jitter_buffer_absolute_maximum_delay: u16_at(34),
        })
    }
}

impl PacketLossConcealment {
    fn from_bits(v: u8) -> Self {
        match v & 0b11 {
            1 => Self::Disabled,
            2 => Self::Enhanced,
            3 => Self::Standard,
            _ => Self::Unspecified,
        }
    }
}

impl JitterBufferAdaptive {
    fn from_bits(v: u8) -> Self {
        match v & 0b11 {
            1 => Self::Reserved,
            2 => Self::NonAdaptive,
            3 => Self::Adaptive,
            _ => Self::Unknown,
        }
    }
}
