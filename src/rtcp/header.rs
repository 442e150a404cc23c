use super::VERSION;

pub(crate) const LEN_HEADER: usize = 4;

/// The first word of every RTCP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcpHeader {
    pub(crate) rtcp_type: RtcpType,
    pub(crate) has_padding: bool,
    pub(crate) count: u8,
    pub(crate) words_less_one: u16,
}

impl RtcpHeader {
    /// Type of RTCP packet.
    pub fn rtcp_type(&self) -> RtcpType {
        self.rtcp_type
    }

    /// Whether the padding bit is set.
    pub fn has_padding(&self) -> bool {
        self.has_padding
    }

    /// Number of reports or sources stacked in this packet.
    ///
    /// This is the 5 bit RC/SC field. For XR the field is reserved and reads 0.
    pub fn count(&self) -> usize {
        match self.rtcp_type {
            RtcpType::ExtendedReport => 0,
            _ => self.count as usize,
        }
    }

    /// Length of entire RTCP packet (including header) in words (4 bytes).
    pub fn length_words(&self) -> usize {
        self.words_less_one as usize + 1
    }

    /// Length of entire RTCP packet (including header) in bytes.
    pub fn length_bytes(&self) -> usize {
        self.length_words() * 4
    }

    pub(crate) fn write_to(&self, buf: &mut [u8]) -> usize {
        let padding = if self.has_padding { 0b0010_0000 } else { 0 };
        buf[0] = VERSION << 6 | padding | (self.count & 0b0001_1111);
        buf[1] = self.rtcp_type as u8;
        buf[2..4].copy_from_slice(&self.words_less_one.to_be_bytes());
        LEN_HEADER
    }
}

impl<'a> TryFrom<&'a [u8]> for RtcpHeader {
    type Error = &'static str;

    fn try_from(buf: &'a [u8]) -> Result<Self, Self::Error> {
        if buf.len() < LEN_HEADER {
            return Err("Less than 4 bytes for RtcpHeader");
        }

        let version = (buf[0] & 0b1100_0000) >> 6;
        if version != VERSION {
            return Err("RTCP version is not 2");
        }

        let has_padding = buf[0] & 0b0010_0000 > 0;
        let count = buf[0] & 0b0001_1111;
        let rtcp_type = buf[1].try_into().map_err(|_| "Unrecognized RTCP type")?;
        let words_less_one = u16::from_be_bytes([buf[2], buf[3]]);

        Ok(RtcpHeader {
            rtcp_type,
            has_padding,
            count,
            words_less_one,
        })
    }
}

/// Kind of RTCP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtcpType {
    /// RTCP_PT_SR
    SenderReport = 200,

    /// RTCP_PT_RR
    ReceiverReport = 201,

    /// RTCP_PT_SDES
    SourceDescription = 202,

    /// RTCP_PT_BYE
    Goodbye = 203,

    /// RTCP_PT_APP
    ApplicationDefined = 204,

    /// RTCP_PT_RTPFB
    // https://tools.ietf.org/html/rfc4585
    TransportLayerFeedback = 205,

    /// RTCP_PT_PSFB
    // https://tools.ietf.org/html/rfc4585
    PayloadSpecificFeedback = 206,

    /// RTCP_PT_XR
    // https://tools.ietf.org/html/rfc3611
    ExtendedReport = 207,
}

impl TryFrom<u8> for RtcpType {
    type Error = ();

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        use RtcpType::*;
        match v {
            200 => Ok(SenderReport),   // sr
            201 => Ok(ReceiverReport), // rr
            202 => Ok(SourceDescription),
            203 => Ok(Goodbye),
            204 => Ok(ApplicationDefined),
            205 => Ok(TransportLayerFeedback),
            206 => Ok(PayloadSpecificFeedback),
            207 => Ok(ExtendedReport),
            _ => {
                trace!("Unrecognized RTCP type: {}", v);
                Err(())
            }
        }
    }
}
