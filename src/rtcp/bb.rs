use super::{ReportList, RtcpHeader, RtcpPacket, RtcpType, Ssrc};

/// RTCP packet BYE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goodbye {
    /// The SSRC that are no longer in use.
    pub reports: ReportList<Ssrc>,
}

impl Goodbye {
    /// Whether the source list of a raw BYE packet contains `ssrc`.
    ///
    /// `Err` when the source count does not fit the packet length.
    pub(crate) fn lists(buf: &[u8], ssrc: Ssrc) -> Result<bool, &'static str> {
        let header: RtcpHeader = buf.try_into()?;
        let count = header.count();

        let end = header.length_bytes().min(buf.len());
        if 4 + count * 4 > end {
            return Err("Source count exceeds BYE length");
        }

        Ok(buf[4..4 + count * 4]
            .chunks_exact(4)
            .any(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]) == *ssrc))
    }
}

impl RtcpPacket for Goodbye {
    fn header(&self) -> RtcpHeader {
        RtcpHeader {
            rtcp_type: RtcpType::Goodbye,
            has_padding: false,
            count: self.reports.len() as u8,
            words_less_one: (self.length_words() - 1) as u16,
        }
    }

    fn length_words(&self) -> usize {
        // each ssrc is one word
        1 + self.reports.len()
    }

    fn write_to(&self, buf: &mut [u8]) -> usize {
        self.header().write_to(&mut buf[..4]);
        let buf = &mut buf[4..];
        for (i, s) in self.reports.iter().enumerate() {
            buf[i * 4..(i + 1) * 4].copy_from_slice(&s.to_be_bytes());
        }

        self.length_words() * 4
    }
}

impl<'a> TryFrom<(usize, &'a [u8])> for Goodbye {
    type Error = &'static str;

    fn try_from((count, buf): (usize, &'a [u8])) -> Result<Self, Self::Error> {
        if buf.len() < count * 4 {
            return Err("Less than count * 4 bytes for Goodbye");
        }

        let mut reports = ReportList::new();

        for b in buf.chunks_exact(4).take(count) {
            let ssrc = u32::from_be_bytes([b[0], b[1], b[2], b[3]]).into();
            reports.push(ssrc).map_err(|_| "More than 31 sources in Goodbye")?;
        }

        // The optional reason string after the sources is ignored.

        Ok(Goodbye { reports })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lists_source() {
        let bye = Goodbye {
            reports: ReportList::lists_from_iter([1.into(), 2.into()]).remove(0),
        };
        let mut buf = vec![0; 12];
        assert_eq!(bye.write_to(&mut buf), 12);
        assert_eq!(&buf[..4], &[0x82, 0xcb, 0x00, 0x02]);

        assert_eq!(Goodbye::lists(&buf, 2.into()), Ok(true));
        assert_eq!(Goodbye::lists(&buf, 3.into()), Ok(false));

        // claims 5 sources in a 3 word packet.
        buf[0] = 0x85;
        assert!(Goodbye::lists(&buf, 2.into()).is_err());
    }
}
