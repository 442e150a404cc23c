//! Mutable view over one RTP or RTCP packet.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::id::Ssrc;

/// Smallest valid RTP header.
pub const RTP_HEADER_LEN: usize = 12;

/// One wire packet living in the region `[offset, offset + len)` of a byte buffer.
///
/// The packet can grow and shrink in place. Growing may move the region within
/// (or out of) the buffer, therefore [`Packet::grow`] reports how far the offset
/// moved. Anyone holding an offset derived from the packet must re-derive it
/// with [`rebase`] after a resize.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Packet {
    buf: Vec<u8>,
    offset: usize,
    len: usize,
}

/// Apply the offset `delta` returned by [`Packet::grow`] to an offset held by the caller.
pub fn rebase(off: usize, delta: isize) -> usize {
    if delta < 0 {
        off.saturating_sub(delta.unsigned_abs())
    } else {
        off + delta as usize
    }
}

impl Packet {
    /// Wrap a buffer. The region is clamped to the buffer.
    pub fn new(buf: Vec<u8>, offset: usize, len: usize) -> Self {
        let offset = offset.min(buf.len());
        let len = len.min(buf.len() - offset);
        Packet { buf, offset, len }
    }

    /// Copy of `data` at offset 0.
    pub fn from_slice(data: &[u8]) -> Self {
        Packet::new(data.to_vec(), 0, data.len())
    }

    /// The whole underlying buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    /// The whole underlying buffer, mutable.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    /// Start of the packet within the buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the packet.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the packet holds zero bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Space in the buffer available after `offset`.
    pub fn capacity(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// The packet bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.offset..self.offset + self.len]
    }

    /// The packet bytes, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf[self.offset..self.offset + self.len]
    }

    /// Set the packet length. Clamped to [`Packet::capacity`].
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }

    /// Move the start of the packet. The length is clamped to what remains.
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset.min(self.buf.len());
        self.len = self.len.min(self.capacity());
    }

    /// Replace the contents with `data`, reusing the allocation when it is large enough.
    pub fn fill_from(&mut self, data: &[u8]) {
        if self.buf.len() < data.len() {
            self.buf.resize(data.len(), 0);
        }
        self.buf[..data.len()].copy_from_slice(data);
        self.offset = 0;
        self.len = data.len();
    }

    /// Make room for `extra` bytes after the end of the packet.
    ///
    /// The length is unchanged, the caller commits the new length with
    /// [`Packet::set_len`] once the room is filled. Returns the distance the
    /// offset moved.
    pub fn grow(&mut self, extra: usize) -> isize {
        if extra == 0 || self.buf.len() - self.offset - self.len >= extra {
            return 0;
        }

        let old = self.offset;
        let needed = self.len + extra;

        if needed > self.buf.len() {
            let mut buf = vec![0; needed];
            buf[..self.len].copy_from_slice(self.as_slice());
            self.buf = buf;
        } else {
            self.buf.copy_within(self.offset..self.offset + self.len, 0);
        }
        self.offset = 0;

        -(old as isize)
    }

    /// Drop `by` bytes from the end of the packet. Returns the distance the offset moved.
    pub fn shrink(&mut self, by: usize) -> isize {
        self.len -= by.min(self.len);
        0
    }

    /// Version field of the first header in the packet.
    pub fn version(&self) -> Option<u8> {
        self.as_slice().first().map(|b| (b & 0b1100_0000) >> 6)
    }

    /// RTCP packet type of the first sub-packet.
    pub fn rtcp_packet_type(&self) -> Option<u8> {
        self.as_slice().get(1).copied()
    }

    /// SSRC of an RTP packet.
    pub fn ssrc(&self) -> Option<Ssrc> {
        let b = self.as_slice().get(8..12)?;
        Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]).into())
    }

    /// Sequence number of an RTP packet.
    pub fn sequence_number(&self) -> Option<u16> {
        let b = self.as_slice().get(2..4)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Length of the RTP header, fixed part plus CSRCs and extension.
    ///
    /// Clamped to the packet length for truncated packets.
    pub fn header_len(&self) -> usize {
        let buf = self.as_slice();
        if buf.len() < RTP_HEADER_LEN {
            return buf.len();
        }

        let csrc_count = (buf[0] & 0b0000_1111) as usize;
        let has_extension = buf[0] & 0b0001_0000 > 0;

        let mut len = RTP_HEADER_LEN + 4 * csrc_count;

        if has_extension && buf.len() >= len + 4 {
            let words = u16::from_be_bytes([buf[len + 2], buf[len + 3]]) as usize;
            len += 4 + words * 4;
        }

        len.min(buf.len())
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Recycles packet buffers between pipeline stages.
///
/// Cloning the pool gives another handle to the same buffers.
#[derive(Clone, Default)]
pub struct PacketPool {
    free: Arc<Mutex<Vec<Packet>>>,
}

impl PacketPool {
    /// Empty pool.
    pub fn new() -> Self {
        PacketPool::default()
    }

    /// A packet holding a copy of `data`.
    ///
    /// Reuses a pooled buffer when it can hold `data`, otherwise allocates.
    pub fn copy_of(&self, data: &[u8]) -> Packet {
        let pooled = self.free.lock().pop();

        match pooled {
            Some(mut pkt) if pkt.buf.len() >= data.len() => {
                pkt.fill_from(data);
                pkt
            }
            _ => Packet::from_slice(data),
        }
    }

    /// Return a packet for reuse.
    pub fn recycle(&self, pkt: Packet) {
        self.free.lock().push(pkt);
    }

    /// Number of pooled packets.
    pub fn len(&self) -> usize {
        self.free.lock().len()
    }

    /// Whether the pool holds no packets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
