use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Count(AtomicU64);

impl Count {
    fn add(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Packet, byte and error counts of one sender or receiver.
///
/// Updated from the data path without locking.
#[derive(Debug, Default)]
pub struct Counters {
    packets: Count,
    bytes: Count,
    errors: Count,
}

/// A copy of [`Counters`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    /// Packets sent or received.
    pub packets: u64,
    /// Bytes sent or received.
    pub bytes: u64,
    /// Failed sends or receives.
    pub errors: u64,
}

impl Counters {
    pub(crate) fn packet(&self, bytes: usize) {
        self.packets.add(1);
        self.bytes.add(bytes as u64);
    }

    pub(crate) fn error(&self) {
        self.errors.add(1);
    }

    /// Current values.
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            packets: self.packets.get(),
            bytes: self.bytes.get(),
            errors: self.errors.get(),
        }
    }
}
