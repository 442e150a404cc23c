//! Thread that drains a bounded queue at a fixed packet rate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use crate::config::RateLimit;
use crate::error::NetError;
use crate::packet::Packet;

pub(crate) enum Queued {
    Packet(Packet),
    Stop,
}

/// What the pacing thread delivers to.
pub(crate) trait Deliver: Send + Sync + 'static {
    /// Current rate limit. `None` sends as fast as packets come.
    fn rate_limit(&self) -> Option<RateLimit>;

    /// Send `pkt` to every target.
    fn deliver(&self, pkt: Packet);
}

/// Handle to a running pacing thread.
pub(crate) struct Pacer {
    tx: SyncSender<Queued>,
    closed: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Pacer {
    pub fn start(
        name: String,
        capacity: usize,
        target: Arc<dyn Deliver>,
    ) -> Result<Self, NetError> {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let closed = Arc::new(AtomicBool::new(false));

        let closed_ = closed.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(rx, &closed_, &*target))?;

        Ok(Pacer {
            tx,
            closed,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue `pkt`, blocking while the queue is full.
    pub fn enqueue(&self, pkt: Packet) -> Result<(), NetError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NetError::Closed);
        }
        self.tx
            .send(Queued::Packet(pkt))
            .map_err(|_| NetError::Closed)
    }

    /// Wake the thread so it picks up a changed rate limit.
    pub fn wake(&self) {
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.thread().unpark();
        }
    }

    /// Stop the thread. Queued packets are dropped.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        // A full queue means the thread is busy and will see the flag.
        if let Err(TrySendError::Disconnected(_)) = self.tx.try_send(Queued::Stop) {
            trace!("Pacing thread already gone");
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            handle.thread().unpark();
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Pacing thread panicked");
            }
        }
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        self.close();
    }
}

fn run(rx: Receiver<Queued>, closed: &AtomicBool, target: &dyn Deliver) {
    debug!("Pacing thread started");

    // Send times of the most recent packets, at most one window's worth.
    let mut history: VecDeque<Instant> = VecDeque::new();

    while let Ok(Queued::Packet(pkt)) = rx.recv() {
        if !wait_for_slot(&mut history, target, closed) {
            break;
        }

        target.deliver(pkt);
        // Stamped after the send so the window covers the send itself.
        history.push_back(Instant::now());
    }

    debug!("Pacing thread stopped");
}

/// Block until sending one more packet keeps every window of the current
/// rate limit within `max_packets`. Returns false if closed while waiting.
///
/// The limit is read again on every wake up, so a changed limit applies to
/// a packet already waiting.
fn wait_for_slot(
    history: &mut VecDeque<Instant>,
    target: &dyn Deliver,
    closed: &AtomicBool,
) -> bool {
    loop {
        if closed.load(Ordering::Acquire) {
            return false;
        }

        let Some(limit) = target.rate_limit() else {
            history.clear();
            return true;
        };

        // The limit may have been lowered.
        while history.len() > limit.max_packets {
            history.pop_front();
        }

        let Some(oldest) = history.front().copied() else {
            return true;
        };
        if history.len() < limit.max_packets {
            return true;
        }

        let due = oldest + limit.period();
        let now = Instant::now();
        if now >= due {
            history.pop_front();
            return true;
        }

        thread::park_timeout(due - now);
    }
}
