use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::{RateLimit, TransportConfig};
use crate::error::NetError;
use crate::packet::{Packet, PacketPool};
use crate::stats::PacketTransformer;
use crate::util::Pii;

use super::counters::{Counters, CountersSnapshot};
use super::logging::{log_packet, Direction, PacketLogger};
use super::pacer::{Deliver, Pacer};
use super::socket::OutputTransport;

/// Writes packets to a set of targets over one transport.
///
/// Without a rate limit every `write` sends synchronously. Once a rate limit
/// is set, packets go through a bounded queue drained by a pacing thread,
/// and stay in submission order from then on.
///
/// ```no_run
/// use std::net::UdpSocket;
/// use std::sync::Arc;
/// use rtcore::{PacketSender, TransportConfig, UdpTransport};
///
/// let config = TransportConfig::new().set_rate_limit(10, 100);
/// let socket = UdpSocket::bind("0.0.0.0:0").unwrap();
/// let transport = Arc::new(UdpTransport::new(socket, &config).unwrap());
///
/// let sender = PacketSender::new(transport, config).unwrap();
/// sender.add_target("10.0.0.1:5000".parse().unwrap());
/// sender.write(&[0x80, 96, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1]).unwrap();
/// ```
pub struct PacketSender {
    inner: Arc<Inner>,
    config: TransportConfig,
    pacer: Mutex<Option<Arc<Pacer>>>,
}

struct Inner {
    transport: Arc<dyn OutputTransport>,
    targets: RwLock<Vec<SocketAddr>>,
    rate_limit: RwLock<Option<RateLimit>>,
    pool: PacketPool,
    transformer: RwLock<Option<Arc<dyn PacketTransformer>>>,
    logger: RwLock<Option<Arc<dyn PacketLogger>>>,
    packet_logging: bool,
    counters: Counters,
    closed: AtomicBool,
}

impl PacketSender {
    /// Sender over `transport`. Starts pacing if `config` has a rate limit.
    pub fn new(
        transport: Arc<dyn OutputTransport>,
        config: TransportConfig,
    ) -> Result<Self, NetError> {
        config.validate()?;

        let inner = Arc::new(Inner {
            transport,
            targets: RwLock::new(vec![]),
            rate_limit: RwLock::new(config.rate_limit()),
            pool: PacketPool::new(),
            transformer: RwLock::new(None),
            logger: RwLock::new(None),
            packet_logging: config.packet_logging(),
            counters: Counters::default(),
            closed: AtomicBool::new(false),
        });

        let sender = PacketSender {
            inner,
            config,
            pacer: Mutex::new(None),
        };

        if sender.config.rate_limit().is_some() {
            sender.start_pacer()?;
        }

        Ok(sender)
    }

    /// Stage applied to every written packet before it is sent or queued,
    /// such as a [`StatisticsEngine`][crate::StatisticsEngine].
    pub fn set_transformer(&self, transformer: Arc<dyn PacketTransformer>) {
        *self.inner.transformer.write() = Some(transformer);
    }

    /// Mirror sent packets to `logger`.
    pub fn set_logger(&self, logger: Arc<dyn PacketLogger>) {
        *self.inner.logger.write() = Some(logger);
    }

    /// Add a destination. Adding one already present does nothing.
    pub fn add_target(&self, target: SocketAddr) {
        let mut targets = self.inner.targets.write();
        if targets.contains(&target) {
            return;
        }
        debug!("Add target {}", Pii(target));
        targets.push(target);
    }

    /// Remove a destination.
    pub fn remove_target(&self, target: SocketAddr) {
        let mut targets = self.inner.targets.write();
        let before = targets.len();
        targets.retain(|t| *t != target);
        if targets.len() != before {
            debug!("Remove target {}", Pii(target));
        }
    }

    /// Current destinations.
    pub fn targets(&self) -> Vec<SocketAddr> {
        self.inner.targets.read().clone()
    }

    /// Current rate limit, if any.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        *self.inner.rate_limit.read()
    }

    /// Send at most `max_packets` every `per_millis` milliseconds.
    ///
    /// `max_packets == 0` stops pacing for packets drained after the call.
    pub fn set_max_packets_per_millis(
        &self,
        max_packets: usize,
        per_millis: u64,
    ) -> Result<(), NetError> {
        if self.is_closed() {
            return Err(NetError::Closed);
        }
        let limit = RateLimit::new(max_packets, per_millis)?;

        debug!("Rate limit {} packets per {}ms", max_packets, per_millis);
        *self.inner.rate_limit.write() = limit.is_enabled().then_some(limit);

        if limit.is_enabled() {
            self.start_pacer()?;
        }

        let pacer = self.pacer.lock().clone();
        if let Some(pacer) = pacer {
            pacer.wake();
        }
        Ok(())
    }

    /// Send a copy of `buf` to every target, or queue it when paced.
    ///
    /// Returns the number of bytes taken. Unpaced, an error means at least
    /// one target failed, after every target was tried.
    pub fn write(&self, buf: &[u8]) -> Result<usize, NetError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(NetError::Closed);
        }

        let mut pkt = self.inner.pool.copy_of(buf);

        let transformer = self.inner.transformer.read().clone();
        if let Some(t) = transformer {
            match t.transform(pkt) {
                Some(p) => pkt = p,
                None => return Ok(buf.len()),
            }
        }

        let pacer = self.pacer.lock().clone();
        if let Some(pacer) = pacer {
            pacer.enqueue(pkt)?;
            return Ok(buf.len());
        }

        let result = self.inner.send_all(&pkt);
        self.inner.pool.recycle(pkt);
        result.map(|_| buf.len())
    }

    /// Packets and bytes sent, and failed sends.
    pub fn counters(&self) -> CountersSnapshot {
        self.inner.counters.snapshot()
    }

    /// Whether [`PacketSender::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Stop pacing and forget all targets. Queued packets are dropped.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let pacer = self.pacer.lock().take();
        if let Some(pacer) = pacer {
            pacer.close();
        }
        self.inner.targets.write().clear();
        debug!("Sender closed");
    }

    fn start_pacer(&self) -> Result<(), NetError> {
        let mut lock = self.pacer.lock();
        if lock.is_some() {
            return Ok(());
        }

        let name = match self.inner.transport.local_addr() {
            Some(addr) => format!("rtcore-pacer-{}", addr.port()),
            None => "rtcore-pacer".to_string(),
        };

        let pacer = Pacer::start(name, self.config.queue_capacity(), self.inner.clone())?;
        *lock = Some(Arc::new(pacer));
        Ok(())
    }
}

impl Drop for PacketSender {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn send_all(&self, pkt: &Packet) -> Result<(), NetError> {
        let targets = self.targets.read().clone();
        if targets.is_empty() {
            trace!("No targets, drop packet of {} bytes", pkt.len());
            return Ok(());
        }

        let logger = if self.packet_logging {
            self.logger.read().clone()
        } else {
            None
        };
        let local = self.transport.local_addr();
        let protocol = self.transport.protocol();

        let mut failed = 0;

        for target in &targets {
            if let Err(e) = self.transport.send_to(pkt.as_slice(), *target) {
                warn!("Failed to send to {}: {}", Pii(*target), e);
                self.counters.error();
                failed += 1;
                continue;
            }

            self.counters.packet(pkt.len());

            if let Some(logger) = &logger {
                log_packet(&**logger, pkt, local, *target, protocol, Direction::Out);
            }
        }

        if failed > 0 {
            return Err(NetError::SendFailed {
                failed,
                targets: targets.len(),
            });
        }

        Ok(())
    }
}

impl Deliver for Inner {
    fn rate_limit(&self) -> Option<RateLimit> {
        *self.rate_limit.read()
    }

    fn deliver(&self, pkt: Packet) {
        if let Err(e) = self.send_all(&pkt) {
            trace!("Paced send: {}", e);
        }
        self.pool.recycle(pkt);
    }
}
