use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, RwLock};

use crate::config::TransportConfig;
use crate::error::NetError;
use crate::packet::Packet;
use crate::stats::PacketTransformer;
use crate::util::Pii;

use super::counters::{Counters, CountersSnapshot};
use super::logging::{log_packet, Direction, PacketLogger};
use super::socket::{is_timeout, InputTransport};

/// Predicate over a raw datagram. Rejected datagrams are dropped.
pub trait DatagramFilter: Send + Sync {
    /// Whether to keep the datagram `buf` that came from `from`.
    fn accept(&self, buf: &[u8], from: SocketAddr) -> bool;
}

impl<F> DatagramFilter for F
where
    F: Fn(&[u8], SocketAddr) -> bool + Send + Sync,
{
    fn accept(&self, buf: &[u8], from: SocketAddr) -> bool {
        (self)(buf, from)
    }
}

/// Gets every packet the receiver accepts, on the receiver thread.
pub trait TransferHandler: Send + Sync {
    /// A packet arrived from `from`.
    fn on_packet(&self, pkt: &Packet, from: SocketAddr);
}

/// Lifecycle of a [`PacketReceiver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Created, [`PacketReceiver::start`] not called.
    NotStarted,
    /// The receive thread runs.
    Running,
    /// The receive thread stopped on an I/O error.
    Failed,
    /// Closed for good.
    Closed,
}

/// Reads packets from a transport on a dedicated thread.
///
/// Each datagram passes the filters, then the transformer, then goes to the
/// [`TransferHandler`]. The latest delivered packet can also be copied out
/// with [`PacketReceiver::read`].
pub struct PacketReceiver {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    transport: Arc<dyn InputTransport>,
    buffer_len: usize,
    state: Mutex<ReceiverState>,
    closed: AtomicBool,
    io_error: AtomicBool,
    filters: RwLock<Arc<Vec<Arc<dyn DatagramFilter>>>>,
    handler: RwLock<Option<Arc<dyn TransferHandler>>>,
    transformer: RwLock<Option<Arc<dyn PacketTransformer>>>,
    logger: RwLock<Option<Arc<dyn PacketLogger>>>,
    packet_logging: bool,
    last: Mutex<Option<Packet>>,
    counters: Counters,
}

impl PacketReceiver {
    /// Receiver over `transport`. Nothing is read before [`PacketReceiver::start`].
    pub fn new(
        transport: Arc<dyn InputTransport>,
        config: &TransportConfig,
    ) -> Result<Self, NetError> {
        config.validate()?;

        Ok(PacketReceiver {
            inner: Arc::new(Inner {
                transport,
                buffer_len: config.receive_buffer_len(),
                state: Mutex::new(ReceiverState::NotStarted),
                closed: AtomicBool::new(false),
                io_error: AtomicBool::new(false),
                filters: RwLock::new(Arc::new(vec![])),
                handler: RwLock::new(None),
                transformer: RwLock::new(None),
                logger: RwLock::new(None),
                packet_logging: config.packet_logging(),
                last: Mutex::new(None),
                counters: Counters::default(),
            }),
            handle: Mutex::new(None),
        })
    }

    /// Where accepted packets go.
    pub fn set_transfer_handler(&self, handler: Arc<dyn TransferHandler>) {
        *self.inner.handler.write() = Some(handler);
    }

    /// Stage applied to packets after the filters, such as a
    /// [`StatisticsEngine`][crate::StatisticsEngine].
    pub fn set_transformer(&self, transformer: Arc<dyn PacketTransformer>) {
        *self.inner.transformer.write() = Some(transformer);
    }

    /// Mirror received packets to `logger`.
    pub fn set_logger(&self, logger: Arc<dyn PacketLogger>) {
        *self.inner.logger.write() = Some(logger);
    }

    /// Add a filter. A filter already added is not added again.
    pub fn add_filter(&self, filter: Arc<dyn DatagramFilter>) {
        let mut lock = self.inner.filters.write();
        if lock.iter().any(|f| Arc::ptr_eq(f, &filter)) {
            return;
        }
        let mut next: Vec<_> = lock.iter().cloned().collect();
        next.push(filter);
        *lock = Arc::new(next);
    }

    /// Remove a filter previously added.
    pub fn remove_filter(&self, filter: &Arc<dyn DatagramFilter>) {
        let mut lock = self.inner.filters.write();
        let next: Vec<_> = lock
            .iter()
            .filter(|f| !Arc::ptr_eq(*f, filter))
            .cloned()
            .collect();
        *lock = Arc::new(next);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReceiverState {
        *self.inner.state.lock()
    }

    /// Whether the receive loop stopped on an I/O error.
    pub fn has_io_error(&self) -> bool {
        self.inner.io_error.load(Ordering::Acquire)
    }

    /// Packets and bytes received, and failed receives.
    pub fn counters(&self) -> CountersSnapshot {
        self.inner.counters.snapshot()
    }

    /// Start the receive thread.
    pub fn start(&self) -> Result<(), NetError> {
        let mut state = self.inner.state.lock();
        match *state {
            ReceiverState::NotStarted => {}
            ReceiverState::Running => return Err(NetError::AlreadyStarted),
            ReceiverState::Failed => return Err(NetError::ReceiveFailed),
            ReceiverState::Closed => return Err(NetError::Closed),
        }

        let name = match self.inner.transport.local_addr() {
            Some(addr) => format!("rtcore-recv-{}", addr.port()),
            None => "rtcore-recv".to_string(),
        };

        let inner = self.inner.clone();
        let handle = thread::Builder::new().name(name).spawn(move || inner.run())?;

        *self.handle.lock() = Some(handle);
        *state = ReceiverState::Running;
        Ok(())
    }

    /// Copy the latest delivered packet into `buf`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, NetError> {
        if self.has_io_error() {
            return Err(NetError::ReceiveFailed);
        }

        let last = self.inner.last.lock();
        let Some(pkt) = last.as_ref() else {
            return Err(NetError::NoPacket);
        };

        let data = pkt.as_slice();
        if buf.len() < data.len() {
            return Err(NetError::BufferTooSmall {
                available: buf.len(),
                needed: data.len(),
            });
        }

        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    /// Stop the receive thread. Returns once it exited, within one receive timeout.
    pub fn close(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == ReceiverState::Closed {
                return;
            }
            *state = ReceiverState::Closed;
        }
        self.inner.closed.store(true, Ordering::Release);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("Receive thread panicked");
            }
        }
        debug!("Receiver closed");
    }
}

impl Drop for PacketReceiver {
    fn drop(&mut self) {
        self.close();
    }
}

impl Inner {
    fn run(&self) {
        debug!("Receive thread started");

        let mut buf = vec![0; self.buffer_len];
        // Reused for every datagram unless a transformer drops it.
        let mut pkt = Packet::default();

        while !self.closed.load(Ordering::Acquire) {
            let (n, from) = match self.transport.recv_from(&mut buf) {
                Ok(v) => v,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => {
                    error!("Failed to receive packet: {}", e);
                    self.counters.error();
                    {
                        let mut state = self.state.lock();
                        if *state == ReceiverState::Running {
                            *state = ReceiverState::Failed;
                        }
                    }
                    self.io_error.store(true, Ordering::Release);
                    break;
                }
            };

            self.counters.packet(n);
            let data = &buf[..n];

            let filters = self.filters.read().clone();
            if !filters.iter().all(|f| f.accept(data, from)) {
                trace!("Filtered {} bytes from {}", n, Pii(from));
                continue;
            }

            if self.closed.load(Ordering::Acquire) {
                warn!("Ignoring packet received after close");
                break;
            }

            pkt.fill_from(data);

            if self.packet_logging {
                if let Some(logger) = self.logger.read().clone() {
                    let local = self.transport.local_addr();
                    let proto = self.transport.protocol();
                    log_packet(&*logger, &pkt, local, from, proto, Direction::In);
                }
            }

            let transformer = self.transformer.read().clone();
            if let Some(t) = transformer {
                match t.reverse_transform(std::mem::take(&mut pkt)) {
                    Some(p) => pkt = p,
                    None => continue,
                }
            }

            {
                let mut last = self.last.lock();
                match last.as_mut() {
                    Some(l) => l.fill_from(pkt.as_slice()),
                    None => *last = Some(pkt.clone()),
                }
            }

            let handler = self.handler.read().clone();
            if let Some(h) = handler {
                h.on_packet(&pkt, from);
            }
        }

        debug!("Receive thread stopped");
    }
}

#[cfg(test)]
mod test {
    use std::collections::VecDeque;
    use std::io;
    use std::time::{Duration, Instant};

    use super::*;
    use crate::transport::logging::Protocol;

    struct Scripted {
        script: Mutex<VecDeque<io::Result<Vec<u8>>>>,
    }

    impl Scripted {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Arc<Self> {
            Arc::new(Scripted {
                script: Mutex::new(script.into()),
            })
        }
    }

    impl InputTransport for Scripted {
        fn protocol(&self) -> Protocol {
            Protocol::Udp
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            None
        }

        fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            let next = self.script.lock().pop_front();
            match next {
                Some(Ok(v)) => {
                    buf[..v.len()].copy_from_slice(&v);
                    Ok((v.len(), "10.0.0.1:5000".parse().unwrap()))
                }
                Some(Err(e)) => Err(e),
                None => {
                    thread::sleep(Duration::from_millis(5));
                    Err(io::ErrorKind::WouldBlock.into())
                }
            }
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<Vec<u8>>>);

    impl TransferHandler for Collect {
        fn on_packet(&self, pkt: &Packet, _from: SocketAddr) {
            self.0.lock().push(pkt.as_slice().to_vec());
        }
    }

    fn wait_until(f: impl Fn() -> bool) {
        let start = Instant::now();
        while !f() {
            assert!(start.elapsed() < Duration::from_secs(5), "Timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn lifecycle() {
        let rx = PacketReceiver::new(Scripted::new(vec![]), &TransportConfig::new()).unwrap();
        assert_eq!(rx.state(), ReceiverState::NotStarted);
        rx.start().unwrap();
        assert!(matches!(rx.start(), Err(NetError::AlreadyStarted)));
        assert_eq!(rx.state(), ReceiverState::Running);
        rx.close();
        rx.close();
        assert_eq!(rx.state(), ReceiverState::Closed);
        assert!(matches!(rx.start(), Err(NetError::Closed)));
    }

    #[test]
    fn timeouts_continue_and_errors_stop() {
        let script = Scripted::new(vec![
            Err(io::ErrorKind::TimedOut.into()),
            Ok(vec![1, 2, 3]),
            Err(io::ErrorKind::ConnectionReset.into()),
            Ok(vec![4, 5, 6]),
        ]);
        let rx = PacketReceiver::new(script.clone(), &TransportConfig::new()).unwrap();
        let collect = Arc::new(Collect::default());
        rx.set_transfer_handler(collect.clone());
        rx.start().unwrap();

        wait_until(|| rx.has_io_error());
        assert_eq!(rx.state(), ReceiverState::Failed);
        assert!(matches!(rx.start(), Err(NetError::ReceiveFailed)));
        assert_eq!(*collect.0.lock(), vec![vec![1, 2, 3]]);
        assert_eq!(script.script.lock().len(), 1);
        assert!(matches!(rx.read(&mut [0; 10]), Err(NetError::ReceiveFailed)));
        assert_eq!(rx.counters().errors, 1);

        rx.close();
        assert_eq!(rx.state(), ReceiverState::Closed);
    }

    #[test]
    fn filters_short_circuit() {
        let script = Scripted::new(vec![Ok(vec![1]), Ok(vec![2]), Ok(vec![3])]);
        let rx = PacketReceiver::new(script, &TransportConfig::new()).unwrap();
        let collect = Arc::new(Collect::default());
        rx.set_transfer_handler(collect.clone());

        let seen = Arc::new(Mutex::new(0));
        let seen_ = seen.clone();
        let drop_two: Arc<dyn DatagramFilter> = Arc::new(|b: &[u8], _: SocketAddr| b[0] != 2);
        let count: Arc<dyn DatagramFilter> = Arc::new(move |_: &[u8], _: SocketAddr| {
            *seen_.lock() += 1;
            true
        });
        rx.add_filter(drop_two.clone());
        rx.add_filter(drop_two);
        rx.add_filter(count);
        rx.start().unwrap();

        wait_until(|| collect.0.lock().len() == 2);
        assert_eq!(*collect.0.lock(), vec![vec![1], vec![3]]);
        assert_eq!(*seen.lock(), 2);
    }

    #[test]
    fn read_copies_latest() {
        let script = Scripted::new(vec![Ok(vec![7; 20])]);
        let rx = PacketReceiver::new(script, &TransportConfig::new()).unwrap();
        assert!(matches!(rx.read(&mut [0; 10]), Err(NetError::NoPacket)));
        rx.start().unwrap();

        wait_until(|| rx.counters().packets == 1);
        wait_until(|| rx.read(&mut [0; 64]).is_ok());

        let err = rx.read(&mut [0; 10]).unwrap_err();
        assert!(matches!(
            err,
            NetError::BufferTooSmall {
                available: 10,
                needed: 20
            }
        ));

        let mut buf = [0; 64];
        assert_eq!(rx.read(&mut buf).unwrap(), 20);
        assert_eq!(&buf[..20], &[7; 20]);
    }
}
