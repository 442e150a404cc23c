#![allow(unused)]
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use rtcore::rtcp::{ReceiverReport, ReceptionReport, ReportList, Rtcp};
use rtcore::{InputTransport, OutputTransport, Protocol};

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

pub fn remote() -> SocketAddr {
    "10.0.0.2:5004".parse().unwrap()
}

/// Output transport remembering every send.
#[derive(Default)]
pub struct Recorder {
    pub sent: Mutex<Vec<(Instant, SocketAddr, Vec<u8>)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Recorder::default())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.sent.lock().iter().map(|(_, _, b)| b.clone()).collect()
    }

    pub fn times(&self) -> Vec<Instant> {
        self.sent.lock().iter().map(|(t, _, _)| *t).collect()
    }
}

impl OutputTransport for Recorder {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<()> {
        self.sent.lock().push((Instant::now(), target, buf.to_vec()));
        Ok(())
    }
}

/// Input transport handing out queued datagrams, timing out when empty.
#[derive(Default)]
pub struct Feed {
    queue: Mutex<VecDeque<Vec<u8>>>,
}

impl Feed {
    pub fn new() -> Arc<Self> {
        Arc::new(Feed::default())
    }

    pub fn push(&self, datagram: &[u8]) {
        self.queue.lock().push_back(datagram.to_vec());
    }
}

impl InputTransport for Feed {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let next = self.queue.lock().pop_front();
        match next {
            Some(v) => {
                buf[..v.len()].copy_from_slice(&v);
                Ok((v.len(), remote()))
            }
            None => {
                thread::sleep(Duration::from_millis(2));
                Err(io::ErrorKind::WouldBlock.into())
            }
        }
    }
}

/// Minimal RTP packet with a 20 byte payload.
pub fn rtp(ssrc: u32, seq: u16) -> Vec<u8> {
    let mut buf = vec![0x80, 111];
    buf.extend_from_slice(&seq.to_be_bytes());
    buf.extend_from_slice(&[0, 0, 0x03, 0xe8]);
    buf.extend_from_slice(&ssrc.to_be_bytes());
    buf.extend_from_slice(&[0xaa; 20]);
    buf
}

pub fn reception(ssrc: u32, packets_lost: u32, jitter: u32) -> ReceptionReport {
    ReceptionReport {
        ssrc: ssrc.into(),
        fraction_lost: 0,
        packets_lost,
        max_seq: 0,
        jitter,
        last_sr_time: 0,
        last_sr_delay: 0,
    }
}

pub fn rr(sender: u32, reports: Vec<ReceptionReport>) -> Rtcp {
    Rtcp::ReceiverReport(ReceiverReport {
        sender_ssrc: sender.into(),
        reports: ReportList::lists_from_iter(reports)
            .pop()
            .unwrap_or_default(),
    })
}

pub fn wait_until(f: impl Fn() -> bool) {
    let start = Instant::now();
    while !f() {
        assert!(start.elapsed() < Duration::from_secs(10), "Timed out");
        thread::sleep(Duration::from_millis(5));
    }
}
