use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};

use parking_lot::Mutex;
use socket2::SockRef;

use crate::config::TransportConfig;
use crate::util::Pii;

use super::logging::Protocol;

/// Where a [`PacketSender`][super::PacketSender] writes.
pub trait OutputTransport: Send + Sync + 'static {
    /// Transport protocol.
    fn protocol(&self) -> Protocol;

    /// Address of the local end, if bound.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Write one packet to `target`.
    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<()>;
}

/// Where a [`PacketReceiver`][super::PacketReceiver] reads.
///
/// `recv_from` must return within a bounded time, with an error of kind
/// [`io::ErrorKind::WouldBlock`] or [`io::ErrorKind::TimedOut`] when
/// nothing arrived. That is how the receiver notices it was closed.
pub trait InputTransport: Send + Sync + 'static {
    /// Transport protocol.
    fn protocol(&self) -> Protocol;

    /// Address of the local end, if bound.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Read one packet into `buf`.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

/// Tells if `err` is a receive timeout rather than a failure.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// UDP socket for sending or receiving packets.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Wrap `socket`, applying the receive timeout and buffer size of `config`.
    pub fn new(socket: UdpSocket, config: &TransportConfig) -> io::Result<Self> {
        socket.set_read_timeout(Some(config.receive_timeout()))?;

        let size = config.socket_receive_buffer();
        if let Err(e) = SockRef::from(&socket).set_recv_buffer_size(size) {
            // The OS may cap the size, reading still works.
            warn!("Failed to set UDP receive buffer to {}: {}", size, e);
        }

        Ok(UdpTransport { socket })
    }
}

impl OutputTransport for UdpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<()> {
        self.socket.send_to(buf, target)?;
        Ok(())
    }
}

impl InputTransport for UdpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Udp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.local_addr().ok()
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }
}

/// Connected TCP stream for sending or receiving packets.
///
/// The target of a send must be the connected peer.
#[derive(Debug)]
pub struct TcpTransport {
    reader: Mutex<TcpStream>,
    writer: Mutex<TcpStream>,
    peer: SocketAddr,
    local: Option<SocketAddr>,
}

impl TcpTransport {
    /// Wrap `stream`, applying the receive timeout of `config`.
    pub fn new(stream: TcpStream, config: &TransportConfig) -> io::Result<Self> {
        stream.set_read_timeout(Some(config.receive_timeout()))?;
        let peer = stream.peer_addr()?;
        let local = stream.local_addr().ok();

        Ok(TcpTransport {
            writer: Mutex::new(stream.try_clone()?),
            reader: Mutex::new(stream),
            peer,
            local,
        })
    }
}

impl OutputTransport for TcpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<()> {
        if target != self.peer {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("TCP stream not connected to {}", Pii(target)),
            ));
        }
        self.writer.lock().write_all(buf)
    }
}

impl InputTransport for TcpTransport {
    fn protocol(&self) -> Protocol {
        Protocol::Tcp
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let n = self.reader.lock().read(buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "TCP peer closed the stream",
            ));
        }
        Ok((n, self.peer))
    }
}
